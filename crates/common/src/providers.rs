//! Interfaces for the external collaborators the core consumes.
//!
//! Concrete network clients live outside the core; everything here is
//! object-safe so the scheduler can hold `Arc<dyn ...>`.

use async_trait::async_trait;
use futures::future::join_all;

use crate::types::{
    Account, Asset, AssetFilter, Bar, BarInterval, BrokerPosition, Clock, Mention, NotifyEvent,
    OrderAck, OrderRequest, Quote, Snapshot, SourceBatch,
};
use crate::Result;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot>;

    /// Batched snapshot fetch. Per-symbol failures are dropped from the
    /// result rather than failing the whole batch.
    async fn get_snapshots(&self, symbols: &[String]) -> Vec<Snapshot> {
        let fetches = symbols.iter().map(|symbol| self.get_snapshot(symbol));
        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|result| result.ok())
            .collect()
    }

    async fn get_bars(&self, symbol: &str, interval: BarInterval, limit: usize) -> Result<Vec<Bar>>;

    async fn get_quote(&self, symbol: &str) -> Result<Quote>;
}

#[async_trait]
pub trait BrokerageProvider: Send + Sync {
    async fn get_account(&self) -> Result<Account>;
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>>;
    async fn get_clock(&self) -> Result<Clock>;
    async fn create_order(&self, order: &OrderRequest) -> Result<OrderAck>;
    async fn close_position(&self, symbol: &str) -> Result<OrderAck>;
    async fn get_asset(&self, symbol: &str) -> Result<Asset>;
    async fn list_assets(&self, filter: AssetFilter) -> Result<Vec<Asset>>;
}

#[async_trait]
pub trait SocialFeedProvider: Send + Sync {
    /// One batch per source of currently trending mentions.
    async fn fetch_trending(&self) -> Result<Vec<SourceBatch>>;

    async fn fetch_recent(&self, query: &str, source: &str) -> Result<Vec<Mention>>;
}

/// Fire-and-forget. Implementations must not retry.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &NotifyEvent);
}
