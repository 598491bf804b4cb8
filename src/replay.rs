//! File-backed social and market data for shadow runs.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use common::providers::{MarketDataProvider, SocialFeedProvider};
use common::{Bar, BarInterval, Error, Mention, Quote, Result, Snapshot, SourceBatch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFeed {
    #[serde(default)]
    pub trending: Vec<SourceBatch>,
    /// Keyed by query (usually the symbol).
    #[serde(default)]
    pub recent: HashMap<String, Vec<Mention>>,
    #[serde(default)]
    pub snapshots: HashMap<String, Snapshot>,
    /// Daily bars keyed by symbol, oldest first.
    #[serde(default)]
    pub bars: HashMap<String, Vec<Bar>>,
}

impl ReplayFeed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn missing(what: &str, symbol: &str) -> Error {
        Error::provider("replay", format!("no {} for {}", what, symbol))
    }
}

#[async_trait]
impl SocialFeedProvider for ReplayFeed {
    async fn fetch_trending(&self) -> Result<Vec<SourceBatch>> {
        Ok(self.trending.clone())
    }

    async fn fetch_recent(&self, query: &str, _source: &str) -> Result<Vec<Mention>> {
        Ok(self.recent.get(query).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataProvider for ReplayFeed {
    async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot> {
        self.snapshots
            .get(symbol)
            .cloned()
            .ok_or_else(|| Self::missing("snapshot", symbol))
    }

    async fn get_bars(&self, symbol: &str, interval: BarInterval, limit: usize) -> Result<Vec<Bar>> {
        if interval != BarInterval::OneDay {
            return Err(Self::missing("intraday bars", symbol));
        }
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| Self::missing("bars", symbol))?;
        let skip = bars.len().saturating_sub(limit);
        Ok(bars[skip..].to_vec())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        self.snapshots
            .get(symbol)
            .and_then(|s| s.quote)
            .ok_or_else(|| Self::missing("quote", symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_serves_tail_of_bars_and_missing_is_provider_error() {
        let start = Utc::now() - Duration::days(10);
        let bars: Vec<Bar> = (0..10)
            .map(|i| Bar {
                timestamp: start + Duration::days(i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: i as f64,
                volume: 1.0,
            })
            .collect();
        let feed = ReplayFeed {
            bars: HashMap::from([("AAPL".to_string(), bars)]),
            ..ReplayFeed::default()
        };

        let tail = feed.get_bars("AAPL", BarInterval::OneDay, 3).await.unwrap();
        let closes: Vec<f64> = tail.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![7.0, 8.0, 9.0]);

        let err = feed.get_snapshot("AAPL").await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable { .. }));
        assert!(feed.fetch_recent("AAPL", "twitter").await.unwrap().is_empty());
    }

    #[test]
    fn test_parses_minimal_file() {
        let raw = r#"{
            "trending": [{"source": "reddit", "mentions": [
                {"text": "$AAPL to the moon", "timestamp": "2024-01-10T15:00:00Z"}
            ]}],
            "snapshots": {"AAPL": {"symbol": "AAPL", "last_trade": 190.0}}
        }"#;
        let feed: ReplayFeed = serde_json::from_str(raw).unwrap();
        assert_eq!(feed.trending[0].mentions.len(), 1);
        assert_eq!(feed.snapshots["AAPL"].last_trade, Some(190.0));
    }
}
