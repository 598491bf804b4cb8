//! Core data model shared across the engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asset::AssetClass;

// ── Social input ──────────────────────────────────────────────────────

/// One raw mention as delivered by a social feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub upvotes: Option<u32>,
    #[serde(default)]
    pub comments: Option<u32>,
    #[serde(default)]
    pub flair: Option<String>,
    /// Pre-computed momentum (percent move) from momentum feeds.
    #[serde(default)]
    pub momentum: Option<f64>,
    /// Explicit symbol for feeds that are already keyed by ticker.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Subreddit, channel, or list name.
    #[serde(default)]
    pub source_detail: Option<String>,
}

/// All mentions returned by one source in one fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceBatch {
    pub source: String,
    pub mentions: Vec<Mention>,
}

/// Uniform per-symbol sentiment signal for one source in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub source: String,
    pub source_detail: String,
    /// Mean unweighted sentiment in [-1, 1].
    pub raw_sentiment: f64,
    /// Quality-weighted sentiment in [-1, 1].
    pub sentiment: f64,
    pub volume: u32,
    pub freshness: f64,
    pub source_weight: f64,
    pub reason: String,
    pub momentum: Option<f64>,
    pub price: Option<f64>,
    pub is_crypto: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-symbol rollup of one or more signals. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMarket {
    pub symbol: String,
    pub is_crypto: bool,
    pub sentiment_avg: f64,
    pub momentum_avg: Option<f64>,
    pub total_volume: u32,
    pub sources: Vec<String>,
}

/// Statistically scored candidate. Valid only for the scan that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaCandidate {
    pub symbol: String,
    pub is_crypto: bool,
    pub price: f64,
    pub notional_volume: f64,
    pub spread_pct: Option<f64>,
    pub implied_prob: f64,
    pub calculated_prob: f64,
    pub alpha: f64,
    pub sentiment_avg: f64,
}

// ── Judge / confirmation ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Buy,
    Skip,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchVerdict {
    pub symbol: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub entry_quality: EntryQuality,
    pub reasoning: String,
    pub red_flags: Vec<String>,
    pub catalysts: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationResult {
    pub symbol: String,
    pub sentiment: f64,
    pub confirms_existing: bool,
    pub sample_count: u32,
    pub timestamp: DateTime<Utc>,
}

// ── Positions ─────────────────────────────────────────────────────────

/// Entry bookkeeping for one held symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub entry_time: DateTime<Utc>,
    /// `None` while the fill price is still pending.
    pub entry_price: Option<f64>,
    pub entry_sentiment: f64,
    pub entry_social_volume: u32,
    pub entry_sources: Vec<String>,
    pub entry_reason: String,
    pub peak_price: f64,
    pub peak_sentiment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StalenessScore {
    pub score: f64,
    pub is_stale: bool,
    pub reason: String,
}

// ── Market data ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// `(ask - bid) / mid`, `None` for a crossed, empty, or zero quote.
    pub fn spread_pct(&self) -> Option<f64> {
        if self.bid <= 0.0 || self.ask <= 0.0 || self.ask < self.bid {
            return None;
        }
        Some((self.ask - self.bid) / self.mid())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub last_trade: Option<f64>,
    pub quote: Option<Quote>,
    pub daily_bar: Option<Bar>,
    pub prev_daily_bar: Option<Bar>,
}

impl Snapshot {
    /// Best available price: last trade, then daily close, then quote mid.
    pub fn price(&self) -> Option<f64> {
        self.last_trade
            .filter(|p| *p > 0.0)
            .or_else(|| self.daily_bar.map(|b| b.close).filter(|p| *p > 0.0))
            .or_else(|| self.quote.map(|q| q.mid()).filter(|p| *p > 0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    OneMinute,
    OneHour,
    OneDay,
}

// ── Brokerage ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub cash: f64,
    pub equity: f64,
    pub buying_power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub qty: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    pub market_value: f64,
}

impl BrokerPosition {
    /// Unrealized P&L as a percentage of cost basis, `None` without a basis.
    pub fn unrealized_pct(&self) -> Option<f64> {
        if self.avg_entry_price <= 0.0 {
            return None;
        }
        Some((self.current_price - self.avg_entry_price) / self.avg_entry_price * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

/// Order intent handed to the brokerage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub notional: Option<f64>,
    pub qty: Option<f64>,
    pub time_in_force: TimeInForce,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
    pub filled_avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub exchange: String,
    pub tradable: bool,
    pub class: AssetClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetFilter {
    pub class: Option<AssetClass>,
    pub tradable_only: bool,
}

// ── Notifications ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Entry,
    Exit,
    TopAlpha,
    BreakingNews,
    ResearchRedFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub symbol: String,
    pub kind: NotifyKind,
    pub message: String,
}
