use chrono::{DateTime, Utc};
use common::AlphaCandidate;
use serde::{Deserialize, Serialize};

/// Tunables for the alpha scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParams {
    /// Cap on symbols pulled into a scan, highest sentiment first.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_min_notional")]
    pub min_notional_volume: f64,
    #[serde(default = "default_crypto_min_notional")]
    pub crypto_min_notional_volume: f64,
    /// Fractional spread ceiling, e.g. 0.005 = 0.5%.
    #[serde(default = "default_max_spread")]
    pub max_spread_pct: f64,
    #[serde(default = "default_crypto_max_spread")]
    pub crypto_max_spread_pct: f64,
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,
    #[serde(default = "default_crypto_min_edge")]
    pub crypto_min_edge: f64,
    /// Alpha at or above this lands in the top-alpha view.
    #[serde(default = "default_top_alpha_threshold")]
    pub top_alpha_threshold: f64,
    #[serde(default = "default_max_edge_candidates")]
    pub max_edge_candidates: usize,
    #[serde(default = "default_max_top_alpha")]
    pub max_top_alpha: usize,
    /// Trailing daily bars used for volatility and up-day fraction.
    #[serde(default = "default_history_days")]
    pub history_days: usize,
    /// Fewer returns than this falls back to the daily-return proxy.
    #[serde(default = "default_min_history_days")]
    pub min_history_days: usize,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: i64,
}

fn default_max_candidates() -> usize {
    40
}
fn default_min_notional() -> f64 {
    5_000_000.0
}
fn default_crypto_min_notional() -> f64 {
    1_000_000.0
}
fn default_max_spread() -> f64 {
    0.005
}
fn default_crypto_max_spread() -> f64 {
    0.01
}
fn default_min_edge() -> f64 {
    0.05
}
fn default_crypto_min_edge() -> f64 {
    0.03
}
fn default_top_alpha_threshold() -> f64 {
    0.15
}
fn default_max_edge_candidates() -> usize {
    10
}
fn default_max_top_alpha() -> usize {
    5
}
fn default_history_days() -> usize {
    20
}
fn default_min_history_days() -> usize {
    5
}
fn default_scan_interval() -> i64 {
    300
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            min_notional_volume: default_min_notional(),
            crypto_min_notional_volume: default_crypto_min_notional(),
            max_spread_pct: default_max_spread(),
            crypto_max_spread_pct: default_crypto_max_spread(),
            min_edge: default_min_edge(),
            crypto_min_edge: default_crypto_min_edge(),
            top_alpha_threshold: default_top_alpha_threshold(),
            max_edge_candidates: default_max_edge_candidates(),
            max_top_alpha: default_max_top_alpha(),
            history_days: default_history_days(),
            min_history_days: default_min_history_days(),
            scan_interval_secs: default_scan_interval(),
        }
    }
}

/// Why a symbol fell out of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub no_snapshot: usize,
    pub liquidity: usize,
    pub spread: usize,
    pub edge: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaScanResult {
    pub scanned_at: DateTime<Utc>,
    pub universe: usize,
    /// Positive alpha, best first. Permissive funnel for momentum entries.
    pub edge_candidates: Vec<AlphaCandidate>,
    /// Alpha above the stricter threshold, best first.
    pub top_alpha: Vec<AlphaCandidate>,
    pub dropped: DropCounts,
}

impl AlphaScanResult {
    pub fn find(&self, symbol: &str) -> Option<&AlphaCandidate> {
        self.edge_candidates
            .iter()
            .chain(self.top_alpha.iter())
            .find(|c| c.symbol == symbol)
    }
}
