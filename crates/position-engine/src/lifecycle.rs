use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use common::{BrokerPosition, PositionEntry, StalenessScore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::staleness::{StalenessInput, StalenessParams};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocialSample {
    pub timestamp: DateTime<Utc>,
    pub volume: u32,
    pub sentiment: f64,
}

/// Per-symbol position state. A symbol is HELD exactly while it has an entry
/// here; closing removes the entry with its staleness and social history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionBook {
    #[serde(default)]
    entries: BTreeMap<String, PositionEntry>,
    #[serde(default)]
    staleness: BTreeMap<String, StalenessScore>,
    #[serde(default)]
    social_history: BTreeMap<String, VecDeque<SocialSample>>,
}

impl PositionBook {
    pub fn get(&self, symbol: &str) -> Option<&PositionEntry> {
        self.entries.get(symbol)
    }

    pub fn is_held(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn entries(&self) -> impl Iterator<Item = &PositionEntry> {
        self.entries.values()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn staleness(&self) -> &BTreeMap<String, StalenessScore> {
        &self.staleness
    }

    /// Record a filled BUY. Returns false and keeps the existing entry if the
    /// symbol is already held.
    pub fn open(&mut self, entry: PositionEntry) -> bool {
        if self.entries.contains_key(&entry.symbol) {
            warn!("{} already has a position entry; keeping existing", entry.symbol);
            return false;
        }
        info!(
            "opened {} entry_price={:?} sentiment={:.3}",
            entry.symbol, entry.entry_price, entry.entry_sentiment
        );
        self.entries.insert(entry.symbol.clone(), entry);
        true
    }

    /// Fill in a pending entry price. No-op if the price is already known.
    pub fn backfill_price(&mut self, symbol: &str, price: f64) -> bool {
        if price <= 0.0 {
            return false;
        }
        match self.entries.get_mut(symbol) {
            Some(entry) if entry.entry_price.is_none() => {
                entry.entry_price = Some(price);
                if entry.peak_price < price {
                    entry.peak_price = price;
                }
                debug!("backfilled {} entry price {:.4}", symbol, price);
                true
            }
            _ => false,
        }
    }

    pub fn update_peak(&mut self, symbol: &str, price: f64, sentiment: Option<f64>) {
        if let Some(entry) = self.entries.get_mut(symbol) {
            if price > entry.peak_price {
                entry.peak_price = price;
            }
            if let Some(s) = sentiment {
                if s > entry.peak_sentiment {
                    entry.peak_sentiment = s;
                }
            }
        }
    }

    /// Backfill pending prices and peaks from the brokerage's view.
    pub fn sync_with_broker(&mut self, positions: &[BrokerPosition]) {
        for position in positions {
            if !self.is_held(&position.symbol) {
                continue;
            }
            self.backfill_price(&position.symbol, position.avg_entry_price);
            if position.current_price > 0.0 {
                self.update_peak(&position.symbol, position.current_price, None);
            }
        }
    }

    pub fn record_social(&mut self, symbol: &str, sample: SocialSample, max_len: usize) {
        let history = self.social_history.entry(symbol.to_string()).or_default();
        history.push_back(sample);
        while history.len() > max_len.max(1) {
            history.pop_front();
        }
    }

    pub fn social_history(&self, symbol: &str) -> Option<&VecDeque<SocialSample>> {
        self.social_history.get(symbol)
    }

    pub fn latest_social_volume(&self, symbol: &str) -> Option<u32> {
        self.social_history
            .get(symbol)
            .and_then(|h| h.back())
            .map(|s| s.volume)
    }

    /// Drop history for symbols neither held nor seen within `keep`.
    pub fn prune_social(&mut self, now: DateTime<Utc>, keep: chrono::Duration) {
        let entries = &self.entries;
        self.social_history.retain(|symbol, history| {
            entries.contains_key(symbol)
                || history.back().map(|s| now - s.timestamp <= keep).unwrap_or(false)
        });
    }

    /// Recompute staleness for one held symbol and cache the score.
    pub fn score_staleness(
        &mut self,
        symbol: &str,
        current_price: Option<f64>,
        now: DateTime<Utc>,
        params: &StalenessParams,
    ) -> Option<StalenessScore> {
        let entry = self.entries.get(symbol)?;
        let pnl_pct = match (entry.entry_price, current_price) {
            (Some(basis), Some(price)) if basis > 0.0 => Some((price - basis) / basis * 100.0),
            _ => None,
        };
        let input = StalenessInput {
            hours_held: (now - entry.entry_time).num_seconds() as f64 / 3600.0,
            pnl_pct,
            entry_social_volume: entry.entry_social_volume,
            current_social_volume: self
                .latest_social_volume(symbol)
                .unwrap_or(entry.entry_social_volume),
        };
        let score = params.score(&input);
        self.staleness.insert(symbol.to_string(), score.clone());
        Some(score)
    }

    /// Forget a symbol after its close succeeded at the brokerage. Only call
    /// this on success; a failed close must leave the state in place.
    pub fn close(&mut self, symbol: &str) -> Option<PositionEntry> {
        let removed = self.entries.remove(symbol);
        if removed.is_some() {
            self.staleness.remove(symbol);
            self.social_history.remove(symbol);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::AssetClass;

    fn entry(symbol: &str, price: Option<f64>, at: DateTime<Utc>) -> PositionEntry {
        PositionEntry {
            symbol: symbol.into(),
            asset_class: AssetClass::of_symbol(symbol),
            entry_time: at,
            entry_price: price,
            entry_sentiment: 0.6,
            entry_social_volume: 20,
            entry_sources: vec!["reddit".into()],
            entry_reason: "test".into(),
            peak_price: price.unwrap_or(0.0),
            peak_sentiment: 0.6,
        }
    }

    fn sample(at: DateTime<Utc>, volume: u32) -> SocialSample {
        SocialSample {
            timestamp: at,
            volume,
            sentiment: 0.2,
        }
    }

    #[test]
    fn test_one_entry_per_symbol() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        assert!(book.open(entry("AAPL", Some(100.0), now)));
        assert!(!book.open(entry("AAPL", Some(200.0), now)));
        assert_eq!(book.len(), 1);
        assert_eq!(book.get("AAPL").and_then(|e| e.entry_price), Some(100.0));
    }

    #[test]
    fn test_close_removes_exactly_that_symbol() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        book.open(entry("AAPL", Some(100.0), now));
        book.open(entry("TSLA", Some(200.0), now));
        book.record_social("AAPL", sample(now, 5), 10);
        book.record_social("TSLA", sample(now, 5), 10);
        book.score_staleness("AAPL", Some(101.0), now, &StalenessParams::default());

        let closed = book.close("AAPL");
        assert_eq!(closed.map(|e| e.symbol), Some("AAPL".to_string()));
        assert!(!book.is_held("AAPL"));
        assert!(book.social_history("AAPL").is_none());
        assert!(!book.staleness().contains_key("AAPL"));
        assert!(book.is_held("TSLA"));
        assert!(book.social_history("TSLA").is_some());
        assert!(book.close("AAPL").is_none());
    }

    #[test]
    fn test_backfill_only_when_pending() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        book.open(entry("BTC/USD", None, now));
        assert!(book.backfill_price("BTC/USD", 60_000.0));
        assert!(!book.backfill_price("BTC/USD", 61_000.0));
        let e = book.get("BTC/USD").unwrap();
        assert_eq!(e.entry_price, Some(60_000.0));
        assert_eq!(e.peak_price, 60_000.0);
    }

    #[test]
    fn test_sync_with_broker_backfills_and_tracks_peak() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        book.open(entry("NVDA", None, now));
        book.sync_with_broker(&[BrokerPosition {
            symbol: "NVDA".into(),
            asset_class: AssetClass::Equity,
            qty: 2.0,
            avg_entry_price: 100.0,
            current_price: 104.0,
            market_value: 208.0,
        }]);
        let e = book.get("NVDA").unwrap();
        assert_eq!(e.entry_price, Some(100.0));
        assert_eq!(e.peak_price, 104.0);
    }

    #[test]
    fn test_social_ring_is_bounded_and_feeds_staleness() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        book.open(entry("GME", Some(20.0), now - Duration::hours(96)));
        for v in [30, 25, 4] {
            book.record_social("GME", sample(now, v), 2);
        }
        assert_eq!(book.social_history("GME").map(|h| h.len()), Some(2));
        assert_eq!(book.latest_social_volume("GME"), Some(4));

        let score = book
            .score_staleness("GME", Some(20.4), now, &StalenessParams::default())
            .unwrap();
        assert!(score.is_stale);
    }

    #[test]
    fn test_prune_social_keeps_held_and_recent() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        book.open(entry("AAPL", Some(1.0), now));
        book.record_social("AAPL", sample(now - Duration::days(10), 1), 5);
        book.record_social("OLD", sample(now - Duration::days(10), 1), 5);
        book.record_social("NEW", sample(now, 1), 5);
        book.prune_social(now, Duration::days(2));
        assert!(book.social_history("AAPL").is_some());
        assert!(book.social_history("OLD").is_none());
        assert!(book.social_history("NEW").is_some());
    }

    #[test]
    fn test_book_round_trips_through_json() {
        let now = Utc::now();
        let mut book = PositionBook::default();
        book.open(entry("AAPL", None, now));
        let json = serde_json::to_string(&book).unwrap();
        let back: PositionBook = serde_json::from_str(&json).unwrap();
        assert!(back.is_held("AAPL"));
    }
}
