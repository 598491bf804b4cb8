use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use common::providers::MarketDataProvider;
use common::{with_timeout, AggregatedMarket, AlphaCandidate, Bar, BarInterval, Signal, Snapshot};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::scorer::{aggregate_markets, crypto_probabilities, daily_return, equity_probabilities};
use crate::types::{AlphaScanResult, DropCounts, ScanParams};

pub struct AlphaScanner {
    params: ScanParams,
    call_timeout_ms: u64,
}

impl AlphaScanner {
    pub fn new(params: ScanParams, call_timeout_ms: u64) -> Self {
        Self {
            params,
            call_timeout_ms,
        }
    }

    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    /// A scan runs only once the previous one is older than the interval.
    pub fn is_due(&self, previous: Option<&AlphaScanResult>, now: DateTime<Utc>) -> bool {
        match previous {
            Some(prev) => now - prev.scanned_at > Duration::seconds(self.params.scan_interval_secs),
            None => true,
        }
    }

    /// Re-scan if due, otherwise hand back the previous result unchanged.
    pub async fn refresh(
        &self,
        previous: Option<AlphaScanResult>,
        signals: &[Signal],
        market_data: &dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> common::Result<AlphaScanResult> {
        match previous {
            Some(prev) if !self.is_due(Some(&prev), now) => {
                debug!("alpha scan not due (last at {})", prev.scanned_at);
                Ok(prev)
            }
            _ => self.scan(signals, market_data, now).await,
        }
    }

    async fn fetch_history(
        &self,
        markets: &[AggregatedMarket],
        market_data: &dyn MarketDataProvider,
    ) -> HashMap<String, Vec<Bar>> {
        let limit = self.params.history_days + 1;
        let fetches = markets.iter().filter(|m| !m.is_crypto).map(|m| async move {
            let bars = with_timeout(
                "get_bars",
                self.call_timeout_ms,
                market_data.get_bars(&m.symbol, BarInterval::OneDay, limit),
            )
            .await;
            (m.symbol.clone(), bars)
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(symbol, bars)| match bars {
                Ok(bars) => Some((symbol, bars)),
                Err(e) => {
                    debug!("{}: no bar history ({})", symbol, e);
                    None
                }
            })
            .collect()
    }

    pub async fn scan(
        &self,
        signals: &[Signal],
        market_data: &dyn MarketDataProvider,
        now: DateTime<Utc>,
    ) -> common::Result<AlphaScanResult> {
        let markets = aggregate_markets(signals, self.params.max_candidates);
        let symbols: Vec<String> = markets.iter().map(|m| m.symbol.clone()).collect();

        let snapshots: HashMap<String, Snapshot> = if symbols.is_empty() {
            HashMap::new()
        } else {
            with_timeout(
                "get_snapshots",
                self.call_timeout_ms,
                async { Ok(market_data.get_snapshots(&symbols).await) },
            )
            .await?
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect()
        };
        let history = self.fetch_history(&markets, market_data).await;

        let mut dropped = DropCounts::default();
        let mut scored = Vec::new();
        for market in &markets {
            let Some(snapshot) = snapshots.get(&market.symbol) else {
                dropped.no_snapshot += 1;
                continue;
            };
            let bars = history.get(&market.symbol).map(Vec::as_slice).unwrap_or(&[]);
            match self.score(market, snapshot, bars, &mut dropped) {
                Some(candidate) => scored.push(candidate),
                None => continue,
            }
        }

        let mut edge_candidates: Vec<AlphaCandidate> =
            scored.iter().filter(|c| c.alpha > 0.0).cloned().collect();
        edge_candidates.sort_by(|a, b| b.alpha.total_cmp(&a.alpha).then_with(|| a.symbol.cmp(&b.symbol)));
        edge_candidates.truncate(self.params.max_edge_candidates);

        // Drawn from the edge funnel so it can never hold a symbol the funnel cut.
        let top_alpha: Vec<AlphaCandidate> = edge_candidates
            .iter()
            .filter(|c| c.alpha >= self.params.top_alpha_threshold)
            .take(self.params.max_top_alpha)
            .cloned()
            .collect();

        info!(
            "Alpha scan: {} symbols -> {} edge, {} top (dropped: {} no data, {} liquidity, {} spread, {} edge)",
            markets.len(),
            edge_candidates.len(),
            top_alpha.len(),
            dropped.no_snapshot,
            dropped.liquidity,
            dropped.spread,
            dropped.edge
        );

        Ok(AlphaScanResult {
            scanned_at: now,
            universe: markets.len(),
            edge_candidates,
            top_alpha,
            dropped,
        })
    }

    fn score(
        &self,
        market: &AggregatedMarket,
        snapshot: &Snapshot,
        history: &[Bar],
        dropped: &mut DropCounts,
    ) -> Option<AlphaCandidate> {
        let p = &self.params;
        let price = snapshot.price()?;
        let daily_volume = snapshot.daily_bar.map(|b| b.volume).unwrap_or(0.0);
        let notional = price * daily_volume;

        let (min_notional, max_spread, min_edge) = if market.is_crypto {
            (p.crypto_min_notional_volume, p.crypto_max_spread_pct, p.crypto_min_edge)
        } else {
            (p.min_notional_volume, p.max_spread_pct, p.min_edge)
        };

        if notional < min_notional {
            debug!("{}: notional {:.0} below {:.0}", market.symbol, notional, min_notional);
            dropped.liquidity += 1;
            return None;
        }

        let spread_pct = match snapshot.quote.and_then(|q| q.spread_pct()) {
            Some(spread) if spread <= max_spread => spread,
            other => {
                debug!("{}: spread {:?} rejected (max {:.4})", market.symbol, other, max_spread);
                dropped.spread += 1;
                return None;
            }
        };

        let (implied_prob, calculated_prob) = if market.is_crypto {
            crypto_probabilities(market.sentiment_avg, market.momentum_avg)
        } else {
            let Some(ret) = daily_return(snapshot) else {
                warn!("{}: missing daily bars, cannot derive implied probability", market.symbol);
                dropped.no_snapshot += 1;
                return None;
            };
            equity_probabilities(market.sentiment_avg, ret, history, p.min_history_days)
        };
        let alpha = calculated_prob - implied_prob;

        if alpha.abs() < min_edge {
            debug!("{}: |alpha| {:.3} below {:.3}", market.symbol, alpha.abs(), min_edge);
            dropped.edge += 1;
            return None;
        }

        Some(AlphaCandidate {
            symbol: market.symbol.clone(),
            is_crypto: market.is_crypto,
            price,
            notional_volume: notional,
            spread_pct: Some(spread_pct),
            implied_prob,
            calculated_prob,
            alpha,
            sentiment_avg: market.sentiment_avg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{Error, Quote};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixtureMarket {
        snapshots: HashMap<String, Snapshot>,
        snapshot_calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for FixtureMarket {
        async fn get_snapshot(&self, symbol: &str) -> common::Result<Snapshot> {
            self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
            self.snapshots
                .get(symbol)
                .cloned()
                .ok_or_else(|| Error::provider("fixture", "missing"))
        }

        async fn get_bars(&self, _: &str, _: BarInterval, _: usize) -> common::Result<Vec<Bar>> {
            Err(Error::provider("fixture", "no bars"))
        }

        async fn get_quote(&self, _: &str) -> common::Result<Quote> {
            Err(Error::provider("fixture", "no quote"))
        }
    }

    fn bar(close: f64, volume: f64) -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    fn snapshot(symbol: &str, prev: f64, close: f64, volume: f64, bid: f64, ask: f64) -> Snapshot {
        Snapshot {
            symbol: symbol.into(),
            last_trade: Some(close),
            quote: Some(Quote { bid, ask }),
            daily_bar: Some(bar(close, volume)),
            prev_daily_bar: Some(bar(prev, volume)),
        }
    }

    fn signal(symbol: &str, sentiment: f64, momentum: Option<f64>) -> Signal {
        Signal {
            symbol: symbol.into(),
            source: "reddit".into(),
            source_detail: "stocks".into(),
            raw_sentiment: sentiment,
            sentiment,
            volume: 3,
            freshness: 1.0,
            source_weight: 1.0,
            reason: String::new(),
            momentum,
            price: None,
            is_crypto: symbol.contains('/'),
            timestamp: Utc::now(),
        }
    }

    fn fixture() -> FixtureMarket {
        let mut snapshots = HashMap::new();
        // Flat day, tight spread, deep liquidity: positive edge for bullish chatter.
        snapshots.insert("GOOD".into(), snapshot("GOOD", 100.0, 100.0, 1_000_000.0, 99.99, 100.01));
        // Illiquid.
        snapshots.insert("THIN".into(), snapshot("THIN", 5.0, 5.0, 1_000.0, 4.99, 5.01));
        // Wide spread.
        snapshots.insert("WIDE".into(), snapshot("WIDE", 50.0, 50.0, 1_000_000.0, 49.0, 51.0));
        // Already ran 4% on 2% vol: the market priced it in.
        snapshots.insert("RAN".into(), snapshot("RAN", 100.0, 104.0, 1_000_000.0, 103.99, 104.01));
        snapshots.insert(
            "BTC/USD".into(),
            snapshot("BTC/USD", 60_000.0, 61_000.0, 1_000.0, 60_990.0, 61_010.0),
        );
        FixtureMarket {
            snapshots,
            snapshot_calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_scan_filters_and_ranks() {
        let market = fixture();
        let scanner = AlphaScanner::new(ScanParams::default(), 1_000);
        let signals = vec![
            signal("GOOD", 0.8, None),
            signal("THIN", 0.9, None),
            signal("WIDE", 0.9, None),
            signal("RAN", 0.9, None),
            signal("BTC/USD", 0.6, Some(2.0)),
            signal("GHOST", 0.9, None),
        ];

        let result = scanner.scan(&signals, &market, Utc::now()).await.unwrap();
        let edge: Vec<&str> = result.edge_candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(edge, vec!["GOOD", "BTC/USD"]);
        assert_eq!(result.dropped.liquidity, 1);
        assert_eq!(result.dropped.spread, 1);
        assert_eq!(result.dropped.no_snapshot, 1);
        assert_eq!(result.dropped.edge, 0);

        let good = result.find("GOOD").unwrap();
        assert!((good.implied_prob - 0.5).abs() < 1e-12);
        assert!((good.alpha - 0.3).abs() < 1e-9);

        // RAN carries a negative edge: scored, but never an entry candidate.
        assert!(result.find("RAN").is_none());

        for candidate in result.edge_candidates.iter().chain(result.top_alpha.iter()) {
            assert!((-1.0..=1.0).contains(&candidate.alpha));
        }
        // Top alpha is a subset of the edge funnel.
        for top in &result.top_alpha {
            assert!(result.edge_candidates.iter().any(|c| c.symbol == top.symbol));
        }
    }

    #[tokio::test]
    async fn test_top_alpha_stays_inside_a_narrow_edge_funnel() {
        let market = fixture();
        let params = ScanParams {
            max_edge_candidates: 1,
            max_top_alpha: 5,
            top_alpha_threshold: 0.1,
            ..ScanParams::default()
        };
        let scanner = AlphaScanner::new(params, 1_000);
        let signals = vec![signal("GOOD", 0.8, None), signal("BTC/USD", 0.6, Some(2.0))];

        let result = scanner.scan(&signals, &market, Utc::now()).await.unwrap();
        let edge: Vec<&str> = result.edge_candidates.iter().map(|c| c.symbol.as_str()).collect();
        let top: Vec<&str> = result.top_alpha.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(edge, vec!["GOOD"]);
        assert_eq!(top, vec!["GOOD"]);
    }

    #[tokio::test]
    async fn test_refresh_respects_interval() {
        let market = fixture();
        let scanner = AlphaScanner::new(ScanParams::default(), 1_000);
        let now = Utc::now();
        let signals = vec![signal("GOOD", 0.8, None)];

        let first = scanner.refresh(None, &signals, &market, now).await.unwrap();
        let calls_after_first = market.snapshot_calls.load(Ordering::SeqCst);

        let second = scanner
            .refresh(Some(first.clone()), &signals, &market, now + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(market.snapshot_calls.load(Ordering::SeqCst), calls_after_first);

        let at_boundary = scanner
            .refresh(Some(first.clone()), &signals, &market, now + Duration::seconds(300))
            .await
            .unwrap();
        assert_eq!(at_boundary, first);

        let third = scanner
            .refresh(Some(first.clone()), &signals, &market, now + Duration::seconds(301))
            .await
            .unwrap();
        assert!(third.scanned_at > first.scanned_at);
    }
}
