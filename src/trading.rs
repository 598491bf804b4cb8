//! Market passes: gathering, pre-open planning, entries and exits.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use candidate_engine::AlphaScanResult;
use chrono::{DateTime, Duration, Utc};
use common::{
    with_timeout, Account, AlphaCandidate, Asset, AssetClass, AssetFilter, BrokerPosition,
    ConfirmationResult, NotifyKind, PositionEntry, Result, Signal, Verdict,
};
use decision_engine::{CompositionInput, Decision, TradeIntent, VetoReason};
use execution_engine::{ExecutionOutcome, OrderSize};
use futures::future::join_all;
use position_engine::{ExitReason, ExitSignal, SizeDecision, SocialSample};
use serde_json::json;
use signal_engine::EligibilityFilter;
use tracing::{debug, info, warn};

use crate::bot::{Bot, WakeReport};
use crate::phase::{MarketPhase, PhaseInfo};
use crate::state::{PlannedEntry, PremarketPlan};

/// Social history for symbols that are neither held nor mentioned.
const SOCIAL_KEEP_DAYS: i64 = 2;

/// One symbol under consideration for entry.
#[derive(Debug, Clone)]
pub(crate) struct EntryCandidate {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub sentiment: f64,
    pub social_volume: u32,
    pub sources: Vec<String>,
    pub alpha: Option<AlphaCandidate>,
}

/// Brokerage view used for sizing and risk within one pass.
pub(crate) struct BrokerBook {
    pub positions: Vec<BrokerPosition>,
    pub account: Account,
}

impl Bot {
    pub(crate) async fn broker_book(&self) -> Result<BrokerBook> {
        let ms = self.config.trading.call_timeout_ms;
        let (positions, account) = futures::try_join!(
            with_timeout("get_positions", ms, self.broker.get_positions()),
            with_timeout("get_account", ms, self.broker.get_account()),
        )?;
        Ok(BrokerBook { positions, account })
    }

    pub(crate) async fn refresh_crypto_universe(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.config.trading.crypto_enabled {
            return Ok(());
        }
        let interval = self.config.scheduler.crypto_universe_refresh_secs;
        if !self.state.crypto_universe.is_empty()
            && !self.state.is_due("crypto_universe", interval, now)
        {
            return Ok(());
        }

        let filter = AssetFilter {
            class: Some(AssetClass::Crypto),
            tradable_only: true,
        };
        let assets = with_timeout(
            "list_assets",
            self.config.trading.call_timeout_ms,
            self.broker.list_assets(filter),
        )
        .await?;
        let mut universe: Vec<String> = assets
            .into_iter()
            .filter(|a| a.tradable && a.class == AssetClass::Crypto)
            .map(|a| a.symbol)
            .collect();
        universe.sort();
        universe.dedup();

        info!("crypto universe: {} tradable pairs", universe.len());
        self.state.crypto_universe = universe;
        self.state.mark_run("crypto_universe", now);
        Ok(())
    }

    pub(crate) async fn gather_signals(&mut self, phase: &PhaseInfo, now: DateTime<Utc>) -> Result<()> {
        if !phase.equities_active() && !phase.crypto_active {
            debug!("no active market; skipping gather");
            return Ok(());
        }
        if !self.state.is_due("gather", self.config.scheduler.gather_interval_secs, now) {
            return Ok(());
        }
        let ms = self.config.trading.call_timeout_ms;

        let batches = with_timeout("fetch_trending", ms, self.social.fetch_trending()).await?;
        let mut signals = self.aggregator.aggregate(&batches, now);
        if !phase.equities_active() {
            signals.retain(|s| s.is_crypto);
        }
        if !phase.crypto_active {
            signals.retain(|s| !s.is_crypto);
        }

        let equity_symbols: BTreeSet<String> = signals
            .iter()
            .filter(|s| !s.is_crypto)
            .map(|s| s.symbol.clone())
            .collect();
        let broker = &self.broker;
        let lookups = equity_symbols
            .iter()
            .map(|symbol| with_timeout("get_asset", ms, broker.get_asset(symbol)));
        let assets: Vec<Asset> = join_all(lookups)
            .await
            .into_iter()
            .zip(equity_symbols.iter())
            .filter_map(|(result, symbol)| match result {
                Ok(asset) => Some(asset),
                Err(e) => {
                    debug!("{}: asset lookup failed ({})", symbol, e);
                    None
                }
            })
            .collect();

        let filter = EligibilityFilter::new(
            self.config.signals.allowed_exchanges.clone(),
            assets,
            self.state.crypto_universe.clone(),
        );
        let signals = filter.apply(signals);

        let mut by_symbol: BTreeMap<String, Vec<Signal>> = BTreeMap::new();
        for signal in signals {
            by_symbol.entry(signal.symbol.clone()).or_default().push(signal);
        }
        let signal_count: usize = by_symbol.values().map(Vec::len).sum();
        let symbol_count = by_symbol.len();

        let history_len = self.config.signals.social_history_len;
        for entry in self.state.positions.entries().cloned().collect::<Vec<_>>() {
            let gathered = match entry.asset_class {
                AssetClass::Crypto => phase.crypto_active,
                AssetClass::Equity => phase.equities_active(),
                AssetClass::Option => false,
            };
            if gathered && !by_symbol.contains_key(&entry.symbol) {
                // Held but silent: volume decay should see it.
                let sample = SocialSample {
                    timestamp: now,
                    volume: 0,
                    sentiment: 0.0,
                };
                self.state
                    .positions
                    .record_social(&entry.symbol, sample, history_len);
            }
        }
        // Each gather supersedes the previous cycle's signal set.
        self.state.signal_cache.clear();
        for (symbol, group) in by_symbol {
            let volume: u32 = group.iter().map(|s| s.volume).sum();
            let sentiment = group.iter().map(|s| s.sentiment).sum::<f64>() / group.len() as f64;
            let sample = SocialSample {
                timestamp: now,
                volume,
                sentiment,
            };
            self.state.positions.record_social(&symbol, sample, history_len);
            self.state.positions.update_peak(&symbol, 0.0, Some(sentiment));
            self.state.signal_cache.insert(symbol, group, now);
        }
        self.state
            .positions
            .prune_social(now, Duration::days(SOCIAL_KEEP_DAYS));

        self.journal.record(
            "signals_gathered",
            json!({
                "sources": batches.len(),
                "signals": signal_count,
                "symbols": symbol_count,
                "cached_symbols": self.state.signal_cache.len(),
            }),
        );
        self.state.mark_run("gather", now);
        Ok(())
    }

    /// Mean sentiment, total volume and sources over a symbol's cached signals.
    pub(crate) fn market_context(&self, symbol: &str, now: DateTime<Utc>) -> (f64, u32, Vec<String>) {
        let Some(signals) = self.state.signal_cache.get(symbol, now) else {
            return (0.0, 0, Vec::new());
        };
        if signals.is_empty() {
            return (0.0, 0, Vec::new());
        }
        let sentiment = signals.iter().map(|s| s.sentiment).sum::<f64>() / signals.len() as f64;
        let volume = signals.iter().map(|s| s.volume).sum();
        let mut sources: Vec<String> = signals.iter().map(|s| s.source.clone()).collect();
        sources.sort();
        sources.dedup();
        (sentiment, volume, sources)
    }

    fn candidate(&self, symbol: &str, alpha: Option<AlphaCandidate>, now: DateTime<Utc>) -> EntryCandidate {
        let (sentiment, social_volume, sources) = self.market_context(symbol, now);
        EntryCandidate {
            symbol: symbol.to_string(),
            asset_class: AssetClass::of_symbol(symbol),
            sentiment: alpha.as_ref().map(|a| a.sentiment_avg).unwrap_or(sentiment),
            social_volume,
            sources,
            alpha,
        }
    }

    /// Re-scan when due and keep the result on the state.
    pub(crate) async fn refresh_alpha(&mut self, now: DateTime<Utc>) -> Result<AlphaScanResult> {
        let signals = self.state.live_signals(now);
        let previous = self.state.alpha_scan.clone();
        let scan = self
            .scanner
            .refresh(previous, &signals, self.market.as_ref(), now)
            .await?;
        if scan.scanned_at == now {
            self.journal.record(
                "alpha_scan",
                json!({
                    "universe": scan.universe,
                    "edge_candidates": scan.edge_candidates.len(),
                    "top_alpha": scan.top_alpha.iter().map(|c| &c.symbol).collect::<Vec<_>>(),
                    "dropped": scan.dropped,
                }),
            );
        }
        self.state.alpha_scan = Some(scan.clone());
        Ok(scan)
    }

    /// Top-alpha equities first, then equities backed only by a BUY from
    /// signal research.
    pub(crate) fn equity_candidates(
        &self,
        scan: &AlphaScanResult,
        exclude: &[String],
        now: DateTime<Utc>,
    ) -> Vec<EntryCandidate> {
        let skip = |symbol: &str| {
            self.state.positions.is_held(symbol) || exclude.iter().any(|s| s == symbol)
        };
        let mut candidates: Vec<EntryCandidate> = scan
            .top_alpha
            .iter()
            .filter(|c| !c.is_crypto && !skip(&c.symbol))
            .map(|c| self.candidate(&c.symbol, Some(c.clone()), now))
            .collect();

        let min_sentiment = self.config.signals.min_sentiment;
        let mut fallback: Vec<EntryCandidate> = self
            .state
            .signal_research_cache
            .iter_live(now)
            .filter(|(symbol, verdict)| {
                verdict.verdict == Verdict::Buy
                    && AssetClass::of_symbol(symbol) == AssetClass::Equity
                    && !skip(symbol)
                    && scan.find(symbol).is_none()
            })
            .map(|(symbol, _)| self.candidate(symbol, None, now))
            .filter(|c| c.sentiment >= min_sentiment)
            .collect();
        fallback.sort_by(|a, b| b.sentiment.total_cmp(&a.sentiment).then_with(|| a.symbol.cmp(&b.symbol)));
        candidates.extend(fallback);
        candidates
    }

    pub(crate) fn decide(
        &self,
        candidate: &EntryCandidate,
        confirmation: Option<&ConfirmationResult>,
        now: DateTime<Utc>,
    ) -> Decision {
        self.composer.compose(&CompositionInput {
            symbol: &candidate.symbol,
            asset_class: candidate.asset_class,
            sentiment: candidate.sentiment,
            alpha: candidate.alpha.as_ref(),
            judge: self.state.research_cache.get(&candidate.symbol, now),
            signal_research: self.state.signal_research_cache.get(&candidate.symbol, now),
            confirmation,
        })
    }

    pub(crate) fn record_veto(&mut self, veto: &VetoReason, report: &mut WakeReport) {
        report.vetoes += 1;
        self.journal.record(
            "decision_veto",
            json!({ "symbol": veto.symbol, "veto": veto.kind, "reason": veto.reason }),
        );
    }

    /// Confirm, compose, and enter on approval.
    async fn consider(
        &mut self,
        candidate: &EntryCandidate,
        book: &mut BrokerBook,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) {
        let confirmation = if self.composer.wants_confirmation(candidate.sentiment) {
            self.confirm(&candidate.symbol, candidate.sentiment, now).await
        } else {
            None
        };
        match self.decide(candidate, confirmation.as_ref(), now) {
            Decision::Approve(intent) => {
                self.enter(candidate, intent, book, now, report).await;
            }
            Decision::Veto(veto) => self.record_veto(&veto, report),
        }
    }

    pub(crate) async fn enter(
        &mut self,
        candidate: &EntryCandidate,
        intent: TradeIntent,
        book: &mut BrokerBook,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) {
        let symbol = intent.symbol.clone();
        if self.state.positions.is_held(&symbol) {
            debug!("{} already held; skipping entry", symbol);
            return;
        }
        if intent.asset_class == AssetClass::Option && !self.config.trading.options_enabled {
            info!("{}: options trading disabled", symbol);
            return;
        }

        let notional = match self
            .config
            .sizing
            .size(book.account.cash, intent.confidence, intent.asset_class)
        {
            SizeDecision::Order(notional) => notional,
            SizeDecision::TooSmall(notional) => {
                info!("{}: order size {:.2} below minimum", symbol, notional);
                report.rejections += 1;
                self.journal.record(
                    "decision_rejected",
                    json!({ "symbol": symbol, "reason": "below minimum notional", "notional": notional }),
                );
                return;
            }
        };

        if let Err(e) = self
            .risk_guard
            .check_buy(&symbol, notional, &book.positions, &book.account)
        {
            warn!("Risk check failed: {}", e);
            report.rejections += 1;
            self.journal.record(
                "risk_rejected",
                json!({ "symbol": symbol, "code": e.code(), "error": e.to_string() }),
            );
            return;
        }

        match self.execution.buy(&intent, OrderSize::Notional(notional)).await {
            ExecutionOutcome::Placed(ack) => {
                self.risk_guard.record_order();
                book.account.cash -= notional;
                match with_timeout(
                    "get_positions",
                    self.config.trading.call_timeout_ms,
                    self.broker.get_positions(),
                )
                .await
                {
                    Ok(positions) => book.positions = positions,
                    Err(e) => debug!("positions refresh after fill failed: {}", e),
                }
                // Unknown fill stays pending until the broker reports a basis.
                let entry_price = ack.filled_avg_price.filter(|p| *p > 0.0).or_else(|| {
                    book.positions
                        .iter()
                        .find(|p| p.symbol == symbol)
                        .map(|p| p.avg_entry_price)
                        .filter(|p| *p > 0.0)
                });
                self.state.positions.open(PositionEntry {
                    symbol: symbol.clone(),
                    asset_class: intent.asset_class,
                    entry_time: now,
                    entry_price,
                    entry_sentiment: candidate.sentiment,
                    entry_social_volume: candidate.social_volume,
                    entry_sources: candidate.sources.clone(),
                    entry_reason: intent.reasons.join("; "),
                    peak_price: entry_price.unwrap_or(0.0),
                    peak_sentiment: candidate.sentiment,
                });
                report.entries += 1;
                self.journal.record(
                    "order_placed",
                    json!({
                        "symbol": symbol,
                        "order_id": ack.order_id,
                        "status": ack.status,
                        "notional": notional,
                        "entry_price": entry_price,
                        "confidence": intent.confidence,
                        "basis": intent.basis,
                        "reasons": intent.reasons,
                    }),
                );
                let message = format!(
                    "bought ${:.2} at {} (confidence {:.2})",
                    notional,
                    entry_price.map(|p| format!("{:.4}", p)).unwrap_or_else(|| "pending".into()),
                    intent.confidence
                );
                self.notify(&symbol, NotifyKind::Entry, message, now).await;
            }
            ExecutionOutcome::ShadowSkipped | ExecutionOutcome::LiveDisabled => {
                self.journal.record(
                    "decision_shadow_trade",
                    json!({
                        "symbol": symbol,
                        "notional": notional,
                        "confidence": intent.confidence,
                        "basis": intent.basis,
                    }),
                );
            }
            ExecutionOutcome::Rejected(reason) => {
                report.rejections += 1;
                self.journal.record(
                    "order_rejected",
                    json!({ "symbol": symbol, "side": "buy", "reason": reason }),
                );
            }
        }
    }

    /// Close at the brokerage; local state only changes once the close lands.
    pub(crate) async fn close_position(
        &mut self,
        signal: ExitSignal,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) {
        let reason = format!("{:?}: {}", signal.reason, signal.detail);
        match self.execution.close(&signal.symbol, &reason).await {
            ExecutionOutcome::Placed(ack) => {
                let entry = self.state.positions.close(&signal.symbol);
                self.state.research_cache.remove(&signal.symbol);
                self.state.confirmation_cache.remove(&signal.symbol);
                let held_hours = entry
                    .as_ref()
                    .map(|e| (now - e.entry_time).num_minutes() as f64 / 60.0);
                self.journal.record(
                    "position_closed",
                    json!({
                        "symbol": signal.symbol,
                        "reason": signal.reason,
                        "detail": signal.detail,
                        "pnl_pct": signal.pnl_pct,
                        "exit_price": ack.filled_avg_price,
                        "held_hours": held_hours,
                    }),
                );
                report.exits += 1;
                report.closed.push(signal.symbol.clone());
                self.notify(&signal.symbol, NotifyKind::Exit, reason, now).await;
            }
            ExecutionOutcome::ShadowSkipped | ExecutionOutcome::LiveDisabled => {
                self.journal.record(
                    "exit_shadowed",
                    json!({ "symbol": signal.symbol, "reason": signal.reason, "pnl_pct": signal.pnl_pct }),
                );
            }
            ExecutionOutcome::Rejected(error) => {
                report.rejections += 1;
                self.journal.record(
                    "order_rejected",
                    json!({ "symbol": signal.symbol, "side": "sell", "reason": error }),
                );
            }
        }
    }

    /// Broker marks first, snapshots for anything the broker doesn't price.
    async fn current_prices(
        &self,
        held: &[PositionEntry],
        positions: &[BrokerPosition],
    ) -> HashMap<String, f64> {
        let mut prices: HashMap<String, f64> = positions
            .iter()
            .filter(|p| p.current_price > 0.0)
            .map(|p| (p.symbol.clone(), p.current_price))
            .collect();
        let missing: Vec<String> = held
            .iter()
            .filter(|e| !prices.contains_key(&e.symbol))
            .map(|e| e.symbol.clone())
            .collect();
        if missing.is_empty() {
            return prices;
        }
        let market = &self.market;
        match with_timeout(
            "get_snapshots",
            self.config.trading.call_timeout_ms,
            async { Ok(market.get_snapshots(&missing).await) },
        )
        .await
        {
            Ok(snapshots) => {
                for snapshot in snapshots {
                    if let Some(price) = snapshot.price() {
                        prices.insert(snapshot.symbol.clone(), price);
                    }
                }
            }
            Err(e) => warn!("snapshot fallback for exits failed: {}", e),
        }
        prices
    }

    /// Score and apply exits for held entries of the given classes.
    async fn evaluate_exits(
        &mut self,
        classes: &[AssetClass],
        book: &BrokerBook,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) {
        let held: Vec<PositionEntry> = self
            .state
            .positions
            .entries()
            .filter(|e| classes.contains(&e.asset_class))
            .cloned()
            .collect();
        if held.is_empty() {
            return;
        }
        let prices = self.current_prices(&held, &book.positions).await;

        for entry in held {
            let symbol = entry.symbol.as_str();
            let price = prices.get(symbol).copied();
            if let Some(p) = price {
                self.state.positions.update_peak(symbol, p, None);
            }
            let staleness = if entry.asset_class == AssetClass::Option {
                None
            } else {
                self.state
                    .positions
                    .score_staleness(symbol, price, now, &self.config.staleness)
            };
            let Some(price) = price else {
                debug!("{}: no price; exit check skipped", symbol);
                continue;
            };
            let Some(current) = self.state.positions.get(symbol).cloned() else {
                continue;
            };
            if let Some(signal) = self
                .config
                .positions
                .evaluate(&current, price, staleness.as_ref())
            {
                info!("exit signal {} {:?}: {}", signal.symbol, signal.reason, signal.detail);
                self.close_position(signal, now, report).await;
            }
        }
    }

    pub(crate) async fn build_premarket_plan(
        &mut self,
        phase: &PhaseInfo,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if !phase.in_plan_window(&self.config.scheduler)
            || self.state.last_plan_day == Some(phase.session_day)
        {
            return Ok(());
        }

        let scan = self.refresh_alpha(now).await?;
        let candidates = self.equity_candidates(&scan, &[], now);
        self.research_candidates(&candidates, now, report).await;

        let mut intents = Vec::new();
        for candidate in &candidates {
            match self.decide(candidate, None, now) {
                Decision::Approve(intent) => intents.push(PlannedEntry {
                    intent,
                    sentiment: candidate.sentiment,
                    social_volume: candidate.social_volume,
                    sources: candidate.sources.clone(),
                }),
                Decision::Veto(veto) => self.record_veto(&veto, report),
            }
        }

        info!(
            "pre-open plan for {}: {} of {} candidates approved",
            phase.session_day,
            intents.len(),
            candidates.len()
        );
        self.journal.record(
            "premarket_plan",
            json!({
                "day": phase.session_day,
                "candidates": candidates.len(),
                "intents": intents.iter().map(|p| &p.intent.symbol).collect::<Vec<_>>(),
            }),
        );
        self.state.premarket_plan = Some(PremarketPlan {
            day: phase.session_day,
            created_at: now,
            intents,
        });
        self.state.last_plan_day = Some(phase.session_day);
        Ok(())
    }

    pub(crate) async fn execute_premarket_plan(
        &mut self,
        phase: &PhaseInfo,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if !phase.in_open_window(&self.config.scheduler) {
            return Ok(());
        }
        match &self.state.premarket_plan {
            None => return Ok(()),
            Some(plan) if plan.day != phase.session_day => {
                info!("discarding pre-open plan for {}", plan.day);
                self.state.premarket_plan = None;
                return Ok(());
            }
            Some(_) => {}
        }

        let mut book = self.broker_book().await?;
        let Some(plan) = self.state.premarket_plan.take() else {
            return Ok(());
        };
        info!("executing pre-open plan: {} intents", plan.intents.len());
        for planned in plan.intents {
            let candidate = EntryCandidate {
                symbol: planned.intent.symbol.clone(),
                asset_class: planned.intent.asset_class,
                sentiment: planned.sentiment,
                social_volume: planned.social_volume,
                sources: planned.sources,
                alpha: None,
            };
            self.enter(&candidate, planned.intent, &mut book, now, report).await;
        }
        Ok(())
    }

    pub(crate) async fn crypto_pass(
        &mut self,
        phase: &PhaseInfo,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if !phase.crypto_active
            || !self.state.is_due("crypto", self.config.scheduler.crypto_interval_secs, now)
        {
            return Ok(());
        }

        let mut book = self.broker_book().await?;
        self.state.positions.sync_with_broker(&book.positions);
        self.evaluate_exits(&[AssetClass::Crypto], &book, now, report).await;

        let scan = self.refresh_alpha(now).await?;
        let candidates: Vec<EntryCandidate> = scan
            .edge_candidates
            .iter()
            .filter(|c| {
                c.is_crypto
                    && !self.state.positions.is_held(&c.symbol)
                    && !report.closed.contains(&c.symbol)
                    && self.state.crypto_universe.contains(&c.symbol)
            })
            .map(|c| self.candidate(&c.symbol, Some(c.clone()), now))
            .collect();
        for candidate in &candidates {
            self.consider(candidate, &mut book, now, report).await;
        }

        self.state.mark_run("crypto", now);
        Ok(())
    }

    pub(crate) async fn analyst_pass(
        &mut self,
        phase: &PhaseInfo,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if phase.equity != MarketPhase::Open
            || !self.state.is_due("analyst", self.config.scheduler.analyst_interval_secs, now)
        {
            return Ok(());
        }

        let mut book = self.broker_book().await?;
        self.state.positions.sync_with_broker(&book.positions);
        self.evaluate_exits(&[AssetClass::Equity], &book, now, report).await;

        let scan = self.refresh_alpha(now).await?;
        if self.config.notify.notify_top_alpha {
            for c in scan.top_alpha.iter().filter(|c| !c.is_crypto) {
                let message = format!(
                    "alpha {:.3} (implied {:.2}, calculated {:.2}) at {:.2}",
                    c.alpha, c.implied_prob, c.calculated_prob, c.price
                );
                self.notify(&c.symbol, NotifyKind::TopAlpha, message, now).await;
            }
        }

        let candidates = self.equity_candidates(&scan, &report.closed, now);
        self.research_candidates(&candidates, now, report).await;
        for candidate in &candidates {
            self.consider(candidate, &mut book, now, report).await;
        }

        self.state.mark_run("analyst", now);
        Ok(())
    }

    pub(crate) async fn options_exits(
        &mut self,
        phase: &PhaseInfo,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if phase.equity != MarketPhase::Open
            || !self
                .state
                .positions
                .entries()
                .any(|e| e.asset_class == AssetClass::Option)
        {
            return Ok(());
        }
        let book = self.broker_book().await?;
        self.state.positions.sync_with_broker(&book.positions);
        self.evaluate_exits(&[AssetClass::Option], &book, now, report).await;
        Ok(())
    }

    pub(crate) async fn exit_on_news(
        &mut self,
        symbol: &str,
        detail: String,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) {
        let signal = ExitSignal {
            symbol: symbol.to_string(),
            reason: ExitReason::BreakingNews,
            pnl_pct: None,
            detail,
        };
        self.close_position(signal, now, report).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{harness, live_config, open_now};
    use chrono::TimeZone;
    use common::providers::BrokerageProvider;
    use common::{Clock, ResearchVerdict};

    #[tokio::test]
    async fn test_take_profit_closes_without_same_wake_reentry() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);
        h.bot.wake(now).await;
        assert!(h.bot.state().positions.is_held("GOOD"));

        h.broker.set_price("GOOD", 60.0);
        let later = now + Duration::minutes(10);
        let report = h.bot.wake(later).await;
        assert_eq!(report.exits, 1);
        assert_eq!(report.closed, vec!["GOOD".to_string()]);
        assert_eq!(report.entries, 0);
        assert!(!h.bot.state().positions.is_held("GOOD"));
        assert!(h.broker.get_positions().await.unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_gather_replaces_previous_signal_set() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);
        let earlier = now - Duration::minutes(10);
        h.bot.state.signal_cache.insert(
            "STALE",
            vec![Signal {
                symbol: "STALE".into(),
                source: "reddit".into(),
                source_detail: "stocks".into(),
                raw_sentiment: 0.9,
                sentiment: 0.9,
                volume: 6,
                freshness: 1.0,
                source_weight: 0.8,
                reason: "earlier cycle".into(),
                momentum: None,
                price: None,
                is_crypto: false,
                timestamp: earlier,
            }],
            earlier,
        );

        let report = h.bot.wake(now).await;
        assert!(report.failed_steps.is_empty(), "{:?}", report.failed_steps);
        let symbols: BTreeSet<String> = h
            .bot
            .state()
            .live_signals(now)
            .into_iter()
            .map(|s| s.symbol)
            .collect();
        assert_eq!(symbols, BTreeSet::from(["GOOD".to_string()]));
        assert!(!h.bot.state().signal_cache.contains("STALE", now));
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_pending_entry_price_is_backfilled_and_not_exited() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);
        h.bot.wake(now).await;

        // Pretend the fill price never arrived.
        let mut entry = h.bot.state.positions.close("GOOD").unwrap();
        entry.entry_price = None;
        entry.peak_price = 0.0;
        h.bot.state.positions.open(entry);

        h.broker.set_price("GOOD", 30.0);
        let report = h.bot.wake(now + Duration::minutes(10)).await;
        // Backfilled from the broker's basis first, then the crash is a stop loss.
        assert_eq!(report.exits, 1);
        assert!(!h.bot.state().positions.is_held("GOOD"));
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_signal_research_fallback_candidate() {
        let now = open_now();
        let h = harness(now, live_config(), Verdict::Buy);
        let mut bot = h.bot;
        bot.state.signal_cache.insert(
            "SIDE",
            vec![Signal {
                symbol: "SIDE".into(),
                source: "reddit".into(),
                source_detail: "stocks".into(),
                raw_sentiment: 0.8,
                sentiment: 0.7,
                volume: 4,
                freshness: 1.0,
                source_weight: 0.8,
                reason: "test".into(),
                momentum: None,
                price: None,
                is_crypto: false,
                timestamp: now,
            }],
            now,
        );
        bot.state.signal_research_cache.insert(
            "SIDE",
            ResearchVerdict {
                symbol: "SIDE".into(),
                verdict: Verdict::Buy,
                confidence: 0.7,
                entry_quality: common::EntryQuality::Good,
                reasoning: "ok".into(),
                red_flags: vec![],
                catalysts: vec![],
                timestamp: now,
            },
            now,
        );
        let scan = AlphaScanResult {
            scanned_at: now,
            universe: 0,
            edge_candidates: vec![],
            top_alpha: vec![],
            dropped: Default::default(),
        };
        let candidates = bot.equity_candidates(&scan, &[], now);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].alpha.is_none());
        assert!(bot.decide(&candidates[0], None, now).is_approved());

        let excluded = bot.equity_candidates(&scan, &["SIDE".to_string()], now);
        assert!(excluded.is_empty());
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_premarket_plan_runs_once_and_executes_at_open() {
        let plan_time = Utc.with_ymd_and_hms(2024, 1, 10, 13, 20, 0).unwrap();
        let mut h = harness(plan_time, live_config(), Verdict::Buy);
        h.broker.set_clock(Clock {
            timestamp: plan_time,
            is_open: false,
            next_open: Utc.with_ymd_and_hms(2024, 1, 10, 13, 30, 0).unwrap(),
            next_close: Utc.with_ymd_and_hms(2024, 1, 10, 20, 0, 0).unwrap(),
        });

        let report = h.bot.wake(plan_time).await;
        assert!(report.failed_steps.is_empty(), "{:?}", report.failed_steps);
        let plan = h.bot.state().premarket_plan.clone().unwrap();
        assert_eq!(plan.intents.len(), 1);
        assert_eq!(plan.intents[0].intent.symbol, "GOOD");
        assert_eq!(report.entries, 0);

        let open_time = Utc.with_ymd_and_hms(2024, 1, 10, 13, 35, 0).unwrap();
        h.broker.set_clock(Clock {
            timestamp: open_time,
            is_open: true,
            next_open: Utc.with_ymd_and_hms(2024, 1, 11, 13, 30, 0).unwrap(),
            next_close: Utc.with_ymd_and_hms(2024, 1, 10, 20, 0, 0).unwrap(),
        });
        let report = h.bot.wake(open_time).await;
        assert_eq!(report.entries, 1);
        assert!(h.bot.state().premarket_plan.is_none());
        assert!(h.bot.state().positions.is_held("GOOD"));
        let _ = std::fs::remove_dir_all(&h.dir);
    }
}
