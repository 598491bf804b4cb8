//! Judge research, social confirmation and the breaking-news watch. Every
//! outbound call here spends from a daily budget first.

use chrono::{DateTime, Utc};
use common::{
    with_timeout, AssetClass, ConfirmationResult, Mention, NotifyKind, Result, Verdict,
};
use futures::future::join_all;
use llm_client::{JudgeOutcome, JudgePrompt, JudgePurpose};
use serde_json::{json, Value};
use signal_engine::heuristic_sentiment;
use tracing::{debug, info, warn};

use candidate_engine::aggregate_markets;

use crate::bot::{Bot, WakeReport};
use crate::budget::BudgetKind;
use crate::phase::PhaseInfo;
use crate::trading::EntryCandidate;

/// Query string for a symbol on a social search: the base for crypto pairs.
pub fn social_query(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}

/// Mean keyword sentiment over mentions, with the sample count.
pub fn mention_mood(mentions: &[Mention]) -> (f64, u32) {
    if mentions.is_empty() {
        return (0.0, 0);
    }
    let total: f64 = mentions.iter().map(|m| heuristic_sentiment(&m.text)).sum();
    (total / mentions.len() as f64, mentions.len() as u32)
}

/// Too few samples yields a neutral result that neither boosts nor penalizes.
pub fn summarize_confirmation(
    symbol: &str,
    existing_sentiment: f64,
    mentions: &[Mention],
    min_samples: u32,
    now: DateTime<Utc>,
) -> ConfirmationResult {
    let (mood, count) = mention_mood(mentions);
    let (sentiment, confirms_existing) = if count < min_samples {
        (0.0, false)
    } else {
        let agrees = mood != 0.0 && existing_sentiment != 0.0 && mood.signum() == existing_sentiment.signum();
        (mood, agrees)
    };
    ConfirmationResult {
        symbol: symbol.to_string(),
        sentiment,
        confirms_existing,
        sample_count: count,
        timestamp: now,
    }
}

impl Bot {
    fn judge_deadline_ms(&self) -> u64 {
        let llm = &self.config.llm;
        llm.timeout_ms * (u64::from(llm.max_retries) + 1) + 1_000
    }

    /// Spend budget, then fan the prompts out concurrently. Symbols the
    /// budget refuses are skipped for this step.
    async fn ask_judge(
        &mut self,
        requests: Vec<(String, AssetClass, Value)>,
        purpose: JudgePurpose,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Vec<(String, JudgeOutcome)> {
        let Some(judge) = self.judge.clone() else {
            return Vec::new();
        };

        let mut prompts = Vec::new();
        let mut refused = Vec::new();
        for (symbol, class, context) in requests {
            if prompts.len() >= self.config.llm.max_research_per_step {
                break;
            }
            match self.state.budgets.try_consume_judge(&symbol, now) {
                Ok(()) => prompts.push(JudgePrompt::new(&symbol, class, purpose, context, now)),
                Err(e) => refused.push(e.to_string()),
            }
        }
        if !refused.is_empty() {
            info!("judge budget refused {} requests", refused.len());
            self.journal.record(
                "research_budget_exhausted",
                json!({ "kind": "judge", "purpose": purpose, "refused": refused }),
            );
        }
        if prompts.is_empty() {
            return Vec::new();
        }

        let deadline = self.judge_deadline_ms();
        let calls = prompts.iter().map(|prompt| {
            let judge = judge.clone();
            async move {
                with_timeout("judge", deadline, async { Ok(judge.evaluate(prompt).await) })
                    .await
                    .unwrap_or_else(|e| JudgeOutcome::Failed(e.to_string()))
            }
        });
        let outcomes = join_all(calls).await;
        report.judge_calls += outcomes.len();

        let mut results = Vec::with_capacity(outcomes.len());
        for (prompt, outcome) in prompts.iter().zip(outcomes) {
            self.state.cost.record(purpose, &outcome, &self.config.llm);
            match &outcome {
                JudgeOutcome::Unparseable { error, .. } => {
                    self.journal.record(
                        "judge_unparseable",
                        json!({ "symbol": prompt.symbol, "purpose": purpose, "error": error }),
                    );
                }
                JudgeOutcome::Failed(error) => {
                    warn!("judge call for {} failed: {}", prompt.symbol, error);
                }
                JudgeOutcome::Verdict { .. } => {}
            }
            results.push((prompt.symbol.clone(), outcome));
        }
        results
    }

    pub(crate) async fn research_signals(
        &mut self,
        phase: &PhaseInfo,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if self.judge.is_none() || !phase.equities_active() {
            return Ok(());
        }
        if !self
            .state
            .is_due("signal_research", self.config.scheduler.research_interval_secs, now)
        {
            return Ok(());
        }

        let markets = aggregate_markets(&self.state.live_signals(now), self.config.alpha.max_candidates);
        let min_sentiment = self.config.signals.min_sentiment;
        let requests: Vec<(String, AssetClass, Value)> = markets
            .into_iter()
            .filter(|m| {
                !m.is_crypto
                    && m.sentiment_avg >= min_sentiment
                    && !self.state.positions.is_held(&m.symbol)
                    && !self.state.signal_research_cache.contains(&m.symbol, now)
            })
            .map(|m| {
                let context = json!({
                    "sentiment_avg": m.sentiment_avg,
                    "momentum_avg": m.momentum_avg,
                    "total_volume": m.total_volume,
                    "sources": m.sources,
                });
                (m.symbol.clone(), AssetClass::of_symbol(&m.symbol), context)
            })
            .collect();

        let outcomes = self
            .ask_judge(requests, JudgePurpose::SignalResearch, now, report)
            .await;
        for (symbol, outcome) in outcomes {
            if let Some(verdict) = outcome.to_verdict(&symbol, now) {
                self.journal.record(
                    "signal_research",
                    json!({
                        "symbol": symbol,
                        "verdict": verdict.verdict,
                        "confidence": verdict.confidence,
                    }),
                );
                self.state.signal_research_cache.insert(symbol, verdict, now);
            }
        }

        self.state.mark_run("signal_research", now);
        Ok(())
    }

    /// Full research for alpha candidates not already covered by the cache.
    pub(crate) async fn research_candidates(
        &mut self,
        candidates: &[EntryCandidate],
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) {
        let requests: Vec<(String, AssetClass, Value)> = candidates
            .iter()
            .filter(|c| c.alpha.is_some() && !self.state.research_cache.contains(&c.symbol, now))
            .map(|c| {
                let context = json!({
                    "sentiment": c.sentiment,
                    "social_volume": c.social_volume,
                    "sources": c.sources,
                    "alpha": c.alpha,
                });
                (c.symbol.clone(), c.asset_class, context)
            })
            .collect();

        let outcomes = self
            .ask_judge(requests, JudgePurpose::CandidateResearch, now, report)
            .await;
        for (symbol, outcome) in outcomes {
            if let Some(verdict) = outcome.to_verdict(&symbol, now) {
                self.journal.record(
                    "candidate_research",
                    json!({
                        "symbol": symbol,
                        "verdict": verdict.verdict,
                        "confidence": verdict.confidence,
                        "entry_quality": verdict.entry_quality,
                        "red_flags": verdict.red_flags,
                    }),
                );
                self.state.research_cache.insert(symbol, verdict, now);
            }
        }
    }

    pub(crate) async fn refresh_position_research(
        &mut self,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if self.judge.is_none() || self.state.positions.is_empty() {
            return Ok(());
        }
        let interval = self.config.scheduler.position_research_interval_secs;
        if !self.state.is_due("position_research", interval, now) {
            return Ok(());
        }

        let staleness = self.state.positions.staleness();
        let requests: Vec<(String, AssetClass, Value)> = self
            .state
            .positions
            .entries()
            .filter(|e| {
                e.asset_class != AssetClass::Option
                    && !self.state.research_cache.contains(&e.symbol, now)
            })
            .map(|e| {
                let context = json!({
                    "entry_price": e.entry_price,
                    "entry_time": e.entry_time,
                    "entry_sentiment": e.entry_sentiment,
                    "peak_price": e.peak_price,
                    "peak_sentiment": e.peak_sentiment,
                    "hours_held": (now - e.entry_time).num_minutes() as f64 / 60.0,
                    "staleness": staleness.get(&e.symbol),
                });
                (e.symbol.clone(), e.asset_class, context)
            })
            .collect();

        let outcomes = self
            .ask_judge(requests, JudgePurpose::PositionReview, now, report)
            .await;
        for (symbol, outcome) in outcomes {
            let Some(verdict) = outcome.to_verdict(&symbol, now) else {
                continue;
            };
            self.journal.record(
                "position_research",
                json!({
                    "symbol": symbol,
                    "verdict": verdict.verdict,
                    "confidence": verdict.confidence,
                    "red_flags": verdict.red_flags,
                }),
            );
            if verdict.verdict != Verdict::Buy && !verdict.red_flags.is_empty() {
                let message = format!("{:?}: {}", verdict.verdict, verdict.red_flags.join(", "));
                self.notify(&symbol, NotifyKind::ResearchRedFlag, message, now).await;
            }
            self.state.research_cache.insert(symbol, verdict, now);
        }

        self.state.mark_run("position_research", now);
        Ok(())
    }

    /// Cached or freshly fetched confirmation. `None` when the budget is
    /// spent or the feed fails; the decision then proceeds without it.
    pub(crate) async fn confirm(
        &mut self,
        symbol: &str,
        existing_sentiment: f64,
        now: DateTime<Utc>,
    ) -> Option<ConfirmationResult> {
        if let Some(cached) = self.state.confirmation_cache.get(symbol, now) {
            return Some(cached.clone());
        }
        if let Err(e) = self.state.budgets.try_consume(BudgetKind::Confirmation, now) {
            debug!("{}: no confirmation ({})", symbol, e);
            return None;
        }

        let mentions = match with_timeout(
            "fetch_recent",
            self.config.trading.call_timeout_ms,
            self.social
                .fetch_recent(social_query(symbol), &self.config.signals.confirmation_source),
        )
        .await
        {
            Ok(mentions) => mentions,
            Err(e) => {
                warn!("{}: confirmation fetch failed: {}", symbol, e);
                return None;
            }
        };

        let result = summarize_confirmation(
            symbol,
            existing_sentiment,
            &mentions,
            self.config.signals.confirmation_min_samples,
            now,
        );
        debug!(
            "{}: confirmation {:.2} over {} samples (agrees={})",
            symbol, result.sentiment, result.sample_count, result.confirms_existing
        );
        self.state
            .confirmation_cache
            .insert(symbol, result.clone(), now);
        Some(result)
    }

    pub(crate) async fn check_breaking_news(
        &mut self,
        now: DateTime<Utc>,
        report: &mut WakeReport,
    ) -> Result<()> {
        if self.state.positions.is_empty() {
            return Ok(());
        }
        let interval = self.config.scheduler.breaking_news_interval_secs;
        if !self.state.is_due("breaking_news", interval, now) {
            return Ok(());
        }

        let held: Vec<String> = self
            .state
            .positions
            .entries()
            .filter(|e| e.asset_class != AssetClass::Option)
            .map(|e| e.symbol.clone())
            .collect();
        let mut allowed = Vec::new();
        for symbol in held {
            match self.state.budgets.try_consume(BudgetKind::BreakingNews, now) {
                Ok(()) => allowed.push(symbol),
                Err(e) => {
                    self.journal.record(
                        "research_budget_exhausted",
                        json!({ "kind": "breaking_news", "error": e.to_string() }),
                    );
                    break;
                }
            }
        }

        let ms = self.config.trading.call_timeout_ms;
        let social = &self.social;
        let source = self.config.signals.confirmation_source.as_str();
        let fetches = allowed.iter().map(|symbol| {
            with_timeout("fetch_recent", ms, social.fetch_recent(social_query(symbol), source))
        });
        let results = join_all(fetches).await;

        let threshold = self.config.signals.breaking_news_threshold;
        let min_samples = self.config.signals.breaking_news_min_samples;
        for (symbol, result) in allowed.into_iter().zip(results) {
            let mentions = match result {
                Ok(mentions) => mentions,
                Err(e) => {
                    warn!("{}: breaking-news fetch failed: {}", symbol, e);
                    continue;
                }
            };
            let (mood, count) = mention_mood(&mentions);
            if count < min_samples || mood > -threshold {
                continue;
            }

            warn!("{}: breaking negative chatter {:.2} over {} mentions", symbol, mood, count);
            self.journal.record(
                "breaking_news",
                json!({ "symbol": symbol, "sentiment": mood, "samples": count }),
            );
            let detail = format!("social sentiment {:.2} over {} recent mentions", mood, count);
            self.notify(&symbol, NotifyKind::BreakingNews, detail.clone(), now).await;
            if self.config.signals.exit_on_breaking_news {
                self.exit_on_news(&symbol, detail, now, report).await;
            }
        }

        self.state.mark_run("breaking_news", now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{feed, harness_with, live_config, open_now};
    use chrono::Duration;
    use common::providers::BrokerageProvider;

    fn said(text: &str) -> Mention {
        Mention {
            text: text.into(),
            timestamp: Utc::now(),
            upvotes: None,
            comments: None,
            flair: None,
            momentum: None,
            symbol: None,
            price: None,
            source_detail: None,
        }
    }

    #[test]
    fn test_social_query_uses_crypto_base() {
        assert_eq!(social_query("BTC/USD"), "BTC");
        assert_eq!(social_query("AAPL"), "AAPL");
    }

    #[test]
    fn test_confirmation_needs_enough_samples() {
        let now = Utc::now();
        let few = vec![said("bullish breakout"), said("moon")];
        let thin = summarize_confirmation("AAPL", 0.6, &few, 3, now);
        assert_eq!(thin.sentiment, 0.0);
        assert!(!thin.confirms_existing);
        assert_eq!(thin.sample_count, 2);

        let many = vec![said("bullish"), said("crash and dump"), said("buying calls"), said("rally")];
        let agree = summarize_confirmation("AAPL", 0.6, &many, 3, now);
        assert!((agree.sentiment - 0.5).abs() < 1e-9);
        assert!(agree.confirms_existing);

        let disagree = summarize_confirmation("AAPL", -0.4, &many, 3, now);
        assert!(!disagree.confirms_existing);
        assert_eq!(disagree.sentiment, agree.sentiment);
    }

    #[tokio::test]
    async fn test_breaking_news_closes_when_configured() {
        let now = open_now();
        let mut config = live_config();
        config.signals.exit_on_breaking_news = true;

        let mut replay = feed(now);
        replay.recent.insert(
            "GOOD".into(),
            vec![said("GOOD crash incoming, selling"), said("dump it"), said("bearish")],
        );
        let mut h = harness_with(now, config, Verdict::Skip, replay);

        // Held from an earlier session.
        h.broker
            .create_order(&common::OrderRequest {
                client_order_id: "seed".into(),
                symbol: "GOOD".into(),
                side: common::OrderSide::Buy,
                notional: Some(1_000.0),
                qty: None,
                time_in_force: common::TimeInForce::Day,
                reason: "seed".into(),
            })
            .await
            .unwrap();
        h.bot.state.positions.open(common::PositionEntry {
            symbol: "GOOD".into(),
            asset_class: AssetClass::Equity,
            entry_time: now - Duration::hours(2),
            entry_price: Some(50.0),
            entry_sentiment: 0.8,
            entry_social_volume: 3,
            entry_sources: vec!["reddit".into()],
            entry_reason: "seed".into(),
            peak_price: 50.0,
            peak_sentiment: 0.8,
        });

        let report = h.bot.wake(now).await;
        assert_eq!(report.closed, vec!["GOOD".to_string()]);
        assert!(!h.bot.state().positions.is_held("GOOD"));
        assert_eq!(h.bot.state().budgets.breaking_news.used_count, 1);
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_exhausted_judge_budget_skips_calls() {
        let now = open_now();
        let mut config = live_config();
        config.budgets.judge_daily_max_calls = 0;
        let mut h = harness_with(now, config, Verdict::Buy, feed(now));

        let report = h.bot.wake(now).await;
        assert_eq!(report.judge_calls, 0);
        assert!(h.judge.calls.lock().unwrap().is_empty());
        assert!(h.bot.state().research_cache.is_empty());
        let _ = std::fs::remove_dir_all(&h.dir);
    }
}
