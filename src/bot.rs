use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use candidate_engine::AlphaScanner;
use chrono::{DateTime, Duration, Utc};
use common::providers::{
    BrokerageProvider, MarketDataProvider, NotificationSink, SocialFeedProvider,
};
use common::{with_timeout, NotifyEvent, NotifyKind};
use decision_engine::ConfidenceComposer;
use execution_engine::ExecutionEngine;
use llm_client::LlmJudge;
use serde_json::json;
use signal_engine::SignalAggregator;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{AppConfig, ConfigOverrides};
use crate::journal::TradeJournal;
use crate::notify::CooldownNotifier;
use crate::phase::PhaseInfo;
use crate::risk::RiskGuard;
use crate::state::{write_json_atomic, BotState, StateStore};
use crate::status::StatusSnapshot;

/// External collaborators the scheduler drives.
pub struct Collaborators {
    pub market: Arc<dyn MarketDataProvider>,
    pub broker: Arc<dyn BrokerageProvider>,
    pub social: Arc<dyn SocialFeedProvider>,
    pub judge: Option<Arc<dyn LlmJudge>>,
    pub notifier: Arc<dyn NotificationSink>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WakeReport {
    pub failed_steps: Vec<String>,
    pub entries: usize,
    pub exits: usize,
    pub vetoes: usize,
    pub rejections: usize,
    pub judge_calls: usize,
    /// Symbols closed this wake; they are not re-entered until the next one.
    pub closed: Vec<String>,
}

pub struct Bot {
    pub(crate) base_config: AppConfig,
    pub(crate) config: AppConfig,
    pub(crate) market: Arc<dyn MarketDataProvider>,
    pub(crate) broker: Arc<dyn BrokerageProvider>,
    pub(crate) social: Arc<dyn SocialFeedProvider>,
    pub(crate) judge: Option<Arc<dyn LlmJudge>>,
    pub(crate) notifier: CooldownNotifier,
    pub(crate) aggregator: SignalAggregator,
    pub(crate) scanner: AlphaScanner,
    pub(crate) composer: ConfidenceComposer,
    pub(crate) execution: ExecutionEngine,
    pub(crate) risk_guard: RiskGuard,
    pub(crate) store: StateStore,
    pub(crate) state: BotState,
    pub(crate) journal: TradeJournal,
    status_path: PathBuf,
}

fn effective_config(base: &AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if overrides.is_empty() {
        return base.clone();
    }
    match base.merge(overrides) {
        Ok(merged) => merged,
        Err(e) => {
            warn!("persisted config overrides rejected, using file config: {}", e);
            base.clone()
        }
    }
}

impl Bot {
    pub fn new(
        base_config: AppConfig,
        collaborators: Collaborators,
        store: StateStore,
        mut journal: TradeJournal,
        now: DateTime<Utc>,
    ) -> common::Result<Self> {
        let mut state = store.load(&base_config, now)?;
        let config = effective_config(&base_config, &state.config);
        state.adopt_config(&config);

        let status_path = store.path().with_file_name("status.json");
        journal.record(
            "bot_start",
            json!({
                "mode": if config.trading.shadow_mode { "shadow" } else { "live" },
                "judge": collaborators.judge.is_some(),
                "state_path": store.path().display().to_string(),
                "enabled": state.enabled,
                "held": state.positions.len(),
            }),
        );
        info!("Trade journal path: {}", journal.dir().display());

        Ok(Self {
            aggregator: Self::build_aggregator(&config),
            scanner: AlphaScanner::new(config.alpha.clone(), config.trading.call_timeout_ms),
            composer: ConfidenceComposer::new(config.confidence.clone()),
            execution: ExecutionEngine::new(
                collaborators.broker.clone(),
                config.trading.shadow_mode,
                config.trading.live_enable,
                config.trading.call_timeout_ms,
            ),
            risk_guard: RiskGuard::new(config.risk.clone()),
            notifier: CooldownNotifier::new(
                collaborators.notifier,
                Duration::minutes(config.notify.cooldown_minutes),
            ),
            market: collaborators.market,
            broker: collaborators.broker,
            social: collaborators.social,
            judge: collaborators.judge,
            base_config,
            config,
            store,
            state,
            journal,
            status_path,
        })
    }

    fn build_aggregator(config: &AppConfig) -> SignalAggregator {
        SignalAggregator::new(
            config.signals.half_life_minutes,
            config.signals.sources.clone(),
            config.signals.default_source_weight,
        )
    }

    fn rebuild_engines(&mut self) {
        let config = &self.config;
        self.aggregator = Self::build_aggregator(config);
        self.scanner = AlphaScanner::new(config.alpha.clone(), config.trading.call_timeout_ms);
        self.composer = ConfidenceComposer::new(config.confidence.clone());
        self.execution = ExecutionEngine::new(
            self.broker.clone(),
            config.trading.shadow_mode,
            config.trading.live_enable,
            config.trading.call_timeout_ms,
        );
        self.risk_guard = RiskGuard::new(config.risk.clone());
        self.state.adopt_config(config);
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    /// Replace the persisted overrides. Nothing changes if the merged config
    /// fails validation.
    pub fn set_overrides(&mut self, overrides: ConfigOverrides) -> common::Result<()> {
        let merged = self.base_config.merge(&overrides)?;
        self.config = merged;
        self.state.config = overrides;
        self.rebuild_engines();
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        info!("trading {}", if enabled { "enabled" } else { "disabled" });
        self.state.enabled = enabled;
    }

    pub async fn run(&mut self) {
        info!("Bot running...");
        loop {
            let report = self.wake(Utc::now()).await;
            if !report.failed_steps.is_empty() {
                error!("Wake finished with failed steps: {:?}", report.failed_steps);
            }
            sleep(StdDuration::from_secs(self.config.scheduler.wake_interval_secs)).await;
        }
    }

    async fn determine_phase(&self, now: DateTime<Utc>) -> PhaseInfo {
        let crypto = self.config.trading.crypto_enabled;
        match with_timeout(
            "get_clock",
            self.config.trading.call_timeout_ms,
            self.broker.get_clock(),
        )
        .await
        {
            Ok(clock) => PhaseInfo::from_clock(&clock, &self.config.scheduler, crypto),
            Err(e) => {
                warn!("clock unavailable, treating equities as closed: {}", e);
                PhaseInfo::fallback(now, crypto)
            }
        }
    }

    fn isolate(&mut self, step: &str, result: common::Result<()>, report: &mut WakeReport) {
        if let Err(e) = result {
            warn!("step {} failed: {}", step, e);
            self.journal.record(
                "step_failed",
                json!({ "step": step, "code": e.code(), "error": e.to_string() }),
            );
            report.failed_steps.push(step.to_string());
        }
    }

    /// One scheduler wake. Every step is isolated; state is committed once at
    /// the end no matter how the steps went.
    pub async fn wake(&mut self, now: DateTime<Utc>) -> WakeReport {
        let mut report = WakeReport::default();
        let phase = self.determine_phase(now).await;
        self.journal.record(
            "cycle_start",
            json!({
                "phase": phase.equity,
                "crypto_active": phase.crypto_active,
                "enabled": self.state.enabled,
                "held": self.state.positions.len(),
            }),
        );

        if self.state.enabled {
            let purged = self.state.purge_expired(now);
            if purged > 0 {
                info!("purged {} expired cache entries", purged);
            }

            let r = self.refresh_crypto_universe(now).await;
            self.isolate("crypto_universe", r, &mut report);

            let r = self.gather_signals(&phase, now).await;
            self.isolate("gather", r, &mut report);

            let r = self.research_signals(&phase, now, &mut report).await;
            self.isolate("signal_research", r, &mut report);

            let r = self.build_premarket_plan(&phase, now, &mut report).await;
            self.isolate("premarket_plan", r, &mut report);

            let r = self.crypto_pass(&phase, now, &mut report).await;
            self.isolate("crypto", r, &mut report);

            let r = self.execute_premarket_plan(&phase, now, &mut report).await;
            self.isolate("plan_execution", r, &mut report);

            let r = self.analyst_pass(&phase, now, &mut report).await;
            self.isolate("analyst", r, &mut report);

            let r = self.refresh_position_research(now, &mut report).await;
            self.isolate("position_research", r, &mut report);

            let r = self.options_exits(&phase, now, &mut report).await;
            self.isolate("options_exits", r, &mut report);

            let r = self.check_breaking_news(now, &mut report).await;
            self.isolate("breaking_news", r, &mut report);
        } else {
            info!("trading disabled; skipping steps");
        }

        self.finish(phase, &report, now);
        report
    }

    fn finish(&mut self, phase: PhaseInfo, report: &WakeReport, now: DateTime<Utc>) {
        self.state.last_wake = Some(now);
        self.journal.record(
            "cycle_summary",
            json!({
                "entries": report.entries,
                "exits": report.exits,
                "vetoes": report.vetoes,
                "rejections": report.rejections,
                "judge_calls": report.judge_calls,
                "failed_steps": report.failed_steps,
                "held": self.state.positions.len(),
                "judge_budget_remaining": self.state.budgets.judge.remaining(),
                "cost_usd": self.state.cost.total.usd,
            }),
        );

        let status = StatusSnapshot::capture(&self.state, phase, report.failed_steps.clone(), now);
        if let Err(e) = write_json_atomic(&self.status_path, &status) {
            warn!("status write failed: {}", e);
        }
        if let Err(e) = self.store.commit(&self.state) {
            error!("state commit failed: {}", e);
        }
    }

    pub(crate) async fn notify(&self, symbol: &str, kind: NotifyKind, message: String, now: DateTime<Utc>) {
        self.notifier
            .send(
                NotifyEvent {
                    symbol: symbol.to_string(),
                    kind,
                    message,
                },
                now,
            )
            .await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::replay::ReplayFeed;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use common::{Bar, Clock, Mention, Quote, Snapshot, SourceBatch, Verdict};
    use execution_engine::PaperBroker;
    use llm_client::{JudgeOutcome, JudgePrompt, JudgeReply, TokenUsage};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::notify::LogNotifier;

    pub(crate) struct ScriptedJudge {
        pub verdict: Verdict,
        pub confidence: f64,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmJudge for ScriptedJudge {
        async fn evaluate(&self, prompt: &JudgePrompt) -> JudgeOutcome {
            self.calls.lock().unwrap().push(prompt.symbol.clone());
            JudgeOutcome::Verdict {
                reply: JudgeReply {
                    verdict: self.verdict,
                    confidence: self.confidence,
                    entry_quality: common::EntryQuality::Good,
                    reasoning: "scripted".into(),
                    red_flags: vec!["dilution".into()],
                    catalysts: vec![],
                },
                usage: TokenUsage {
                    input_tokens: 1000,
                    output_tokens: 100,
                },
            }
        }
    }

    /// Wednesday 2024-01-10, 15:00 UTC: market open.
    pub(crate) fn open_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap()
    }

    fn open_clock(now: DateTime<Utc>) -> Clock {
        Clock {
            timestamp: now,
            is_open: true,
            next_open: Utc.with_ymd_and_hms(2024, 1, 11, 13, 30, 0).unwrap(),
            next_close: Utc.with_ymd_and_hms(2024, 1, 10, 20, 0, 0).unwrap(),
        }
    }

    fn bars(symbol_seed: f64, now: DateTime<Utc>) -> Vec<Bar> {
        // Alternating closes: six returns, three up.
        [100.0, 101.0, 100.0, 101.0, 100.0, 101.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, c)| Bar {
                timestamp: now - Duration::days(7 - i as i64),
                open: c * symbol_seed,
                high: c * symbol_seed,
                low: c * symbol_seed,
                close: c * symbol_seed,
                volume: 1e6,
            })
            .collect()
    }

    fn mention(text: &str, now: DateTime<Utc>, minutes_ago: i64) -> Mention {
        Mention {
            text: text.into(),
            timestamp: now - Duration::minutes(minutes_ago),
            upvotes: Some(300),
            comments: Some(60),
            flair: Some("DD".into()),
            momentum: None,
            symbol: None,
            price: None,
            source_detail: Some("stocks".into()),
        }
    }

    pub(crate) fn feed(now: DateTime<Utc>) -> ReplayFeed {
        let day = |close: f64| Bar {
            timestamp: now,
            open: close,
            high: close,
            low: close,
            close,
            volume: 2e6,
        };
        let snapshot = |symbol: &str, price: f64, prev: f64| Snapshot {
            symbol: symbol.into(),
            last_trade: Some(price),
            quote: Some(Quote {
                bid: price * 0.9999,
                ask: price * 1.0001,
            }),
            daily_bar: Some(day(price)),
            prev_daily_bar: Some(day(prev)),
        };

        ReplayFeed {
            trending: vec![SourceBatch {
                source: "reddit".into(),
                mentions: vec![
                    mention("$GOOD bullish breakout, buying calls", now, 5),
                    mention("$GOOD strong earnings beat, bullish", now, 10),
                    mention("$GOOD moon rocket undervalued", now, 20),
                ],
            }],
            recent: HashMap::from([(
                "GOOD".to_string(),
                vec![
                    mention("GOOD looks bullish", now, 1),
                    mention("GOOD buying more, strong", now, 2),
                    mention("GOOD breakout", now, 3),
                ],
            )]),
            snapshots: HashMap::from([("GOOD".to_string(), snapshot("GOOD", 50.0, 50.0))]),
            bars: HashMap::from([("GOOD".to_string(), bars(0.5, now))]),
        }
    }

    pub(crate) struct Harness {
        pub bot: Bot,
        pub broker: Arc<PaperBroker>,
        pub judge: Arc<ScriptedJudge>,
        pub dir: PathBuf,
    }

    pub(crate) fn harness(now: DateTime<Utc>, config: AppConfig, verdict: Verdict) -> Harness {
        harness_with(now, config, verdict, feed(now))
    }

    pub(crate) fn harness_with(
        now: DateTime<Utc>,
        config: AppConfig,
        verdict: Verdict,
        replay: ReplayFeed,
    ) -> Harness {
        let feed = Arc::new(replay);
        let broker = Arc::new(PaperBroker::new(config.trading.paper_cash));
        broker.set_price("GOOD", 50.0);
        broker.set_clock(open_clock(now));
        broker.add_asset(common::Asset {
            symbol: "GOOD".into(),
            exchange: "NASDAQ".into(),
            tradable: true,
            class: common::AssetClass::Equity,
        });
        let judge = Arc::new(ScriptedJudge {
            verdict,
            confidence: 0.9,
            calls: Mutex::new(Vec::new()),
        });

        let dir = std::env::temp_dir().join(format!("bot-{}", Uuid::new_v4()));
        let store = StateStore::new(dir.join("state.json"));
        let journal = TradeJournal::open(dir.join("journal")).unwrap();
        let bot = Bot::new(
            config,
            Collaborators {
                market: feed.clone(),
                broker: broker.clone(),
                social: feed,
                judge: Some(judge.clone() as Arc<dyn LlmJudge>),
                notifier: Arc::new(LogNotifier),
            },
            store,
            journal,
            now,
        )
        .unwrap();
        Harness {
            bot,
            broker,
            judge,
            dir,
        }
    }

    pub(crate) fn live_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.trading.shadow_mode = false;
        config.trading.live_enable = true;
        config.trading.crypto_enabled = false;
        config.alpha.min_notional_volume = 1_000.0;
        config
    }

    #[tokio::test]
    async fn test_wake_enters_on_alpha_and_judge_then_commits() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);

        let report = h.bot.wake(now).await;
        assert!(report.failed_steps.is_empty(), "{:?}", report.failed_steps);
        assert_eq!(report.entries, 1);
        assert!(h.bot.state().positions.is_held("GOOD"));
        let entry = h.bot.state().positions.get("GOOD").unwrap();
        assert_eq!(entry.entry_price, Some(50.0));
        assert!(entry.entry_social_volume >= 3);

        assert_eq!(h.broker.get_positions().await.unwrap().len(), 1);
        assert!(h.dir.join("state.json").exists());
        assert!(h.dir.join("status.json").exists());
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_judge_veto_blocks_entry() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Skip);
        let report = h.bot.wake(now).await;
        assert_eq!(report.entries, 0);
        assert!(report.vetoes >= 1);
        assert!(!h.bot.state().positions.is_held("GOOD"));
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_disabled_wake_only_commits() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);
        h.bot.set_enabled(false);
        let report = h.bot.wake(now).await;
        assert_eq!(report, WakeReport::default());
        assert!(h.judge.calls.lock().unwrap().is_empty());
        assert!(h.dir.join("state.json").exists());
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_shadow_mode_places_nothing() {
        let now = open_now();
        let mut config = live_config();
        config.trading.shadow_mode = true;
        let mut h = harness(now, config, Verdict::Buy);
        let report = h.bot.wake(now).await;
        assert_eq!(report.entries, 0);
        assert!(h.broker.get_positions().await.unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_stop_loss_close_and_failed_close_keeps_state() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);
        h.bot.wake(now).await;
        assert!(h.bot.state().positions.is_held("GOOD"));

        // Price collapses; the broker refuses the close.
        h.broker.set_price("GOOD", 40.0);
        h.broker.reject_symbol("GOOD");
        let later = now + Duration::minutes(10);
        let report = h.bot.wake(later).await;
        assert_eq!(report.exits, 0);
        assert!(h.bot.state().positions.is_held("GOOD"));
        let _ = std::fs::remove_dir_all(&h.dir);
    }

    #[tokio::test]
    async fn test_overrides_validate_before_applying() {
        let now = open_now();
        let mut h = harness(now, live_config(), Verdict::Buy);
        let bad = ConfigOverrides {
            min_sentiment: Some(2.0),
            ..ConfigOverrides::default()
        };
        assert!(h.bot.set_overrides(bad).is_err());
        assert!(h.bot.state().config.is_empty());

        let good = ConfigOverrides {
            max_positions: Some(1),
            ..ConfigOverrides::default()
        };
        h.bot.set_overrides(good.clone()).unwrap();
        assert_eq!(h.bot.config().risk.max_positions, 1);
        assert_eq!(h.bot.state().config, good);
        let _ = std::fs::remove_dir_all(&h.dir);
    }
}
