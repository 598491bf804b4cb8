use std::path::Path;

use candidate_engine::ScanParams;
use decision_engine::ComposerParams;
use position_engine::{ExitParams, SizingParams, StalenessParams};
use serde::{Deserialize, Serialize};
use signal_engine::{SourceKind, SourceProfile};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub alpha: ScanParams,
    #[serde(default)]
    pub confidence: ComposerParams,
    #[serde(default)]
    pub positions: ExitParams,
    #[serde(default)]
    pub staleness: StalenessParams,
    #[serde(default)]
    pub sizing: SizingParams,
    #[serde(default)]
    pub budgets: BudgetConfig,
    #[serde(default)]
    pub caches: CacheConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            scheduler: SchedulerConfig::default(),
            signals: SignalsConfig::default(),
            alpha: ScanParams::default(),
            confidence: ComposerParams::default(),
            positions: ExitParams::default(),
            staleness: StalenessParams::default(),
            sizing: SizingParams::default(),
            budgets: BudgetConfig::default(),
            caches: CacheConfig::default(),
            risk: RiskConfig::default(),
            llm: LlmConfig::default(),
            trading: TradingConfig::default(),
            notify: NotifyConfig::default(),
            replay: ReplayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed delay between wakes, regardless of how the last one went.
    #[serde(default = "default_wake_interval")]
    pub wake_interval_secs: u64,
    #[serde(default = "default_gather_interval")]
    pub gather_interval_secs: i64,
    #[serde(default = "default_research_interval")]
    pub research_interval_secs: i64,
    #[serde(default = "default_analyst_interval")]
    pub analyst_interval_secs: i64,
    #[serde(default = "default_crypto_interval")]
    pub crypto_interval_secs: i64,
    #[serde(default = "default_position_research_interval")]
    pub position_research_interval_secs: i64,
    #[serde(default = "default_crypto_universe_refresh")]
    pub crypto_universe_refresh_secs: i64,
    #[serde(default = "default_breaking_news_interval")]
    pub breaking_news_interval_secs: i64,
    /// Pre-open phase starts this many minutes before the bell.
    #[serde(default = "default_preopen_minutes")]
    pub preopen_minutes: i64,
    /// Plan generation window, minutes before the bell.
    #[serde(default = "default_plan_window")]
    pub plan_window_minutes: i64,
    /// Plan execution window, minutes after the bell.
    #[serde(default = "default_open_window")]
    pub open_window_minutes: i64,
}

fn default_wake_interval() -> u64 {
    60
}
fn default_gather_interval() -> i64 {
    300
}
fn default_research_interval() -> i64 {
    600
}
fn default_analyst_interval() -> i64 {
    300
}
fn default_crypto_interval() -> i64 {
    300
}
fn default_position_research_interval() -> i64 {
    3600
}
fn default_crypto_universe_refresh() -> i64 {
    86_400
}
fn default_breaking_news_interval() -> i64 {
    900
}
fn default_preopen_minutes() -> i64 {
    60
}
fn default_plan_window() -> i64 {
    15
}
fn default_open_window() -> i64 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wake_interval_secs: default_wake_interval(),
            gather_interval_secs: default_gather_interval(),
            research_interval_secs: default_research_interval(),
            analyst_interval_secs: default_analyst_interval(),
            crypto_interval_secs: default_crypto_interval(),
            position_research_interval_secs: default_position_research_interval(),
            crypto_universe_refresh_secs: default_crypto_universe_refresh(),
            breaking_news_interval_secs: default_breaking_news_interval(),
            preopen_minutes: default_preopen_minutes(),
            plan_window_minutes: default_plan_window(),
            open_window_minutes: default_open_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_half_life")]
    pub half_life_minutes: f64,
    #[serde(default = "default_source_weight")]
    pub default_source_weight: f64,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceProfile>,
    /// Mean sentiment a symbol needs before it is researched or planned.
    #[serde(default = "default_min_sentiment")]
    pub min_sentiment: f64,
    #[serde(default = "default_allowed_exchanges")]
    pub allowed_exchanges: Vec<String>,
    #[serde(default = "default_social_history_len")]
    pub social_history_len: usize,
    /// Source queried for confirmation and breaking-news mentions.
    #[serde(default = "default_confirmation_source")]
    pub confirmation_source: String,
    #[serde(default = "default_confirmation_min_samples")]
    pub confirmation_min_samples: u32,
    #[serde(default = "default_breaking_news_threshold")]
    pub breaking_news_threshold: f64,
    #[serde(default = "default_breaking_news_min_samples")]
    pub breaking_news_min_samples: u32,
    #[serde(default)]
    pub exit_on_breaking_news: bool,
}

fn default_half_life() -> f64 {
    120.0
}
fn default_source_weight() -> f64 {
    0.5
}
fn default_sources() -> Vec<SourceProfile> {
    let profile = |name: &str, weight: f64, kind: SourceKind, crypto: bool| SourceProfile {
        name: name.to_string(),
        weight,
        kind,
        crypto,
    };
    vec![
        profile("reddit", 0.8, SourceKind::Crowd, false),
        profile("stocktwits", 0.6, SourceKind::HighVolume, false),
        profile("momentum", 0.9, SourceKind::Special, false),
        profile("crypto", 0.7, SourceKind::Crowd, true),
    ]
}
fn default_min_sentiment() -> f64 {
    0.3
}
fn default_allowed_exchanges() -> Vec<String> {
    vec!["NASDAQ".into(), "NYSE".into(), "ARCA".into(), "AMEX".into()]
}
fn default_social_history_len() -> usize {
    48
}
fn default_confirmation_source() -> String {
    "twitter".into()
}
fn default_confirmation_min_samples() -> u32 {
    3
}
fn default_breaking_news_threshold() -> f64 {
    0.5
}
fn default_breaking_news_min_samples() -> u32 {
    3
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            half_life_minutes: default_half_life(),
            default_source_weight: default_source_weight(),
            sources: default_sources(),
            min_sentiment: default_min_sentiment(),
            allowed_exchanges: default_allowed_exchanges(),
            social_history_len: default_social_history_len(),
            confirmation_source: default_confirmation_source(),
            confirmation_min_samples: default_confirmation_min_samples(),
            breaking_news_threshold: default_breaking_news_threshold(),
            breaking_news_min_samples: default_breaking_news_min_samples(),
            exit_on_breaking_news: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_judge_daily")]
    pub judge_daily_max_calls: u32,
    #[serde(default = "default_per_symbol")]
    pub judge_per_symbol_max_calls: u32,
    #[serde(default = "default_confirmation_daily")]
    pub confirmation_daily_max_calls: u32,
    #[serde(default = "default_breaking_news_daily")]
    pub breaking_news_daily_max_calls: u32,
}

fn default_judge_daily() -> u32 {
    200
}
fn default_per_symbol() -> u32 {
    6
}
fn default_confirmation_daily() -> u32 {
    100
}
fn default_breaking_news_daily() -> u32 {
    150
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            judge_daily_max_calls: default_judge_daily(),
            judge_per_symbol_max_calls: default_per_symbol(),
            confirmation_daily_max_calls: default_confirmation_daily(),
            breaking_news_daily_max_calls: default_breaking_news_daily(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_signal_ttl")]
    pub signal_ttl_minutes: i64,
    #[serde(default = "default_research_ttl")]
    pub research_ttl_minutes: i64,
    #[serde(default = "default_signal_research_ttl")]
    pub signal_research_ttl_minutes: i64,
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_minutes: i64,
}

fn default_signal_ttl() -> i64 {
    240
}
fn default_research_ttl() -> i64 {
    180
}
fn default_signal_research_ttl() -> i64 {
    120
}
fn default_confirmation_ttl() -> i64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            signal_ttl_minutes: default_signal_ttl(),
            research_ttl_minutes: default_research_ttl(),
            signal_research_ttl_minutes: default_signal_research_ttl(),
            confirmation_ttl_minutes: default_confirmation_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_orders_per_minute")]
    pub max_orders_per_minute: u32,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: f64,
    #[serde(default = "default_min_cash_reserve")]
    pub min_cash_reserve: f64,
}

fn default_max_orders_per_minute() -> u32 {
    5
}
fn default_max_positions() -> usize {
    10
}
fn default_max_total_exposure() -> f64 {
    25_000.0
}
fn default_min_cash_reserve() -> f64 {
    500.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_orders_per_minute: default_max_orders_per_minute(),
            max_positions: default_max_positions(),
            max_total_exposure: default_max_total_exposure(),
            min_cash_reserve: default_min_cash_reserve(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Judge calls per step, so one step can't drain the daily budget.
    #[serde(default = "default_max_research_per_step")]
    pub max_research_per_step: usize,
    #[serde(default = "default_input_price")]
    pub input_usd_per_mtok: f64,
    #[serde(default = "default_output_price")]
    pub output_usd_per_mtok: f64,
}

fn default_true() -> bool {
    true
}
fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-5".into()
}
fn default_llm_timeout() -> u64 {
    20_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_requests_per_minute() -> u32 {
    20
}
fn default_max_research_per_step() -> usize {
    5
}
fn default_input_price() -> f64 {
    3.0
}
fn default_output_price() -> f64 {
    15.0
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: default_model(),
            timeout_ms: default_llm_timeout(),
            max_retries: default_max_retries(),
            requests_per_minute: default_requests_per_minute(),
            max_research_per_step: default_max_research_per_step(),
            input_usd_per_mtok: default_input_price(),
            output_usd_per_mtok: default_output_price(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_true")]
    pub shadow_mode: bool,
    #[serde(default)]
    pub live_enable: bool,
    #[serde(default = "default_true")]
    pub crypto_enabled: bool,
    #[serde(default)]
    pub options_enabled: bool,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,
    /// Starting cash for the in-memory paper broker.
    #[serde(default = "default_paper_cash")]
    pub paper_cash: f64,
}

fn default_call_timeout() -> u64 {
    10_000
}
fn default_paper_cash() -> f64 {
    100_000.0
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            shadow_mode: true,
            live_enable: false,
            crypto_enabled: true,
            options_enabled: false,
            call_timeout_ms: default_call_timeout(),
            paper_cash: default_paper_cash(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_cooldown")]
    pub cooldown_minutes: i64,
    #[serde(default = "default_true")]
    pub notify_top_alpha: bool,
}

fn default_cooldown() -> i64 {
    60
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown(),
            notify_top_alpha: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub path: Option<String>,
}

/// Sparse, persisted tunable overrides layered over the file config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sentiment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_equity_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_crypto_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_options_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_alpha_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_edge: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_take_profit_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_stop_loss_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_take_profit_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_stop_loss_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_stop_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_positions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_mode: Option<bool>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == ConfigOverrides::default()
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer overrides on top of this config and validate the result.
    pub fn merge(&self, overrides: &ConfigOverrides) -> common::Result<AppConfig> {
        let mut merged = self.clone();
        if let Some(v) = overrides.min_sentiment {
            merged.signals.min_sentiment = v;
        }
        if let Some(v) = overrides.min_equity_confidence {
            merged.confidence.min_equity_confidence = v;
        }
        if let Some(v) = overrides.min_crypto_confidence {
            merged.confidence.min_crypto_confidence = v;
        }
        if let Some(v) = overrides.min_options_confidence {
            merged.confidence.min_options_confidence = v;
        }
        if let Some(v) = overrides.top_alpha_threshold {
            merged.alpha.top_alpha_threshold = v;
            merged.confidence.alpha_threshold = v;
        }
        if let Some(v) = overrides.min_edge {
            merged.alpha.min_edge = v;
        }
        if let Some(v) = overrides.size_pct {
            merged.sizing.size_pct = v;
        }
        if let Some(v) = overrides.equity_take_profit_pct {
            merged.positions.equity_take_profit_pct = v;
        }
        if let Some(v) = overrides.equity_stop_loss_pct {
            merged.positions.equity_stop_loss_pct = v;
        }
        if let Some(v) = overrides.crypto_take_profit_pct {
            merged.positions.crypto_take_profit_pct = v;
        }
        if let Some(v) = overrides.crypto_stop_loss_pct {
            merged.positions.crypto_stop_loss_pct = v;
        }
        if let Some(v) = overrides.trailing_stop_pct {
            merged.positions.trailing_stop_pct = v;
        }
        if let Some(v) = overrides.max_positions {
            merged.risk.max_positions = v;
        }
        if let Some(v) = overrides.crypto_enabled {
            merged.trading.crypto_enabled = v;
        }
        if let Some(v) = overrides.shadow_mode {
            merged.trading.shadow_mode = v;
        }
        merged.validate()?;
        Ok(merged)
    }

    /// Collect every out-of-range value into one error.
    pub fn validate(&self) -> common::Result<()> {
        let mut issues: Vec<String> = Vec::new();
        let mut unit = |name: &str, v: f64| {
            if !(0.0..=1.0).contains(&v) {
                issues.push(format!("{} must be in [0,1], got {}", name, v));
            }
        };

        unit("signals.min_sentiment", self.signals.min_sentiment);
        unit("signals.default_source_weight", self.signals.default_source_weight);
        unit("signals.breaking_news_threshold", self.signals.breaking_news_threshold);
        unit("alpha.min_edge", self.alpha.min_edge);
        unit("alpha.crypto_min_edge", self.alpha.crypto_min_edge);
        unit("alpha.top_alpha_threshold", self.alpha.top_alpha_threshold);
        unit("confidence.alpha_threshold", self.confidence.alpha_threshold);
        unit("confidence.alpha_weight", self.confidence.alpha_weight);
        unit("confidence.disagree_penalty", self.confidence.disagree_penalty);
        unit("confidence.min_confirmation_sentiment", self.confidence.min_confirmation_sentiment);
        unit("confidence.min_equity_confidence", self.confidence.min_equity_confidence);
        unit("confidence.min_crypto_confidence", self.confidence.min_crypto_confidence);
        unit("confidence.min_options_confidence", self.confidence.min_options_confidence);
        unit("sizing.size_pct", self.sizing.size_pct);
        for source in &self.signals.sources {
            unit(&format!("signals.sources.{}.weight", source.name), source.weight);
        }

        if self.version != CONFIG_VERSION {
            issues.push(format!(
                "unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            ));
        }
        if self.alpha.top_alpha_threshold < self.alpha.min_edge {
            issues.push(format!(
                "alpha.top_alpha_threshold ({}) must be >= alpha.min_edge ({})",
                self.alpha.top_alpha_threshold, self.alpha.min_edge
            ));
        }
        if self.confidence.confirm_boost < 1.0 {
            issues.push("confidence.confirm_boost must be >= 1".into());
        }
        if self.signals.half_life_minutes <= 0.0 {
            issues.push("signals.half_life_minutes must be positive".into());
        }
        let s = &self.staleness;
        if !(s.min_hold_hours <= s.mid_hold_hours && s.mid_hold_hours < s.max_hold_hours) {
            issues.push(format!(
                "staleness hold hours must satisfy min <= mid < max, got {}/{}/{}",
                s.min_hold_hours, s.mid_hold_hours, s.max_hold_hours
            ));
        }
        if s.volume_decay_strict > s.volume_decay_loose {
            issues.push("staleness.volume_decay_strict must be <= volume_decay_loose".into());
        }
        if !(0.0..=100.0).contains(&s.stale_score) {
            issues.push("staleness.stale_score must be in [0,100]".into());
        }
        let p = &self.positions;
        for (name, v) in [
            ("equity_take_profit_pct", p.equity_take_profit_pct),
            ("equity_stop_loss_pct", p.equity_stop_loss_pct),
            ("crypto_take_profit_pct", p.crypto_take_profit_pct),
            ("crypto_stop_loss_pct", p.crypto_stop_loss_pct),
            ("options_take_profit_pct", p.options_take_profit_pct),
            ("options_stop_loss_pct", p.options_stop_loss_pct),
        ] {
            if v <= 0.0 {
                issues.push(format!("positions.{} must be positive, got {}", name, v));
            }
        }
        if p.trailing_stop_pct < 0.0 {
            issues.push("positions.trailing_stop_pct must be >= 0".into());
        }
        if self.sizing.min_notional < 0.0 {
            issues.push("sizing.min_notional must be >= 0".into());
        }
        if self.scheduler.wake_interval_secs == 0 {
            issues.push("scheduler.wake_interval_secs must be > 0".into());
        }
        if self.trading.call_timeout_ms == 0 {
            issues.push("trading.call_timeout_ms must be > 0".into());
        }
        if !self.trading.shadow_mode && !self.trading.live_enable {
            issues.push("shadow_mode=false requires trading.live_enable=true".into());
        }
        if self.risk.max_orders_per_minute == 0 {
            issues.push("risk.max_orders_per_minute must be > 0".into());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(common::Error::Config(issues.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            version = 1
            [trading]
            crypto_enabled = false
            [confidence]
            min_equity_confidence = 0.7
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert!(!config.trading.crypto_enabled);
        assert!(config.trading.shadow_mode);
        assert_eq!(config.confidence.min_equity_confidence, 0.7);
        assert_eq!(config.confidence.min_crypto_confidence, 0.55);
        assert_eq!(config.signals.sources.len(), 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_merge_applies_and_validates() {
        let base = AppConfig::default();
        let merged = base
            .merge(&ConfigOverrides {
                min_equity_confidence: Some(0.75),
                trailing_stop_pct: Some(4.0),
                ..ConfigOverrides::default()
            })
            .unwrap();
        assert_eq!(merged.confidence.min_equity_confidence, 0.75);
        assert_eq!(merged.positions.trailing_stop_pct, 4.0);
        assert_eq!(base.positions.trailing_stop_pct, 0.0);
    }

    #[test]
    fn test_merge_rejects_out_of_range_with_all_issues() {
        let err = AppConfig::default()
            .merge(&ConfigOverrides {
                min_sentiment: Some(1.5),
                size_pct: Some(-0.1),
                ..ConfigOverrides::default()
            })
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("signals.min_sentiment"));
        assert!(message.contains("sizing.size_pct"));
    }

    #[test]
    fn test_top_alpha_must_not_undercut_min_edge() {
        let err = AppConfig::default()
            .merge(&ConfigOverrides {
                top_alpha_threshold: Some(0.01),
                ..ConfigOverrides::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("top_alpha_threshold"));
    }

    #[test]
    fn test_live_without_enable_rejected() {
        let mut config = AppConfig::default();
        config.trading.shadow_mode = false;
        assert!(config.validate().is_err());
        config.trading.live_enable = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_round_trip_sparse() {
        let overrides = ConfigOverrides {
            max_positions: Some(3),
            ..ConfigOverrides::default()
        };
        let json = serde_json::to_string(&overrides).unwrap();
        assert_eq!(json, r#"{"max_positions":3}"#);
        assert!(ConfigOverrides::default().is_empty());
    }
}
