use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use candidate_engine::AlphaScanResult;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::{ConfirmationResult, ResearchVerdict, Result, Signal, TtlCache};
use decision_engine::TradeIntent;
use position_engine::PositionBook;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::budget::RateBudgets;
use crate::config::{AppConfig, ConfigOverrides};
use crate::cost::CostTracker;

pub const STATE_VERSION: u32 = 1;

/// An approved pre-open decision, executed once the session opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedEntry {
    pub intent: TradeIntent,
    pub sentiment: f64,
    pub social_volume: u32,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremarketPlan {
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub intents: Vec<PlannedEntry>,
}

/// Everything the scheduler owns between wakes. Loaded once, committed once
/// per wake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub version: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: ConfigOverrides,
    /// Latest signals per symbol.
    pub signal_cache: TtlCache<Vec<Signal>>,
    #[serde(default)]
    pub positions: PositionBook,
    #[serde(default)]
    pub cost: CostTracker,
    /// Full candidate and position research.
    pub research_cache: TtlCache<ResearchVerdict>,
    /// Lighter per-signal research.
    pub signal_research_cache: TtlCache<ResearchVerdict>,
    pub confirmation_cache: TtlCache<ConfirmationResult>,
    pub budgets: RateBudgets,
    #[serde(default)]
    pub crypto_universe: Vec<String>,
    #[serde(default)]
    pub premarket_plan: Option<PremarketPlan>,
    /// Last day a plan was generated, so the window fires once.
    #[serde(default)]
    pub last_plan_day: Option<NaiveDate>,
    #[serde(default)]
    pub alpha_scan: Option<AlphaScanResult>,
    /// Last run per interval-gated step.
    #[serde(default)]
    pub last_runs: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub last_wake: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl BotState {
    pub fn new(config: &AppConfig, now: DateTime<Utc>) -> Self {
        let caches = &config.caches;
        Self {
            version: STATE_VERSION,
            enabled: true,
            config: ConfigOverrides::default(),
            signal_cache: TtlCache::new(Duration::minutes(caches.signal_ttl_minutes)),
            positions: PositionBook::default(),
            cost: CostTracker::default(),
            research_cache: TtlCache::new(Duration::minutes(caches.research_ttl_minutes)),
            signal_research_cache: TtlCache::new(Duration::minutes(
                caches.signal_research_ttl_minutes,
            )),
            confirmation_cache: TtlCache::new(Duration::minutes(caches.confirmation_ttl_minutes)),
            budgets: RateBudgets::new(&config.budgets, now),
            crypto_universe: Vec::new(),
            premarket_plan: None,
            last_plan_day: None,
            alpha_scan: None,
            last_runs: BTreeMap::new(),
            last_wake: None,
        }
    }

    /// Re-apply configured TTLs and limits after a load or config change.
    pub fn adopt_config(&mut self, config: &AppConfig) {
        let caches = &config.caches;
        self.signal_cache
            .set_ttl(Duration::minutes(caches.signal_ttl_minutes));
        self.research_cache
            .set_ttl(Duration::minutes(caches.research_ttl_minutes));
        self.signal_research_cache
            .set_ttl(Duration::minutes(caches.signal_research_ttl_minutes));
        self.confirmation_cache
            .set_ttl(Duration::minutes(caches.confirmation_ttl_minutes));
        self.budgets.apply_limits(&config.budgets);
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        self.signal_cache.purge_expired(now)
            + self.research_cache.purge_expired(now)
            + self.signal_research_cache.purge_expired(now)
            + self.confirmation_cache.purge_expired(now)
    }

    /// All live cached signals, flattened.
    pub fn live_signals(&self, now: DateTime<Utc>) -> Vec<Signal> {
        self.signal_cache
            .iter_live(now)
            .flat_map(|(_, signals)| signals.iter().cloned())
            .collect()
    }

    pub fn is_due(&self, step: &str, interval_secs: i64, now: DateTime<Utc>) -> bool {
        match self.last_runs.get(step) {
            Some(last) => now - *last > Duration::seconds(interval_secs),
            None => true,
        }
    }

    pub fn mark_run(&mut self, step: &str, now: DateTime<Utc>) {
        self.last_runs.insert(step.to_string(), now);
    }
}

pub fn resolve_state_path(trades_dir: &Path) -> PathBuf {
    if let Ok(raw) = std::env::var("STATE_PATH") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    trades_dir.join("state.json")
}

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted state, or a fresh one. An unreadable file is moved
    /// aside rather than overwritten.
    pub fn load(&self, config: &AppConfig, now: DateTime<Utc>) -> Result<BotState> {
        if !self.path.exists() {
            info!("no state at {}, starting fresh", self.path.display());
            return Ok(BotState::new(config, now));
        }
        let raw = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<BotState>(&raw) {
            Ok(mut state) => {
                state.adopt_config(config);
                Ok(state)
            }
            Err(e) => {
                let aside = self
                    .path
                    .with_extension(format!("json.corrupt-{}", now.timestamp()));
                warn!(
                    "state file {} unreadable ({}); moving to {}",
                    self.path.display(),
                    e,
                    aside.display()
                );
                std::fs::rename(&self.path, &aside)?;
                Ok(BotState::new(config, now))
            }
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn commit(&self, state: &BotState) -> Result<()> {
        write_json_atomic(&self.path, state)
    }
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
