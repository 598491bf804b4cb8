use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::config::BudgetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Judge,
    Confirmation,
    BreakingNews,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BudgetKind::Judge => "judge",
            BudgetKind::Confirmation => "confirmation",
            BudgetKind::BreakingNews => "breaking_news",
        };
        f.write_str(name)
    }
}

/// Rolling daily quota. The window resets once more than 24h have passed
/// since the anchor, so no two resets are closer than a day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBudget {
    pub used_count: u32,
    pub reset_anchor: DateTime<Utc>,
    pub daily_limit: u32,
}

impl RateBudget {
    pub fn new(daily_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            used_count: 0,
            reset_anchor: now,
            daily_limit,
        }
    }

    /// Returns true if the window rolled over.
    fn roll(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.reset_anchor > Duration::hours(24) {
            self.used_count = 0;
            self.reset_anchor = now;
            return true;
        }
        false
    }

    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.used_count)
    }

    pub fn try_consume(&mut self, kind: BudgetKind, now: DateTime<Utc>) -> Result<()> {
        self.roll(now);
        if self.used_count >= self.daily_limit {
            return Err(Error::RateBudgetExhausted {
                kind: kind.to_string(),
                used: self.used_count,
                limit: self.daily_limit,
            });
        }
        self.used_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateBudgets {
    pub judge: RateBudget,
    pub confirmation: RateBudget,
    pub breaking_news: RateBudget,
    #[serde(default)]
    pub judge_per_symbol: HashMap<String, u32>,
    pub judge_per_symbol_limit: u32,
}

impl RateBudgets {
    pub fn new(config: &BudgetConfig, now: DateTime<Utc>) -> Self {
        Self {
            judge: RateBudget::new(config.judge_daily_max_calls, now),
            confirmation: RateBudget::new(config.confirmation_daily_max_calls, now),
            breaking_news: RateBudget::new(config.breaking_news_daily_max_calls, now),
            judge_per_symbol: HashMap::new(),
            judge_per_symbol_limit: config.judge_per_symbol_max_calls,
        }
    }

    /// Adopt configured limits without touching usage.
    pub fn apply_limits(&mut self, config: &BudgetConfig) {
        self.judge.daily_limit = config.judge_daily_max_calls;
        self.confirmation.daily_limit = config.confirmation_daily_max_calls;
        self.breaking_news.daily_limit = config.breaking_news_daily_max_calls;
        self.judge_per_symbol_limit = config.judge_per_symbol_max_calls;
    }

    pub fn get(&self, kind: BudgetKind) -> &RateBudget {
        match kind {
            BudgetKind::Judge => &self.judge,
            BudgetKind::Confirmation => &self.confirmation,
            BudgetKind::BreakingNews => &self.breaking_news,
        }
    }

    pub fn try_consume(&mut self, kind: BudgetKind, now: DateTime<Utc>) -> Result<()> {
        let budget = match kind {
            BudgetKind::Judge => &mut self.judge,
            BudgetKind::Confirmation => &mut self.confirmation,
            BudgetKind::BreakingNews => &mut self.breaking_news,
        };
        budget.try_consume(kind, now)
    }

    /// Judge call for one symbol: checks both the daily and per-symbol caps
    /// and only spends when both allow it.
    pub fn try_consume_judge(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<()> {
        if self.judge.roll(now) {
            self.judge_per_symbol.clear();
        }
        let used = self.judge_per_symbol.get(symbol).copied().unwrap_or(0);
        if used >= self.judge_per_symbol_limit {
            return Err(Error::RateBudgetExhausted {
                kind: format!("judge:{}", symbol),
                used,
                limit: self.judge_per_symbol_limit,
            });
        }
        self.judge.try_consume(BudgetKind::Judge, now)?;
        *self.judge_per_symbol.entry(symbol.to_string()).or_insert(0) += 1;
        Ok(())
    }
}
