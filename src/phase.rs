use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::Clock;
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;

/// Regular session length; the clock only reports the next close.
const SESSION_MINUTES: i64 = 390;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    Closed,
    PreOpen,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseInfo {
    pub equity: MarketPhase,
    /// Crypto trades around the clock; this only reflects whether it's enabled.
    pub crypto_active: bool,
    pub minutes_to_open: Option<i64>,
    pub minutes_since_open: Option<i64>,
    /// Trading day the phase refers to (the upcoming session when closed).
    pub session_day: NaiveDate,
}

impl PhaseInfo {
    pub fn from_clock(clock: &Clock, config: &SchedulerConfig, crypto_enabled: bool) -> Self {
        let now = clock.timestamp;
        if clock.is_open {
            let opened_at = clock.next_close - Duration::minutes(SESSION_MINUTES);
            return Self {
                equity: MarketPhase::Open,
                crypto_active: crypto_enabled,
                minutes_to_open: None,
                minutes_since_open: Some((now - opened_at).num_minutes().max(0)),
                session_day: opened_at.date_naive(),
            };
        }

        let to_open = (clock.next_open - now).num_minutes();
        let equity = if to_open >= 0 && to_open <= config.preopen_minutes {
            MarketPhase::PreOpen
        } else {
            MarketPhase::Closed
        };
        Self {
            equity,
            crypto_active: crypto_enabled,
            minutes_to_open: Some(to_open),
            minutes_since_open: None,
            session_day: clock.next_open.date_naive(),
        }
    }

    /// Equities are unknown when the clock can't be read; crypto carries on.
    pub fn fallback(now: DateTime<Utc>, crypto_enabled: bool) -> Self {
        Self {
            equity: MarketPhase::Closed,
            crypto_active: crypto_enabled,
            minutes_to_open: None,
            minutes_since_open: None,
            session_day: now.date_naive(),
        }
    }

    pub fn equities_active(&self) -> bool {
        matches!(self.equity, MarketPhase::Open | MarketPhase::PreOpen)
    }

    pub fn in_plan_window(&self, config: &SchedulerConfig) -> bool {
        self.equity == MarketPhase::PreOpen
            && self
                .minutes_to_open
                .is_some_and(|m| m <= config.plan_window_minutes)
    }

    pub fn in_open_window(&self, config: &SchedulerConfig) -> bool {
        self.equity == MarketPhase::Open
            && self
                .minutes_since_open
                .is_some_and(|m| m <= config.open_window_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, h, m, 0).unwrap()
    }

    fn clock(now: DateTime<Utc>, is_open: bool) -> Clock {
        Clock {
            timestamp: now,
            is_open,
            next_open: if is_open { at(13, 30) + Duration::days(1) } else { at(13, 30) },
            next_close: at(20, 0),
        }
    }

    #[test]
    fn test_preopen_and_plan_window() {
        let config = SchedulerConfig::default();
        let early = PhaseInfo::from_clock(&clock(at(11, 0), false), &config, true);
        assert_eq!(early.equity, MarketPhase::Closed);

        let preopen = PhaseInfo::from_clock(&clock(at(12, 50), false), &config, true);
        assert_eq!(preopen.equity, MarketPhase::PreOpen);
        assert!(!preopen.in_plan_window(&config));

        let plan = PhaseInfo::from_clock(&clock(at(13, 20), false), &config, true);
        assert!(plan.in_plan_window(&config));
        assert_eq!(plan.session_day, at(0, 0).date_naive());
    }

    #[test]
    fn test_open_window_from_next_close() {
        let config = SchedulerConfig::default();
        let just_opened = PhaseInfo::from_clock(&clock(at(13, 35), true), &config, false);
        assert_eq!(just_opened.equity, MarketPhase::Open);
        assert_eq!(just_opened.minutes_since_open, Some(5));
        assert!(just_opened.in_open_window(&config));
        assert!(!just_opened.crypto_active);

        let midday = PhaseInfo::from_clock(&clock(at(17, 0), true), &config, true);
        assert!(!midday.in_open_window(&config));
        assert!(midday.equities_active());
    }
}
