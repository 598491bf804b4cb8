use std::collections::BTreeMap;

use candidate_engine::AlphaScanResult;
use chrono::{DateTime, Utc};
use common::{PositionEntry, Signal, StalenessScore};
use serde::Serialize;

use crate::cost::CostTracker;
use crate::phase::PhaseInfo;
use crate::state::BotState;

/// Per-wake view for status reporting, written next to the state file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub last_wake: DateTime<Utc>,
    pub enabled: bool,
    pub phase: PhaseInfo,
    pub signals: Vec<Signal>,
    pub alpha_scan: Option<AlphaScanResult>,
    pub position_entries: Vec<PositionEntry>,
    pub staleness_analysis: BTreeMap<String, StalenessScore>,
    pub cost_summary: CostTracker,
    pub failed_steps: Vec<String>,
}

impl StatusSnapshot {
    pub fn capture(
        state: &BotState,
        phase: PhaseInfo,
        failed_steps: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut signals = state.live_signals(now);
        signals.sort_by(|a, b| {
            b.sentiment
                .total_cmp(&a.sentiment)
                .then_with(|| a.symbol.cmp(&b.symbol))
                .then_with(|| a.source.cmp(&b.source))
        });
        Self {
            last_wake: now,
            enabled: state.enabled,
            phase,
            signals,
            alpha_scan: state.alpha_scan.clone(),
            position_entries: state.positions.entries().cloned().collect(),
            staleness_analysis: state.positions.staleness().clone(),
            cost_summary: state.cost.clone(),
            failed_steps,
        }
    }
}
