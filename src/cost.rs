use std::collections::BTreeMap;

use llm_client::{JudgeOutcome, JudgePurpose, TokenUsage};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBucket {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub usd: f64,
}

/// Judge spend, overall and per purpose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTracker {
    pub total: CostBucket,
    #[serde(default)]
    pub by_purpose: BTreeMap<String, CostBucket>,
    #[serde(default)]
    pub unparseable: u64,
    #[serde(default)]
    pub failures: u64,
}

fn purpose_key(purpose: JudgePurpose) -> &'static str {
    match purpose {
        JudgePurpose::SignalResearch => "signal_research",
        JudgePurpose::CandidateResearch => "candidate_research",
        JudgePurpose::PositionReview => "position_review",
    }
}

pub fn usd_for(usage: TokenUsage, prices: &LlmConfig) -> f64 {
    usage.input_tokens as f64 / 1_000_000.0 * prices.input_usd_per_mtok
        + usage.output_tokens as f64 / 1_000_000.0 * prices.output_usd_per_mtok
}

impl CostTracker {
    pub fn record(&mut self, purpose: JudgePurpose, outcome: &JudgeOutcome, prices: &LlmConfig) {
        match outcome {
            JudgeOutcome::Unparseable { .. } => self.unparseable += 1,
            JudgeOutcome::Failed(_) => self.failures += 1,
            JudgeOutcome::Verdict { .. } => {}
        }
        let usage = outcome.usage();
        let usd = usd_for(usage, prices);
        for bucket in [
            &mut self.total,
            self.by_purpose
                .entry(purpose_key(purpose).to_string())
                .or_default(),
        ] {
            bucket.calls += 1;
            bucket.input_tokens += usage.input_tokens;
            bucket.output_tokens += usage.output_tokens;
            bucket.usd += usd;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_usage_and_failures() {
        let prices = LlmConfig::default();
        let mut tracker = CostTracker::default();
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        tracker.record(
            JudgePurpose::CandidateResearch,
            &JudgeOutcome::Unparseable {
                raw: "?".into(),
                error: "no json".into(),
                usage,
            },
            &prices,
        );
        tracker.record(
            JudgePurpose::PositionReview,
            &JudgeOutcome::Failed("timeout".into()),
            &prices,
        );

        assert_eq!(tracker.total.calls, 2);
        assert_eq!(tracker.unparseable, 1);
        assert_eq!(tracker.failures, 1);
        // 1M in at $3 + 0.1M out at $15
        assert!((tracker.total.usd - 4.5).abs() < 1e-9);
        assert_eq!(tracker.by_purpose["candidate_research"].input_tokens, 1_000_000);
        assert_eq!(tracker.by_purpose["position_review"].usd, 0.0);
    }
}
