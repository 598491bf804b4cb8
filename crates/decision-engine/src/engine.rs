use crate::types::{
    ComposerParams, CompositionInput, ConfidenceBasis, Decision, TradeIntent, VetoKind, VetoReason,
};
use candidate_engine::alpha_confidence;
use common::{clamp01, AssetClass, ConfirmationResult, EntryQuality, ResearchVerdict, Verdict};
use tracing::info;

pub struct ConfidenceComposer {
    params: ComposerParams,
}

impl ConfidenceComposer {
    pub fn new(params: ComposerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ComposerParams {
        &self.params
    }

    /// Confirmation calls are rate limited; weak signals don't get one.
    pub fn wants_confirmation(&self, existing_sentiment: f64) -> bool {
        existing_sentiment.abs() > self.params.min_confirmation_sentiment
    }

    /// Apply a social confirmation to an already composed confidence.
    pub fn adjust_for_confirmation(
        &self,
        confidence: f64,
        confirmation: Option<&ConfirmationResult>,
    ) -> f64 {
        match confirmation {
            Some(c) if c.confirms_existing => clamp01(confidence * self.params.confirm_boost),
            Some(c) if c.sentiment != 0.0 => clamp01(confidence * self.params.disagree_penalty),
            _ => clamp01(confidence),
        }
    }

    fn veto(symbol: &str, kind: VetoKind, reason: String) -> Decision {
        Decision::Veto(VetoReason {
            symbol: symbol.to_string(),
            kind,
            reason,
        })
    }

    fn judge_veto(symbol: &str, verdict: &ResearchVerdict, label: &str) -> Option<Decision> {
        if verdict.verdict == Verdict::Buy {
            return None;
        }
        Some(Self::veto(
            symbol,
            VetoKind::JudgeVeto,
            format!("{} verdict {:?}: {}", label, verdict.verdict, verdict.reasoning),
        ))
    }

    pub fn compose(&self, input: &CompositionInput<'_>) -> Decision {
        let symbol = input.symbol;

        if let Some(judge) = input.judge {
            if let Some(veto) = Self::judge_veto(symbol, judge, "judge") {
                return veto;
            }
        }

        let alpha_conf = input
            .alpha
            .map(|c| alpha_confidence(c.alpha, self.params.alpha_threshold));

        let (base, basis, verdict_for_quality) = match (alpha_conf, input.judge) {
            (Some(a), Some(j)) => (
                self.params.alpha_weight * a + (1.0 - self.params.alpha_weight) * j.confidence,
                ConfidenceBasis::AlphaAndJudge,
                Some(j),
            ),
            (Some(a), None) => (a, ConfidenceBasis::AlphaOnly, None),
            (None, Some(j)) => (j.confidence, ConfidenceBasis::JudgeOnly, Some(j)),
            (None, None) => match input.signal_research {
                Some(research) => {
                    if let Some(veto) = Self::judge_veto(symbol, research, "signal research") {
                        return veto;
                    }
                    (research.confidence, ConfidenceBasis::SignalResearch, Some(research))
                }
                None => {
                    return Self::veto(
                        symbol,
                        VetoKind::NoEvidence,
                        "no alpha, judge, or signal research".to_string(),
                    )
                }
            },
        };

        let confidence = self.adjust_for_confirmation(clamp01(base), input.confirmation);
        let required = self.params.min_confidence(input.asset_class);

        if confidence < required {
            info!(
                "{} rejected: confidence {:.3} < required {:.3} ({})",
                symbol,
                confidence,
                required,
                input.asset_class.as_str()
            );
            return Self::veto(
                symbol,
                VetoKind::BelowThreshold {
                    computed: confidence,
                    required,
                },
                format!(
                    "confidence {:.3} below {} minimum {:.3}",
                    confidence,
                    input.asset_class.as_str(),
                    required
                ),
            );
        }

        if input.asset_class == AssetClass::Option {
            let quality = verdict_for_quality.map(|v| v.entry_quality);
            if quality != Some(EntryQuality::Excellent) {
                info!("{} rejected: options entry quality {:?}", symbol, quality);
                return Self::veto(
                    symbol,
                    VetoKind::EntryQuality { got: quality },
                    format!("options require excellent entry quality, got {:?}", quality),
                );
            }
        }

        let mut reasons = vec![format!(
            "basis={:?} base={:.3} final={:.3} sentiment={:.3}",
            basis, base, confidence, input.sentiment
        )];
        if let Some(candidate) = input.alpha {
            reasons.push(format!(
                "alpha={:.3} implied={:.3} calculated={:.3}",
                candidate.alpha, candidate.implied_prob, candidate.calculated_prob
            ));
        }
        if let Some(c) = input.confirmation {
            reasons.push(format!(
                "confirmation sentiment={:.3} agrees={}",
                c.sentiment, c.confirms_existing
            ));
        }

        Decision::Approve(TradeIntent {
            symbol: symbol.to_string(),
            asset_class: input.asset_class,
            confidence,
            basis,
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::AlphaCandidate;

    fn candidate(alpha: f64) -> AlphaCandidate {
        AlphaCandidate {
            symbol: "AAPL".into(),
            is_crypto: false,
            price: 190.0,
            notional_volume: 1e9,
            spread_pct: Some(0.0005),
            implied_prob: 0.5,
            calculated_prob: 0.5 + alpha,
            alpha,
            sentiment_avg: 0.6,
        }
    }

    fn verdict(v: Verdict, confidence: f64, quality: EntryQuality) -> ResearchVerdict {
        ResearchVerdict {
            symbol: "AAPL".into(),
            verdict: v,
            confidence,
            entry_quality: quality,
            reasoning: "test".into(),
            red_flags: vec![],
            catalysts: vec![],
            timestamp: Utc::now(),
        }
    }

    fn confirmation(sentiment: f64, agrees: bool) -> ConfirmationResult {
        ConfirmationResult {
            symbol: "AAPL".into(),
            sentiment,
            confirms_existing: agrees,
            sample_count: 12,
            timestamp: Utc::now(),
        }
    }

    fn input<'a>(class: AssetClass) -> CompositionInput<'a> {
        CompositionInput {
            symbol: "AAPL",
            asset_class: class,
            sentiment: 0.6,
            alpha: None,
            judge: None,
            signal_research: None,
            confirmation: None,
        }
    }

    fn confidence_of(decision: &Decision) -> f64 {
        match decision {
            Decision::Approve(intent) => intent.confidence,
            Decision::Veto(v) => panic!("unexpected veto: {}", v.reason),
        }
    }

    #[test]
    fn test_non_buy_judge_vetoes_regardless_of_alpha() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let alpha = candidate(0.9);
        let judge = verdict(Verdict::Wait, 0.99, EntryQuality::Excellent);
        let decision = composer.compose(&CompositionInput {
            alpha: Some(&alpha),
            judge: Some(&judge),
            ..input(AssetClass::Equity)
        });
        match decision {
            Decision::Veto(v) => assert_eq!(v.kind, VetoKind::JudgeVeto),
            other => panic!("expected veto, got {:?}", other),
        }
    }

    #[test]
    fn test_alpha_only_uses_alpha_confidence() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let alpha = candidate(0.575);
        let decision = composer.compose(&CompositionInput {
            alpha: Some(&alpha),
            ..input(AssetClass::Crypto)
        });
        // 0.5 + 0.5 * 0.425 / 0.85 = 0.75
        assert!((confidence_of(&decision) - 0.75).abs() < 1e-9);
        match decision {
            Decision::Approve(intent) => assert_eq!(intent.basis, ConfidenceBasis::AlphaOnly),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_blend_alpha_and_judge() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let alpha = candidate(0.575);
        let judge = verdict(Verdict::Buy, 0.5, EntryQuality::Good);
        let decision = composer.compose(&CompositionInput {
            alpha: Some(&alpha),
            judge: Some(&judge),
            ..input(AssetClass::Equity)
        });
        assert!((confidence_of(&decision) - (0.6 * 0.75 + 0.4 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_falls_back_to_signal_research() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let research = verdict(Verdict::Buy, 0.7, EntryQuality::Fair);
        let decision = composer.compose(&CompositionInput {
            signal_research: Some(&research),
            ..input(AssetClass::Equity)
        });
        assert!((confidence_of(&decision) - 0.7).abs() < 1e-9);

        let nothing = composer.compose(&input(AssetClass::Equity));
        assert!(matches!(
            nothing,
            Decision::Veto(VetoReason {
                kind: VetoKind::NoEvidence,
                ..
            })
        ));
    }

    #[test]
    fn test_confirmation_boost_caps_and_penalty() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let agree = confirmation(0.4, true);
        let disagree = confirmation(-0.4, false);
        let silent = confirmation(0.0, false);

        assert!((composer.adjust_for_confirmation(0.6, Some(&agree)) - 0.69).abs() < 1e-9);
        assert_eq!(composer.adjust_for_confirmation(0.95, Some(&agree)), 1.0);
        assert!((composer.adjust_for_confirmation(0.6, Some(&disagree)) - 0.51).abs() < 1e-9);
        assert_eq!(composer.adjust_for_confirmation(0.6, Some(&silent)), 0.6);
        assert_eq!(composer.adjust_for_confirmation(0.6, None), 0.6);
    }

    #[test]
    fn test_below_threshold_reports_computed_and_required() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let research = verdict(Verdict::Buy, 0.58, EntryQuality::Good);
        let decision = composer.compose(&CompositionInput {
            signal_research: Some(&research),
            ..input(AssetClass::Equity)
        });
        match decision {
            Decision::Veto(VetoReason {
                kind: VetoKind::BelowThreshold { computed, required },
                ..
            }) => {
                assert!((computed - 0.58).abs() < 1e-9);
                assert!((required - 0.6).abs() < 1e-9);
            }
            other => panic!("expected threshold veto, got {:?}", other),
        }

        // Same confidence clears the lower crypto bar.
        let crypto = composer.compose(&CompositionInput {
            signal_research: Some(&research),
            ..input(AssetClass::Crypto)
        });
        assert!(crypto.is_approved());
    }

    #[test]
    fn test_options_require_excellent_entry() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        let good = verdict(Verdict::Buy, 0.95, EntryQuality::Good);
        let excellent = verdict(Verdict::Buy, 0.95, EntryQuality::Excellent);

        let rejected = composer.compose(&CompositionInput {
            judge: Some(&good),
            ..input(AssetClass::Option)
        });
        assert!(matches!(
            rejected,
            Decision::Veto(VetoReason {
                kind: VetoKind::EntryQuality { .. },
                ..
            })
        ));

        let approved = composer.compose(&CompositionInput {
            judge: Some(&excellent),
            ..input(AssetClass::Option)
        });
        assert!(approved.is_approved());
    }

    #[test]
    fn test_wants_confirmation_only_for_strong_sentiment() {
        let composer = ConfidenceComposer::new(ComposerParams::default());
        assert!(composer.wants_confirmation(0.45));
        assert!(composer.wants_confirmation(-0.31));
        assert!(!composer.wants_confirmation(0.3));
        assert!(!composer.wants_confirmation(-0.3));
        assert!(!composer.wants_confirmation(0.1));
    }
}
