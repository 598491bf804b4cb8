use common::{AlphaCandidate, AssetClass, ConfirmationResult, EntryQuality, ResearchVerdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decision {
    Approve(TradeIntent),
    Veto(VetoReason),
}

impl Decision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Decision::Approve(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub confidence: f64,
    pub basis: ConfidenceBasis,
    pub reasons: Vec<String>,
}

/// Which evidence produced the pre-confirmation confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBasis {
    AlphaOnly,
    AlphaAndJudge,
    JudgeOnly,
    SignalResearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VetoKind {
    /// Judge answered SKIP or WAIT.
    JudgeVeto,
    /// Nothing to compose a confidence from.
    NoEvidence,
    BelowThreshold { computed: f64, required: f64 },
    EntryQuality { got: Option<EntryQuality> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VetoReason {
    pub symbol: String,
    pub kind: VetoKind,
    pub reason: String,
}

/// Everything known about one symbol at decision time.
#[derive(Debug, Clone, Copy)]
pub struct CompositionInput<'a> {
    pub symbol: &'a str,
    pub asset_class: AssetClass,
    /// Mean weighted sentiment the signal was screened on.
    pub sentiment: f64,
    pub alpha: Option<&'a AlphaCandidate>,
    pub judge: Option<&'a ResearchVerdict>,
    /// Lighter per-signal research, used only when neither alpha nor judge exist.
    pub signal_research: Option<&'a ResearchVerdict>,
    pub confirmation: Option<&'a ConfirmationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerParams {
    #[serde(default = "default_alpha_threshold")]
    pub alpha_threshold: f64,
    #[serde(default = "default_alpha_weight")]
    pub alpha_weight: f64,
    #[serde(default = "default_confirm_boost")]
    pub confirm_boost: f64,
    #[serde(default = "default_disagree_penalty")]
    pub disagree_penalty: f64,
    /// Confirmation is only asked for at or above this |sentiment|.
    #[serde(default = "default_min_confirmation_sentiment")]
    pub min_confirmation_sentiment: f64,
    #[serde(default = "default_min_equity_confidence")]
    pub min_equity_confidence: f64,
    #[serde(default = "default_min_crypto_confidence")]
    pub min_crypto_confidence: f64,
    #[serde(default = "default_min_options_confidence")]
    pub min_options_confidence: f64,
}

fn default_alpha_threshold() -> f64 {
    0.15
}
fn default_alpha_weight() -> f64 {
    0.6
}
fn default_confirm_boost() -> f64 {
    1.15
}
fn default_disagree_penalty() -> f64 {
    0.85
}
fn default_min_confirmation_sentiment() -> f64 {
    0.3
}
fn default_min_equity_confidence() -> f64 {
    0.6
}
fn default_min_crypto_confidence() -> f64 {
    0.55
}
fn default_min_options_confidence() -> f64 {
    0.8
}

impl Default for ComposerParams {
    fn default() -> Self {
        Self {
            alpha_threshold: default_alpha_threshold(),
            alpha_weight: default_alpha_weight(),
            confirm_boost: default_confirm_boost(),
            disagree_penalty: default_disagree_penalty(),
            min_confirmation_sentiment: default_min_confirmation_sentiment(),
            min_equity_confidence: default_min_equity_confidence(),
            min_crypto_confidence: default_min_crypto_confidence(),
            min_options_confidence: default_min_options_confidence(),
        }
    }
}

impl ComposerParams {
    pub fn min_confidence(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::Equity => self.min_equity_confidence,
            AssetClass::Crypto => self.min_crypto_confidence,
            AssetClass::Option => self.min_options_confidence,
        }
    }
}
