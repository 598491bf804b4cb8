use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AssetClass, EntryQuality, ResearchVerdict, Verdict};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// External judge. Never fails at the type level: transport and parse
/// problems come back as outcome variants.
#[async_trait]
pub trait LlmJudge: Send + Sync {
    async fn evaluate(&self, prompt: &JudgePrompt) -> JudgeOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgePurpose {
    /// Lighter per-signal check before any alpha evidence exists.
    SignalResearch,
    /// Full entry research on a scored candidate.
    CandidateResearch,
    /// Re-evaluation of a held position.
    PositionReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgePrompt {
    pub request_id: Uuid,
    pub symbol: String,
    pub asset_class: AssetClass,
    pub purpose: JudgePurpose,
    /// Structured context: signal stats, alpha numbers, position P&L.
    pub context: serde_json::Value,
    pub as_of: DateTime<Utc>,
}

impl JudgePrompt {
    pub fn new(
        symbol: &str,
        asset_class: AssetClass,
        purpose: JudgePurpose,
        context: serde_json::Value,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            asset_class,
            purpose,
            context,
            as_of,
        }
    }
}

/// Structured judge answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JudgeReply {
    /// One of BUY, SKIP, WAIT.
    #[schemars(with = "String")]
    pub verdict: Verdict,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// One of excellent, good, fair, poor.
    #[schemars(with = "String")]
    pub entry_quality: EntryQuality,
    pub reasoning: String,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub catalysts: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JudgeOutcome {
    Verdict { reply: JudgeReply, usage: TokenUsage },
    /// The judge answered but not in the agreed shape. Neither BUY nor veto.
    Unparseable {
        raw: String,
        error: String,
        usage: TokenUsage,
    },
    /// Transport failure, timeout, or HTTP error.
    Failed(String),
}

impl JudgeOutcome {
    pub fn usage(&self) -> TokenUsage {
        match self {
            JudgeOutcome::Verdict { usage, .. } | JudgeOutcome::Unparseable { usage, .. } => *usage,
            JudgeOutcome::Failed(_) => TokenUsage::default(),
        }
    }

    pub fn to_verdict(&self, symbol: &str, now: DateTime<Utc>) -> Option<ResearchVerdict> {
        match self {
            JudgeOutcome::Verdict { reply, .. } => Some(ResearchVerdict {
                symbol: symbol.to_string(),
                verdict: reply.verdict,
                confidence: reply.confidence,
                entry_quality: reply.entry_quality,
                reasoning: reply.reasoning.clone(),
                red_flags: reply.red_flags.clone(),
                catalysts: reply.catalysts.clone(),
                timestamp: now,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("API request failed: {0}")]
    ApiError(String),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Timeout")]
    Timeout,
    #[error("Schema validation failed: {0}")]
    SchemaValidationFailed(String),
}

pub fn validate_reply(reply: &JudgeReply) -> Result<(), JudgeError> {
    if !(0.0..=1.0).contains(&reply.confidence) {
        return Err(JudgeError::SchemaValidationFailed(
            "confidence must be in [0,1]".into(),
        ));
    }
    if reply.reasoning.trim().is_empty() {
        return Err(JudgeError::SchemaValidationFailed(
            "reasoning must not be empty".into(),
        ));
    }
    Ok(())
}

/// Pull the JSON object out of free-form judge text and validate it.
/// Enum casing is normalised since models drift on it.
pub fn parse_judge_text(text: &str) -> Result<JudgeReply, JudgeError> {
    let start = text
        .find('{')
        .ok_or_else(|| JudgeError::SchemaValidationFailed("no JSON object in reply".into()))?;
    let end = text
        .rfind('}')
        .map(|i| i + 1)
        .filter(|end| *end > start)
        .ok_or_else(|| JudgeError::SchemaValidationFailed("unterminated JSON object".into()))?;

    let mut value: serde_json::Value = serde_json::from_str(&text[start..end])?;
    if let Some(obj) = value.as_object_mut() {
        if let Some(verdict) = obj.get("verdict").and_then(|v| v.as_str()) {
            let upper = verdict.trim().to_ascii_uppercase();
            obj.insert("verdict".into(), serde_json::Value::String(upper));
        }
        if let Some(quality) = obj.get("entry_quality").and_then(|v| v.as_str()) {
            let lower = quality.trim().to_ascii_lowercase();
            obj.insert("entry_quality".into(), serde_json::Value::String(lower));
        }
    }

    let reply: JudgeReply = serde_json::from_value(value)?;
    validate_reply(&reply)?;
    Ok(reply)
}

/// Map raw judge text onto an outcome.
pub fn outcome_from_text(text: &str, usage: TokenUsage) -> JudgeOutcome {
    match parse_judge_text(text) {
        Ok(reply) => JudgeOutcome::Verdict { reply, usage },
        Err(e) => JudgeOutcome::Unparseable {
            raw: text.to_string(),
            error: e.to_string(),
            usage,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_wrapped_reply_with_loose_casing() {
        let text = r#"Here you go:
```json
{"verdict": "buy", "confidence": 0.72, "entry_quality": "Excellent",
 "reasoning": "Earnings beat with volume", "red_flags": [], "catalysts": ["earnings"]}
```"#;
        let reply = parse_judge_text(text).unwrap();
        assert_eq!(reply.verdict, Verdict::Buy);
        assert_eq!(reply.entry_quality, EntryQuality::Excellent);
        assert_eq!(reply.catalysts, vec!["earnings".to_string()]);
    }

    #[test]
    fn test_out_of_range_confidence_is_unparseable() {
        let text = r#"{"verdict":"SKIP","confidence":1.4,"entry_quality":"poor","reasoning":"x"}"#;
        let outcome = outcome_from_text(text, TokenUsage::default());
        assert!(matches!(outcome, JudgeOutcome::Unparseable { .. }));
        assert!(outcome.to_verdict("AAPL", Utc::now()).is_none());
    }

    #[test]
    fn test_prose_only_is_unparseable() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        };
        let outcome = outcome_from_text("I think you should buy it.", usage);
        match outcome {
            JudgeOutcome::Unparseable { usage: got, .. } => assert_eq!(got, usage),
            other => panic!("expected unparseable, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_verdict_is_unparseable() {
        let text = r#"{"verdict":"HOLD","confidence":0.5,"entry_quality":"fair","reasoning":"meh"}"#;
        assert!(parse_judge_text(text).is_err());
    }

    #[test]
    fn test_verdict_conversion_carries_fields() {
        let text = r#"{"verdict":"WAIT","confidence":0.4,"entry_quality":"fair","reasoning":"wait for pullback","red_flags":["extended"]}"#;
        let now = Utc::now();
        let verdict = outcome_from_text(text, TokenUsage::default())
            .to_verdict("MSFT", now)
            .unwrap();
        assert_eq!(verdict.symbol, "MSFT");
        assert_eq!(verdict.verdict, Verdict::Wait);
        assert_eq!(verdict.red_flags, vec!["extended".to_string()]);
        assert_eq!(verdict.timestamp, now);
    }
}
