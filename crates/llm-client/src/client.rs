use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use serde_json::json;
use tokio::time::sleep;
use tracing::{instrument, warn};

use crate::types::{
    outcome_from_text, JudgeError, JudgeOutcome, JudgePrompt, JudgePurpose, JudgeReply, LlmJudge,
    TokenUsage,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct AnthropicJudge {
    client: Client,
    api_key: String,
    model: String,
    max_retries: u32,
    max_tokens: u32,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl AnthropicJudge {
    pub fn new(
        api_key: String,
        model: String,
        timeout_ms: u64,
        max_retries: u32,
        requests_per_minute: u32,
    ) -> Result<Self, JudgeError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| JudgeError::ApiError(e.to_string()))?;
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            api_key,
            model,
            max_retries,
            max_tokens: 1024,
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
        })
    }

    fn extract_text_content(response_body: &serde_json::Value) -> Result<&str, JudgeError> {
        let content_arr = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                JudgeError::SchemaValidationFailed("Missing or invalid 'content' field".into())
            })?;

        content_arr
            .iter()
            .find(|item| item["type"] == "text")
            .and_then(|item| item["text"].as_str())
            .ok_or_else(|| JudgeError::SchemaValidationFailed("Missing 'text' content".into()))
    }

    fn extract_usage(response_body: &serde_json::Value) -> TokenUsage {
        let usage = &response_body["usage"];
        TokenUsage {
            input_tokens: usage["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: usage["output_tokens"].as_u64().unwrap_or(0),
        }
    }

    fn system_prompt(purpose: JudgePurpose) -> Result<String, JudgeError> {
        let schema = schemars::schema_for!(JudgeReply);
        let schema_json = serde_json::to_string_pretty(&schema)?;

        let task = match purpose {
            JudgePurpose::SignalResearch => {
                "Decide quickly whether crowd chatter about this ticker is worth acting on."
            }
            JudgePurpose::CandidateResearch => {
                "Decide whether to open a long position now, given the social signal and the measured edge versus the market's implied move."
            }
            JudgePurpose::PositionReview => {
                "Review an open position. Flag anything that argues for exiting."
            }
        };

        Ok(format!(
            r#"You are a disciplined research analyst for a sentiment-driven trading desk.
{}
verdict is BUY, SKIP or WAIT. entry_quality is excellent, good, fair or poor.
You must output strictly valid JSON conforming to the schema below.
Do NOT output any markdown blocks or conversational text. JUST the JSON object.

JSON Schema:
{}
"#,
            task, schema_json
        ))
    }

    async fn send_with_retries(
        &self,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, JudgeError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;
            let send_result = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .header("content-type", "application/json")
                .json(payload)
                .send()
                .await;

            match send_result {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        let retryable = status.as_u16() == 429 || status.is_server_error();
                        if retryable && attempt < self.max_retries {
                            attempt += 1;
                            sleep(Duration::from_millis(150 * u64::from(attempt))).await;
                            continue;
                        }
                        return Err(JudgeError::HttpStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    return response
                        .json()
                        .await
                        .map_err(|e| JudgeError::ApiError(e.to_string()));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        attempt += 1;
                        sleep(Duration::from_millis(150 * u64::from(attempt))).await;
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(JudgeError::Timeout);
                    }
                    return Err(JudgeError::ApiError(e.to_string()));
                }
            }
        }
    }

    async fn ask(&self, prompt: &JudgePrompt) -> Result<JudgeOutcome, JudgeError> {
        let user_prompt = json!({
            "symbol": &prompt.symbol,
            "asset_class": prompt.asset_class.as_str(),
            "purpose": prompt.purpose,
            "context": &prompt.context,
            "as_of": prompt.as_of.to_rfc3339(),
        });

        let payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": Self::system_prompt(prompt.purpose)?,
            "messages": [
                {
                    "role": "user",
                    "content": serde_json::to_string(&user_prompt)?
                }
            ]
        });

        let body = self.send_with_retries(&payload).await?;
        let usage = Self::extract_usage(&body);
        let text = Self::extract_text_content(&body)?;
        Ok(outcome_from_text(text, usage))
    }
}

#[async_trait]
impl LlmJudge for AnthropicJudge {
    #[instrument(skip(self, prompt), fields(request_id = %prompt.request_id, symbol = %prompt.symbol))]
    async fn evaluate(&self, prompt: &JudgePrompt) -> JudgeOutcome {
        match self.ask(prompt).await {
            Ok(outcome) => {
                if let JudgeOutcome::Unparseable { error, .. } = &outcome {
                    warn!("judge reply unparseable: {}", error);
                }
                outcome
            }
            Err(e) => {
                warn!("judge call failed: {}", e);
                JudgeOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_text_and_usage() {
        let body = json!({
            "content": [
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "{\"verdict\":\"BUY\"}"}
            ],
            "usage": {"input_tokens": 812, "output_tokens": 95}
        });
        let text = AnthropicJudge::extract_text_content(&body).unwrap();
        assert_eq!(text, "{\"verdict\":\"BUY\"}");
        let usage = AnthropicJudge::extract_usage(&body);
        assert_eq!(usage.input_tokens, 812);
        assert_eq!(usage.output_tokens, 95);
    }

    #[test]
    fn test_missing_content_is_error() {
        let body = json!({"error": "overloaded"});
        assert!(AnthropicJudge::extract_text_content(&body).is_err());
        assert_eq!(AnthropicJudge::extract_usage(&body), TokenUsage::default());
    }

    #[test]
    fn test_system_prompt_embeds_schema() {
        let prompt = AnthropicJudge::system_prompt(JudgePurpose::PositionReview).unwrap();
        assert!(prompt.contains("entry_quality"));
        assert!(prompt.contains("open position"));
    }

    #[test]
    fn test_zero_rpm_falls_back_to_one() {
        let judge = AnthropicJudge::new("k".into(), "m".into(), 1000, 0, 0).unwrap();
        assert!(judge.limiter.check().is_ok());
        assert!(judge.limiter.check().is_err());
    }
}
