//! LLM transport.
//!
//! [`AnswerModel`] is the seam between the Q&A pipeline and the external
//! model: production uses the Anthropic Messages API over a blocking HTTP
//! client with a 60 s timeout; tests inject a canned implementation.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::LlmError;

/// Anthropic Messages API endpoint.
const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum tokens requested per answer.
const MAX_TOKENS: u32 = 4096;

/// The model that synthesizes answers from packed context.
pub trait AnswerModel: Send + Sync {
    /// Completes one (system, user) exchange and returns the answer text.
    fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    timeout: Duration,
    http: reqwest::blocking::Client,
}

impl AnthropicClient {
    /// Creates a client for the given API key and model id.
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let timeout = Duration::from_secs(timeout_secs);
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
            http,
        })
    }
}

impl AnswerModel for AnthropicClient {
    fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        debug!(model = %self.model, "calling messages API");

        let response = self
            .http
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::Auth(api_error_message(&payload)));
        }
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimit(api_error_message(&payload)));
        }
        if !status.is_success() {
            return Err(LlmError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                api_error_message(&payload)
            )));
        }

        payload["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find_map(|block| block["text"].as_str().map(str::to_string))
            })
            .ok_or_else(|| LlmError::MalformedResponse("no text content in response".to_string()))
    }
}

fn api_error_message(payload: &Value) -> String {
    payload["error"]["message"]
        .as_str()
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned model for pipeline tests.
    pub struct FixedAnswer(pub String);

    impl AnswerModel for FixedAnswer {
        fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        let err = AnthropicClient::new("", "claude-sonnet-4-5-20250929", 60);
        assert!(matches!(err, Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_client_construction() {
        let client = AnthropicClient::new("sk-test", "claude-sonnet-4-5-20250929", 60).unwrap();
        assert_eq!(client.model, "claude-sonnet-4-5-20250929");
        assert_eq!(client.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_api_error_message_extraction() {
        let payload = json!({"error": {"type": "auth", "message": "invalid key"}});
        assert_eq!(api_error_message(&payload), "invalid key");
        assert_eq!(api_error_message(&json!({})), "unknown error");
    }

    #[test]
    fn test_fixed_answer_model() {
        let model = FixedAnswer("canned".to_string());
        assert_eq!(model.complete("s", "u").unwrap(), "canned");
    }
}
