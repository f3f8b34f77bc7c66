//! OpenAI-compatible completion client implementation.
//!
//! [`OpenAiCompatClient`] works with any API that follows the OpenAI chat
//! completion format, which covers OpenAI itself, Azure OpenAI deployment
//! URLs, and the long tail of compatible gateways.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use heddle_types::ModelConfig;

use crate::completion::{Completion, CompletionClient};
use crate::config::LlmTarget;
use crate::error::{ProviderError, Result};
use crate::types::{ChatMessage, ChatRequest, ChatResponse};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// A completion client that speaks the OpenAI chat completion protocol.
///
/// The prompt is sent as a single user message with temperature pinned to
/// 0.0, and the first choice's content is returned as the completion text.
pub struct OpenAiCompatClient {
    target: LlmTarget,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new client for the given target.
    pub fn new(target: LlmTarget) -> Self {
        let timeout = Duration::from_secs(target.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { target, http }
    }

    /// Returns the target configuration.
    pub fn target(&self) -> &LlmTarget {
        &self.target
    }

    fn completions_url(&self) -> String {
        let base = self.target.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn resolve_api_key(&self) -> Result<&str> {
        self.target.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured(format!("api key missing for target '{}'", self.target.name))
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.target.name
    }

    async fn complete(&self, model: &ModelConfig, prompt: &str) -> Result<Completion> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            target = %self.target.name,
            model = %model.model_name,
            prompt_chars = prompt.len(),
            "sending completion request"
        );

        let body = ChatRequest {
            model: model.model_name.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: Some(0.0),
        };

        let mut request = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");
        for (key, value) in &self.target.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(
                target = %self.target.name,
                status = status.as_u16(),
                "completion request rejected"
            );
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::AuthFailed(text),
                404 => ProviderError::ModelNotFound(format!(
                    "model '{}': {text}",
                    model.model_name
                )),
                429 => ProviderError::RateLimited {
                    retry_after_ms: parse_retry_after_ms(&text).unwrap_or(1000),
                },
                _ => ProviderError::RequestFailed(format!("HTTP {status}: {text}")),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let choice = chat
            .choices
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("empty choices array".into()))?;

        debug!(
            target = %self.target.name,
            model = %chat.model,
            completion_chars = choice.message.content.len(),
            "completion response received"
        );

        Ok(Completion {
            text: choice.message.content.clone(),
            usage: chat.usage.map(Into::into),
        })
    }
}

/// Extract `retry_after_ms` (or seconds-valued `retry_after`) from a 429
/// body, if present.
fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(ms) = value.get("retry_after_ms").and_then(|v| v.as_u64()) {
        return Some(ms);
    }
    value
        .get("retry_after")
        .and_then(|v| v.as_u64())
        .map(|secs| secs * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> LlmTarget {
        LlmTarget::new("test", "https://llm.example.com/v1/", "sk-test")
    }

    #[test]
    fn completions_url_strips_trailing_slash() {
        let client = OpenAiCompatClient::new(target());
        assert_eq!(
            client.completions_url(),
            "https://llm.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let mut no_key = target();
        no_key.api_key = None;
        let client = OpenAiCompatClient::new(no_key);
        let err = client.resolve_api_key().unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn retry_after_ms_from_body() {
        assert_eq!(parse_retry_after_ms(r#"{"retry_after_ms": 250}"#), Some(250));
        assert_eq!(parse_retry_after_ms(r#"{"retry_after": 2}"#), Some(2000));
        assert_eq!(parse_retry_after_ms("not json"), None);
    }
}
