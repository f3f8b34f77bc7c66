//! Hosted inference client for fine-tuned classifiers.
//!
//! The fine-tuned predictor calls a hosted endpoint with the input text and
//! receives a probability vector aligned positionally with the predictor's
//! supported klass list. [`HttpInferenceClient`] implements the transport:
//! `POST {base}/endpoints/{name}/invocations` with body `{"inputs": text}`,
//! response a bare JSON array of probabilities.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A client that can invoke a hosted inference endpoint by name.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Invoke the endpoint with the given text and return the probability
    /// vector.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on network failure, an unknown endpoint,
    /// or an unparsable response.
    async fn invoke(&self, endpoint: &str, text: &str) -> Result<Vec<f64>>;
}

/// HTTP implementation of [`InferenceClient`].
pub struct HttpInferenceClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpInferenceClient {
    /// Create a new client against the given inference service base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            api_key: None,
            http,
        }
    }

    /// Attach a bearer token sent with every invocation.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn invocation_url(&self, endpoint: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/endpoints/{endpoint}/invocations")
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn invoke(&self, endpoint: &str, text: &str) -> Result<Vec<f64>> {
        let url = self.invocation_url(endpoint);

        debug!(endpoint, input_chars = text.len(), "invoking inference endpoint");

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.json(&json!({ "inputs": text })).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint, status = status.as_u16(), "inference invocation rejected");
            return Err(match status.as_u16() {
                401 | 403 => ProviderError::AuthFailed(body),
                404 => ProviderError::EndpointNotFound(endpoint.to_string()),
                _ => ProviderError::RequestFailed(format!("HTTP {status}: {body}")),
            });
        }

        let probabilities: Vec<f64> = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("expected a probability array: {e}"))
        })?;

        debug!(endpoint, klasses = probabilities.len(), "inference response received");

        Ok(probabilities)
    }
}
