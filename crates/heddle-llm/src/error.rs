//! Client error types for heddle-llm.
//!
//! All completion and inference operations return [`Result<T>`] which uses
//! [`ProviderError`] as the error type. The engine core performs no
//! retries; callers that want retry policy wrap these clients.

use thiserror::Error;

/// Errors that can occur when calling an LLM completion or hosted
/// inference service.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP request to the service failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The service is throttling requests (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait time before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The requested model does not exist on the completion service.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The requested hosted inference endpoint does not exist.
    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    /// The client has not been configured (e.g. missing API key).
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The service returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An HTTP-level error from reqwest (includes timeouts).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience type alias for client operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
