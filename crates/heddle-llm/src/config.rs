//! Connection configuration for LLM completion targets.
//!
//! An [`LlmTarget`] describes one OpenAI-compatible endpoint: base URL,
//! API key, and any extra headers. Azure deployments work as plain targets
//! since their deployment URL is itself an OpenAI-compatible base.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the built-in default completion target.
pub const DEFAULT_TARGET_NAME: &str = "DEFAULT_LLM";

/// Connection configuration for one OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTarget {
    /// Target name, recorded with persisted runs (e.g. "DEFAULT_LLM" or a
    /// customer-configured endpoint name).
    pub name: String,

    /// Base URL of the API (e.g. "https://api.openai.com/v1").
    pub base_url: String,

    /// API key. `None` means not configured; calls will fail with
    /// [`ProviderError::NotConfigured`](crate::error::ProviderError).
    pub api_key: Option<String>,

    /// Extra HTTP headers to include in every request to this target.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds. Defaults to 120.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl LlmTarget {
    /// A named target with an explicit base URL and API key.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: Some(api_key.into()),
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }
}

/// The built-in default target: the OpenAI API, keyed from the
/// `OPENAI_API_KEY` environment variable.
pub fn default_target() -> LlmTarget {
    LlmTarget {
        name: DEFAULT_TARGET_NAME.into(),
        base_url: "https://api.openai.com/v1".into(),
        api_key: std::env::var("OPENAI_API_KEY").ok(),
        headers: HashMap::new(),
        timeout_secs: None,
    }
}
