//! The [`CompletionClient`] trait for single-prompt LLM completions.

use async_trait::async_trait;

use heddle_types::{ModelConfig, TokenUsage};

use crate::error::Result;

/// The text and usage returned by one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The model's output text.
    pub text: String,

    /// Token usage, when the provider reported it.
    pub usage: Option<TokenUsage>,
}

/// A client that can execute a single-prompt completion against a
/// configured target.
///
/// The engine's normalizer and LLM predictor both consume this trait; the
/// main implementation is
/// [`OpenAiCompatClient`](crate::openai_compat::OpenAiCompatClient), which
/// works with any OpenAI-compatible endpoint. Retry policy belongs to
/// implementations or wrappers, never to the engine.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// The target name, recorded with persisted runs.
    fn name(&self) -> &str;

    /// Execute a completion call and return the generated text.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`](crate::error::ProviderError) on network
    /// failure, authentication problems, rate limiting, or an unparsable
    /// response.
    async fn complete(&self, model: &ModelConfig, prompt: &str) -> Result<Completion>;
}
