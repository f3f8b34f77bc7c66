//! Wire types for the OpenAI-compatible chat completion API.
//!
//! Only the subset the engine needs: single-turn prompt in, first choice
//! text out, token usage. No streaming, no tool calls.

use serde::{Deserialize, Serialize};

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The role of the message author ("system", "user", "assistant").
    pub role: String,

    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// The model identifier (e.g. "gpt-4o").
    pub model: String,

    /// The conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature. The engine pins this to 0.0 for
    /// deterministic classification output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// A chat completion response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    /// Provider-assigned response id.
    pub id: String,

    /// The model that produced the response.
    pub model: String,

    /// Response choices; the engine reads the first.
    pub choices: Vec<Choice>,

    /// Token usage, when the provider reports it.
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    /// The generated message.
    pub message: ChatMessage,

    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage in the provider's wire format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct WireUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Prompt + completion.
    pub total_tokens: u32,
}

impl From<WireUsage> for heddle_types::TokenUsage {
    fn from(usage: WireUsage) -> Self {
        heddle_types::TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}
