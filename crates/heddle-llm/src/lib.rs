//! LLM completion and hosted-inference clients for heddle.
//!
//! This crate provides the two outbound call surfaces the classification
//! engine depends on:
//!
//! - [`CompletionClient`] — single-prompt LLM completions, implemented for
//!   any OpenAI-compatible endpoint by [`OpenAiCompatClient`]
//! - [`InferenceClient`] — hosted fine-tuned classifier invocations,
//!   implemented over HTTP by [`HttpInferenceClient`]
//!
//! Retries are deliberately out of scope: the engine treats one failed
//! call as one failed call, and retry policy belongs to wrappers around
//! these clients.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use heddle_llm::{default_target, OpenAiCompatClient, CompletionClient};
//! use heddle_types::ModelConfig;
//!
//! let client = OpenAiCompatClient::new(default_target());
//! let model = ModelConfig { model_name: "gpt-4o".into() };
//! let completion = client.complete(&model, "Say hello.").await?;
//! println!("{}", completion.text);
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod inference;
pub mod openai_compat;
pub mod types;

pub use completion::{Completion, CompletionClient};
pub use config::{default_target, LlmTarget, DEFAULT_TARGET_NAME};
pub use error::{ProviderError, Result};
pub use inference::{HttpInferenceClient, InferenceClient};
pub use openai_compat::OpenAiCompatClient;
pub use types::{ChatMessage, ChatRequest, ChatResponse, Choice, WireUsage};
