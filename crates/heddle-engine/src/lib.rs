//! Classification pipeline engine for heddle.
//!
//! The engine classifies input text into zero or more versioned klasses
//! through a configurable pipeline: an optional LLM-backed normalization
//! stage followed by up to two predictors (a hosted fine-tuned endpoint
//! and an LLM predictor) whose results are reconciled into one outcome
//! and persisted idempotently.
//!
//! # Architecture
//!
//! - [`store`] — collaborator traits (inputs, normalizations, predictors,
//!   klass versions, configurations, requests) plus an in-memory backend
//! - [`pipeline`] — the run itself: input materialization, normalization,
//!   klass resolution, predictor dispatch with prior-aware sequencing,
//!   composite reconciliation and persistence
//! - [`config`] — stored-configuration / override resolution
//! - [`engine`] — the caller-facing [`ClassifyEngine`]
//!
//! Predictors are dispatched concurrently; a predictor that declares a
//! data dependency on its priors awaits their shared futures, everything
//! else runs in parallel. The engine performs no retries anywhere: retry
//! policy belongs to the injected clients.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use heddle_engine::{ClassifyEngine, ClassifyOptions, Stores};
//! use heddle_engine::store::memory::MemoryStore;
//! use heddle_llm::HttpInferenceClient;
//! use heddle_types::{ClassifyInput, ConfigRef, LATEST_VERSION};
//!
//! let backend = Arc::new(MemoryStore::new());
//! let engine = ClassifyEngine::new(
//!     Stores::in_memory(backend),
//!     Arc::new(HttpInferenceClient::new("https://inference.example.com")),
//! );
//! let result = engine
//!     .classify(
//!         ClassifyInput::Text("my invoice is overdue".into()),
//!         ClassifyOptions::stored("classifier_1", ConfigRef {
//!             id: "config_1".into(),
//!             version: LATEST_VERSION,
//!         }),
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod engine;
pub mod pipeline;
pub mod store;

pub use config::PipelineOverride;
pub use engine::{
    Classification, ClassifyEngine, ClassifyOptions, SaveOptions, SelectedKlass,
    UNKNOWN_REQUEST_ID,
};
pub use pipeline::normalizer::NormalizerResponse;
pub use pipeline::predictor::{PredictorDetails, PredictorKlassDetails};
pub use store::Stores;
