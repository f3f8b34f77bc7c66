//! Core types for the heddle classification pipeline engine.
//!
//! This crate holds the shared data model: versioned klasses, stage
//! options, prediction primitives, pipeline definitions, configuration
//! versioning, the error taxonomy, and prefixed id generation. It has no
//! engine logic and no I/O.

pub mod config;
pub mod error;
pub mod id;
pub mod klass;
pub mod options;
pub mod pipeline;
pub mod prediction;

pub use config::{ConfigHandle, ConfigRef, PipelineConfigVersion, RequestMetadata, LATEST_VERSION};
pub use error::{ClassifyError, EntityKind, Result};
pub use klass::{Klass, KlassDetails};
pub use options::{
    FailureMode, FineTunedOptions, LlmPredictorOptions, ModelConfig, NormalizerOptions,
};
pub use pipeline::{ClassifyInput, NormalizerSpec, PipelineDefinition, PredictorSpec};
pub use prediction::{
    Hallucination, KlassPrediction, LlmMeta, PredictionStatus, PredictorKind, TokenUsage,
};
