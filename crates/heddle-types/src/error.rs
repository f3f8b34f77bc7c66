//! Error types for the heddle classification engine.
//!
//! Provides [`ClassifyError`] as the top-level error type. Variants are
//! grouped into fatal (configuration, not-found) and recoverable
//! (predictor-local, persistence) categories: predictor-local failures are
//! absorbed into the owning prediction's status field, persistence failures
//! are best-effort on save, and everything else aborts the call.

use thiserror::Error;

/// The kind of referenced entity that could not be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A stored classification input text.
    Input,
    /// A stored normalizer definition.
    Normalizer,
    /// A stored predictor definition.
    Predictor,
    /// A klass version (id + version pair).
    Klass,
    /// A pipeline configuration (or configuration version).
    Configuration,
    /// A stored prediction request.
    Request,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Input => "input",
            EntityKind::Normalizer => "normalizer",
            EntityKind::Predictor => "predictor",
            EntityKind::Klass => "klass",
            EntityKind::Configuration => "configuration",
            EntityKind::Request => "request",
        };
        f.write_str(name)
    }
}

/// Top-level error type for the heddle engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClassifyError {
    // ── Fatal ────────────────────────────────────────────────────────

    /// The pipeline wiring is invalid or incomplete.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is wrong with the pipeline configuration.
        reason: String,
    },

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up.
        kind: EntityKind,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The whole classification run exceeded the caller-supplied deadline.
    #[error("classification timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    // ── Recoverable ──────────────────────────────────────────────────

    /// A sub-predictor's own execution failed.
    ///
    /// Recoverable per that predictor's failure mode; absorbed into the
    /// prediction status rather than propagated, except where a stage
    /// explicitly escalates.
    #[error("predictor failure: {reason}")]
    Predictor {
        /// What went wrong inside the predictor.
        reason: String,
    },

    /// A stage could not run because a dependency it needed failed.
    #[error("upstream dependency failed: {reason}")]
    Upstream {
        /// Which dependency failed and how.
        reason: String,
    },

    /// A persistence write failed.
    ///
    /// Best-effort on save: the computed classification result is still
    /// returned to the caller with a sentinel request id.
    #[error("persistence failure: {reason}")]
    Persistence {
        /// What the store reported.
        reason: String,
    },

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, ClassifyError>;
