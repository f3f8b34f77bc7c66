//! Versioned pipeline configuration and request metadata.

use serde::{Deserialize, Serialize};

/// Sentinel version meaning "resolve to the latest version".
pub const LATEST_VERSION: i64 = -1;

/// A caller-supplied reference to a stored configuration.
///
/// `version` may be [`LATEST_VERSION`] to pick the most recent version of
/// the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRef {
    /// The configuration's id.
    pub id: String,

    /// The requested version, or [`LATEST_VERSION`].
    pub version: i64,
}

/// A resolved configuration identity: a concrete id + version pair.
///
/// Required to persist a run; ad-hoc overrides have no handle and their
/// results cannot be saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigHandle {
    /// The configuration's id.
    pub id: String,

    /// The concrete version the run executed against.
    pub version: i64,
}

/// One append-only version row of a pipeline configuration.
///
/// "Latest" is the row with the maximum `version_id` for a
/// `classifier_config_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigVersion {
    /// The configuration this version belongs to.
    pub classifier_config_id: String,

    /// Version number, monotonically increasing per configuration.
    pub version_id: i64,

    /// Stored normalizer id, if this version has a normalization stage.
    pub normalizer_id: Option<String>,

    /// Stored fine-tuned predictor id, if configured.
    pub ft_predictor_id: Option<String>,

    /// Stored LLM predictor id, if configured.
    pub llm_predictor_id: Option<String>,
}

/// Caller-supplied metadata attached to every persisted row of a run.
/// Opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Free-form tags for later filtering.
    #[serde(default)]
    pub tags: Vec<String>,

    /// The API key the request was authorized with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
}
