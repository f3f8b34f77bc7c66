//! Collaborator store traits and their row types.
//!
//! The engine consumes storage through these traits and never owns a
//! connection itself: callers inject implementations via [`Stores`]. The
//! in-memory implementation in [`memory`] backs the test suites and small
//! embedded deployments.
//!
//! From the engine's perspective every store is read-only except for the
//! persistence writes performed during `save`, and
//! [`RequestStore::create`] must be atomic: either the request row and all
//! of its child prediction rows land, or none do.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use heddle_types::{
    FineTunedOptions, Hallucination, Klass, KlassDetails, KlassPrediction, LlmMeta,
    LlmPredictorOptions, NormalizerOptions, PipelineConfigVersion, PredictionStatus,
    PredictorKind, RequestMetadata, Result,
};

// ── Row types ───────────────────────────────────────────────────────────

/// A stored classification input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRow {
    /// The input's id.
    pub id: String,
    /// The classifier the input was submitted to.
    pub classifier_id: String,
    /// The raw input text.
    pub text: String,
    /// Caller metadata recorded at persistence time.
    pub request_metadata: RequestMetadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A stored normalization of one input by one normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRow {
    /// The normalization's id.
    pub id: String,
    /// The input that was normalized.
    pub input_text_id: String,
    /// The normalizer that produced it.
    pub normalizer_id: String,
    /// The classifier the run belonged to.
    pub classifier_id: String,
    /// The rewritten text.
    pub normalized_text: String,
    /// How long the rewrite call took.
    pub latency_ms: u64,
    /// Token usage of the rewrite call, when reported.
    pub llm_usage: Option<heddle_types::TokenUsage>,
    /// Caller metadata recorded at persistence time.
    pub request_metadata: RequestMetadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A stored normalizer definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerRow {
    /// The normalizer's id.
    pub id: String,
    /// Its options.
    pub options: NormalizerOptions,
}

/// The option body of a stored predictor, by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorOptions {
    /// A fine-tuned inference predictor.
    FineTuned(FineTunedOptions),
    /// An LLM predictor.
    Llm(LlmPredictorOptions),
}

impl PredictorOptions {
    /// The predictor kind this option body belongs to.
    pub fn kind(&self) -> PredictorKind {
        match self {
            PredictorOptions::FineTuned(_) => PredictorKind::FineTuned,
            PredictorOptions::Llm(_) => PredictorKind::Llm,
        }
    }
}

/// A stored predictor definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorRow {
    /// The predictor's id.
    pub id: String,
    /// The option body (also determines the kind).
    pub options: PredictorOptions,
    /// The klass versions this predictor scores, in endpoint order.
    pub supported_klasses: Vec<Klass>,
    /// Klass ids never marked selected.
    pub blacklisted_klass_ids: Vec<String>,
}

/// One persisted sub-predictor result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    /// The prediction's id.
    pub id: String,
    /// The predictor that produced it.
    pub predictor_id: String,
    /// The predictor's kind.
    pub kind: PredictorKind,
    /// The prediction status.
    pub status: PredictionStatus,
    /// Per-klass scores.
    pub predictions: Vec<KlassPrediction>,
    /// Hallucinated class names (LLM predictors only).
    pub hallucinations: Vec<Hallucination>,
    /// How long the predictor's own work took.
    pub latency_ms: u64,
    /// LLM call metadata (LLM predictors only). Opaque payload.
    pub llm_meta: Option<LlmMeta>,
}

/// One persisted classification request with its child predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRow {
    /// The request's id.
    pub id: String,
    /// The classifier the request ran against.
    pub classifier_id: String,
    /// The configuration the run executed with.
    pub classifier_config_id: String,
    /// The concrete configuration version.
    pub classifier_config_version_id: i64,
    /// The input text id.
    pub input_text_id: String,
    /// The normalized input text id, when a normalizer ran.
    pub normalized_input_text_id: Option<String>,
    /// The stored predictor ids that produced the child predictions.
    pub predictor_ids: Vec<String>,
    /// The reconciled composite status.
    pub status: PredictionStatus,
    /// The completion target name used, if any.
    pub llm_target_name: Option<String>,
    /// End-to-end latency of the run.
    pub latency_ms: u64,
    /// Caller metadata.
    pub request_metadata: RequestMetadata,
    /// Child predictions, one per sub-predictor.
    pub predictions: Vec<PredictionRow>,
    /// Creation timestamp; drives "most recent" cache selection.
    pub created_at: DateTime<Utc>,
}

// ── Store traits ────────────────────────────────────────────────────────

/// Stored classification inputs.
#[async_trait]
pub trait InputStore: Send + Sync {
    /// Fetch an input by id. Fails with `NotFound` if absent.
    async fn get(&self, id: &str) -> Result<InputRow>;

    /// Persist a new input row.
    async fn create(&self, row: InputRow) -> Result<()>;
}

/// Stored normalizations, keyed by `(input id, normalizer id)`.
#[async_trait]
pub trait NormalizationStore: Send + Sync {
    /// Look up a prior normalization of `input_text_id` by `normalizer_id`.
    async fn find_by_input_and_normalizer(
        &self,
        input_text_id: &str,
        normalizer_id: &str,
    ) -> Result<Option<NormalizationRow>>;

    /// Persist a new normalization row.
    async fn create(&self, row: NormalizationRow) -> Result<()>;
}

/// Stored normalizer definitions.
#[async_trait]
pub trait NormalizerStore: Send + Sync {
    /// Fetch a normalizer by id. Fails with `NotFound` if absent.
    async fn get(&self, id: &str) -> Result<NormalizerRow>;
}

/// Stored predictor definitions.
#[async_trait]
pub trait PredictorStore: Send + Sync {
    /// Fetch a predictor by id. Fails with `NotFound` if absent.
    async fn get(&self, id: &str) -> Result<PredictorRow>;
}

/// The klass-version store: bulk fetch by `(id, version)` pairs.
#[async_trait]
pub trait KlassStore: Send + Sync {
    /// Fetch the details for every requested pair that exists. Missing
    /// pairs are simply absent from the result; completeness checking is
    /// the resolver's job.
    async fn fetch_many(&self, keys: &[Klass]) -> Result<Vec<KlassDetails>>;
}

/// The versioned pipeline-configuration store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The most recent version for a configuration id. Fails with
    /// `NotFound` if the configuration has no versions.
    async fn latest(&self, config_id: &str) -> Result<PipelineConfigVersion>;

    /// A specific version of a configuration. Fails with `NotFound` if
    /// absent.
    async fn at_version(&self, config_id: &str, version: i64) -> Result<PipelineConfigVersion>;
}

/// Persisted classification requests (the content-addressed result cache).
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// The most recent stored request matching `(input id, normalized
    /// input id, exact predictor-id set)`, if any.
    async fn find_cached(
        &self,
        input_text_id: &str,
        normalized_input_text_id: Option<&str>,
        predictor_ids: &[String],
    ) -> Result<Option<RequestRow>>;

    /// Persist a request row and all of its child predictions atomically.
    async fn create(&self, row: RequestRow) -> Result<()>;
}

// ── Handle bundle ───────────────────────────────────────────────────────

/// The set of store handles the engine runs against.
#[derive(Clone)]
pub struct Stores {
    /// Stored inputs.
    pub inputs: Arc<dyn InputStore>,
    /// Stored normalizations.
    pub normalizations: Arc<dyn NormalizationStore>,
    /// Stored normalizer definitions.
    pub normalizers: Arc<dyn NormalizerStore>,
    /// Stored predictor definitions.
    pub predictors: Arc<dyn PredictorStore>,
    /// The klass-version store.
    pub klasses: Arc<dyn KlassStore>,
    /// The pipeline-configuration store.
    pub configs: Arc<dyn ConfigStore>,
    /// Persisted requests.
    pub requests: Arc<dyn RequestStore>,
}

impl Stores {
    /// Wire every store to one shared in-memory backend.
    pub fn in_memory(backend: Arc<memory::MemoryStore>) -> Self {
        Self {
            inputs: backend.clone(),
            normalizations: backend.clone(),
            normalizers: backend.clone(),
            predictors: backend.clone(),
            klasses: backend.clone(),
            configs: backend.clone(),
            requests: backend,
        }
    }
}
