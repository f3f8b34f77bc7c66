//! The resolved pipeline definition and its building blocks.
//!
//! A [`PipelineDefinition`] is produced by the configuration resolver and
//! consumed by the pipeline parts. Normalizer and predictor stages come in
//! two flavors: referenced by stored id (the stage lazy-loads its own
//! option body) or inlined by the caller as an ad-hoc override.

use serde::{Deserialize, Serialize};

use crate::klass::{Klass, KlassDetails};
use crate::options::{FineTunedOptions, LlmPredictorOptions, NormalizerOptions};

/// The text to classify: inline, or a reference to a stored input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyInput {
    /// Inline text, persisted (and assigned an id) only if the run is
    /// saved.
    Text(String),
    /// Reference to a previously stored input; the text is materialized
    /// lazily.
    InputId(String),
}

/// A normalizer stage, by stored id or inlined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizerSpec {
    /// Reference to a stored normalizer definition.
    ById {
        /// The stored normalizer's id.
        normalizer_id: String,
    },
    /// Ad-hoc options supplied by the caller. Results produced through an
    /// inline normalizer cannot be persisted.
    Inline {
        /// The normalizer options.
        options: NormalizerOptions,
    },
}

/// A predictor stage, by stored id or inlined.
///
/// `O` is the option variant: [`FineTunedOptions`] or
/// [`LlmPredictorOptions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorSpec<O> {
    /// Reference to a stored predictor definition.
    ById {
        /// The stored predictor's id.
        predictor_id: String,
    },
    /// Ad-hoc definition supplied by the caller. Results produced through
    /// an inline predictor cannot be persisted.
    Inline {
        /// The predictor options.
        options: O,
        /// The klass versions this predictor scores, in endpoint order.
        supported_klasses: Vec<Klass>,
        /// Klass ids that are never marked selected, whatever the score.
        blacklisted_klass_ids: Vec<String>,
    },
}

impl<O> PredictorSpec<O> {
    /// The stored predictor id, if this spec is a reference.
    pub fn predictor_id(&self) -> Option<&str> {
        match self {
            PredictorSpec::ById { predictor_id } => Some(predictor_id),
            PredictorSpec::Inline { .. } => None,
        }
    }
}

/// A fully resolved pipeline: which stages run, and the klass list the
/// run was configured with.
///
/// At least one predictor must be present for the pipeline to be
/// runnable; the composite predictor enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The classifier this pipeline belongs to.
    pub classifier_id: String,

    /// Optional normalization stage.
    pub normalizer: Option<NormalizerSpec>,

    /// Optional fine-tuned predictor stage.
    pub fine_tuned_predictor: Option<PredictorSpec<FineTunedOptions>>,

    /// Optional LLM predictor stage.
    pub llm_predictor: Option<PredictorSpec<LlmPredictorOptions>>,

    /// Klass details known up front (seeded into the per-run klass cache).
    /// Empty for stored configurations, whose details lazy-load through
    /// the klass store.
    pub klass_list: Vec<KlassDetails>,
}
