//! Stage option sets: failure modes, normalizer options, and the two
//! predictor option variants.

use serde::{Deserialize, Serialize};

/// Per-stage policy governing whether that stage's own failure escalates
/// to an overall pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureMode {
    /// The stage's failure is absorbed; downstream proceeds with whatever
    /// partial output is available.
    Ignore,
    /// The stage's failure fails the whole pipeline run.
    Throw,
}

/// Which model an LLM-backed stage should call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier passed to the completion service (e.g. "gpt-4o").
    pub model_name: String,
}

/// Options for the text-normalization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    /// Whether a normalization failure fails the run.
    pub failure_mode: FailureMode,

    /// Instruction prepended to the input text when building the rewrite
    /// prompt.
    pub prompt: String,

    /// Model used for the rewrite call.
    pub llm_config: ModelConfig,
}

/// Options for the fine-tuned predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTunedOptions {
    /// Whether this predictor's failure fails the run.
    pub failure_mode: FailureMode,

    /// Name of the hosted inference endpoint to invoke.
    pub endpoint: String,
}

/// Options for the LLM predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmPredictorOptions {
    /// Whether this predictor's failure fails the run.
    pub failure_mode: FailureMode,

    /// Model used for the classification call.
    pub llm_config: ModelConfig,

    /// What is being classified, e.g. "intents" or "topics". Used both in
    /// the prompt and as the JSON key the model answers under.
    pub objective: String,

    /// One-line description of the input domain, e.g. "customer support
    /// emails". Interpolated into the prompt.
    pub input_description: String,

    /// Exclude from the candidate set any klass a prior predictor
    /// considered at all. Setting this (or `add_prior_selected_klasses`)
    /// makes this predictor await its priors.
    #[serde(default)]
    pub skip_prior_available_klasses: bool,

    /// Re-include any klass a prior predictor actually selected,
    /// overriding the skip rule for that id.
    #[serde(default)]
    pub add_prior_selected_klasses: bool,
}
