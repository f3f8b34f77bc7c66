//! Prediction result primitives shared by all predictors.

use serde::{Deserialize, Serialize};

/// Outcome status of a prediction (or of a whole composite run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictionStatus {
    /// The work completed.
    Pass,
    /// The stage's own work failed (e.g. the model call errored).
    Fail,
    /// The stage could not even attempt work because an upstream
    /// dependency it needed failed.
    FailParent,
}

/// The kind of predictor that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictorKind {
    /// Fine-tuned inference endpoint.
    #[serde(rename = "FT")]
    FineTuned,
    /// LLM completion based predictor.
    #[serde(rename = "LLM")]
    Llm,
}

impl std::fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictorKind::FineTuned => f.write_str("FT"),
            PredictorKind::Llm => f.write_str("LLM"),
        }
    }
}

/// One klass's score within a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlassPrediction {
    /// Klass identifier.
    pub id: String,

    /// Klass version the predictor scored against.
    pub version: i64,

    /// Score in \[0.0, 1.0\]. Calibrated for the fine-tuned predictor;
    /// binary 0/1 for the LLM predictor, which has no calibration signal.
    pub confidence: f64,

    /// Whether the predictor selected this klass.
    pub selected: bool,
}

/// A class name the LLM returned that matches no candidate klass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hallucination {
    /// The invented name, verbatim.
    pub klass_name: String,
}

/// Token usage for one LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Prompt + completion.
    pub total_tokens: u32,
}

/// Metadata captured from an LLM classification call and persisted with
/// the prediction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LlmMeta {
    /// The model's REASONING output.
    pub reasoning: String,

    /// The model's CLUES output.
    pub clues: String,

    /// Token usage, when the provider reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}
