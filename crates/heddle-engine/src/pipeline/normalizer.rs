//! The normalization stage: LLM-driven text rewriting ahead of prediction.
//!
//! A run first tries the normalization cache keyed by `(input id,
//! normalizer id)`; on a miss it materializes the input text, builds the
//! rewrite prompt, and calls the completion service. A failed rewrite
//! takes one of two shapes depending on the normalizer's failure mode:
//! `IGNORE` yields a pass-through result that reads the raw input text
//! (not a pipeline failure), `THROW` yields a result with no readable text
//! at all, which downstream stages surface as an upstream failure.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use heddle_llm::CompletionClient;
use heddle_types::{
    id, ClassifyError, FailureMode, NormalizerOptions, NormalizerSpec, PipelineDefinition,
    PredictionStatus, RequestMetadata, Result, TokenUsage,
};

use super::input::Input;
use super::elapsed_ms;
use crate::store::{NormalizationRow, NormalizationStore, NormalizerStore};

/// The normalization stage of a pipeline.
pub struct Normalizer {
    id: Option<String>,
    options: OnceCell<Arc<NormalizerOptions>>,
    store: Arc<dyn NormalizerStore>,
    normalizations: Arc<dyn NormalizationStore>,
    completion: Arc<dyn CompletionClient>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    /// Build the stage from the pipeline definition, if one is configured.
    ///
    /// A configured normalizer without a completion client is a
    /// configuration error.
    pub fn from_pipeline(
        pipeline: &PipelineDefinition,
        completion: Option<Arc<dyn CompletionClient>>,
        store: Arc<dyn NormalizerStore>,
        normalizations: Arc<dyn NormalizationStore>,
    ) -> Result<Option<Self>> {
        let spec = match &pipeline.normalizer {
            Some(spec) => spec,
            None => return Ok(None),
        };
        let completion = completion.ok_or_else(|| ClassifyError::Configuration {
            reason: "an LLM completion client is required to use a normalizer".into(),
        })?;
        let normalizer = match spec {
            NormalizerSpec::ById { normalizer_id } => Self {
                id: Some(normalizer_id.clone()),
                options: OnceCell::new(),
                store,
                normalizations,
                completion,
            },
            NormalizerSpec::Inline { options } => Self {
                id: None,
                options: OnceCell::new_with(Some(Arc::new(options.clone()))),
                store,
                normalizations,
                completion,
            },
        };
        Ok(Some(normalizer))
    }

    async fn options(&self) -> Result<Arc<NormalizerOptions>> {
        let options = self
            .options
            .get_or_try_init(|| async {
                let id = self.id.as_deref().ok_or_else(|| ClassifyError::Configuration {
                    reason: "normalizer has neither an id nor inline options".into(),
                })?;
                let row = self.store.get(id).await?;
                Ok::<_, ClassifyError>(Arc::new(row.options))
            })
            .await?;
        Ok(options.clone())
    }

    /// Run normalization for the given input.
    pub async fn run(&self, input: &Arc<Input>) -> Result<NormalizationResult> {
        // Be as greedy as possible: a stored normalization of this exact
        // input by this exact normalizer short-circuits the rewrite call.
        if let (Some(input_id), Some(normalizer_id)) = (input.id(), self.id.as_deref()) {
            if let Some(row) = self
                .normalizations
                .find_by_input_and_normalizer(input_id, normalizer_id)
                .await?
            {
                debug!(normalization = %row.id, "normalization cache hit");
                return Ok(NormalizationResult::from_row(row, self.normalizations.clone()));
            }
        }

        let options = self.options().await?;
        let start = Instant::now();
        let text = match input.text().await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "input materialization failed during normalization");
                return Ok(NormalizationResult::failed(
                    elapsed_ms(start),
                    self.normalizations.clone(),
                ));
            }
        };

        let prompt = build_rewrite_prompt(&options.prompt, &text);
        match self.completion.complete(&options.llm_config, &prompt).await {
            Ok(completion) => Ok(NormalizationResult::fresh(
                completion.text,
                self.id.clone(),
                completion.usage,
                elapsed_ms(start),
                self.normalizations.clone(),
            )),
            Err(err) => {
                warn!(error = %err, "normalization call failed");
                match options.failure_mode {
                    FailureMode::Ignore => Ok(NormalizationResult::pass_through(
                        input.clone(),
                        "failed to normalize text",
                        elapsed_ms(start),
                        self.normalizations.clone(),
                    )),
                    FailureMode::Throw => Ok(NormalizationResult::failed(
                        elapsed_ms(start),
                        self.normalizations.clone(),
                    )),
                }
            }
        }
    }
}

fn build_rewrite_prompt(instruction: &str, text: &str) -> String {
    format!("{instruction}\nINPUT:\n```\n{text}\n```\n\nOUTPUT:")
}

// ── Result ──────────────────────────────────────────────────────────────

enum State {
    /// Freshly computed this run; gets an id only if saved.
    Fresh {
        text: String,
        normalizer_id: Option<String>,
        usage: Option<TokenUsage>,
        latency_ms: u64,
    },
    /// Loaded from the normalization cache.
    Stored { row: NormalizationRow },
    /// Normalization failed with `IGNORE`: downstream reads the raw input.
    PassThrough {
        input: Arc<Input>,
        error: String,
        latency_ms: u64,
    },
    /// Normalization failed with `THROW`: no text is readable.
    Failed { latency_ms: u64 },
}

/// The outcome of the normalization stage.
pub struct NormalizationResult {
    state: State,
    saved: OnceCell<(String, String)>,
    normalizations: Arc<dyn NormalizationStore>,
}

/// What the caller sees of the normalization stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerResponse {
    /// `PASS` when text is readable, `FAIL` otherwise.
    pub status: PredictionStatus,
    /// The text downstream stages consumed, when readable.
    pub text: Option<String>,
    /// How long the stage took.
    pub latency_ms: u64,
    /// Total tokens used by the rewrite call, when reported.
    pub tokens_used: Option<u32>,
}

impl NormalizationResult {
    fn fresh(
        text: String,
        normalizer_id: Option<String>,
        usage: Option<TokenUsage>,
        latency_ms: u64,
        normalizations: Arc<dyn NormalizationStore>,
    ) -> Self {
        Self {
            state: State::Fresh {
                text,
                normalizer_id,
                usage,
                latency_ms,
            },
            saved: OnceCell::new(),
            normalizations,
        }
    }

    fn from_row(row: NormalizationRow, normalizations: Arc<dyn NormalizationStore>) -> Self {
        Self {
            state: State::Stored { row },
            saved: OnceCell::new(),
            normalizations,
        }
    }

    fn pass_through(
        input: Arc<Input>,
        error: &str,
        latency_ms: u64,
        normalizations: Arc<dyn NormalizationStore>,
    ) -> Self {
        Self {
            state: State::PassThrough {
                input,
                error: error.into(),
                latency_ms,
            },
            saved: OnceCell::new(),
            normalizations,
        }
    }

    fn failed(latency_ms: u64, normalizations: Arc<dyn NormalizationStore>) -> Self {
        Self {
            state: State::Failed { latency_ms },
            saved: OnceCell::new(),
            normalizations,
        }
    }

    /// The stored normalization id, if this result has been persisted (or
    /// was loaded from the cache).
    pub fn normalized_id(&self) -> Option<String> {
        match &self.state {
            State::Stored { row } => Some(row.id.clone()),
            State::Fresh { .. } => self.saved.get().map(|(_, id)| id.clone()),
            _ => None,
        }
    }

    /// The text downstream stages should consume.
    pub async fn text(&self) -> Result<String> {
        match &self.state {
            State::Fresh { text, .. } => Ok(text.clone()),
            State::Stored { row } => Ok(row.normalized_text.clone()),
            State::PassThrough { input, .. } => input.text().await,
            State::Failed { .. } => Err(ClassifyError::Upstream {
                reason: "text normalization did not produce output".into(),
            }),
        }
    }

    /// The pass-through error message, if normalization failed with
    /// `IGNORE`.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            State::PassThrough { error, .. } => Some(error),
            _ => None,
        }
    }

    /// How long the stage took.
    pub fn latency_ms(&self) -> u64 {
        match &self.state {
            State::Fresh { latency_ms, .. }
            | State::PassThrough { latency_ms, .. }
            | State::Failed { latency_ms } => *latency_ms,
            State::Stored { row } => row.latency_ms,
        }
    }

    fn usage(&self) -> Option<TokenUsage> {
        match &self.state {
            State::Fresh { usage, .. } => *usage,
            State::Stored { row } => row.llm_usage,
            _ => None,
        }
    }

    /// Persist the normalization (persisting the input first if needed).
    /// Idempotent: a cached or already-saved result returns its id with no
    /// write. A pass-through or failed result is not persistable.
    pub async fn save(
        &self,
        pipeline: &PipelineDefinition,
        metadata: &RequestMetadata,
        input: &Input,
    ) -> Result<String> {
        match &self.state {
            State::Stored { row } => Ok(row.id.clone()),
            State::Fresh {
                text,
                normalizer_id,
                usage,
                latency_ms,
            } => {
                let (_, normalization_id) = self
                    .saved
                    .get_or_try_init(|| async {
                        let normalizer_id = normalizer_id.clone().ok_or_else(|| {
                            ClassifyError::Persistence {
                                reason:
                                    "cannot persist a normalization produced by an inline normalizer"
                                        .into(),
                            }
                        })?;
                        let input_id = input.persist(pipeline, metadata).await?;
                        let normalization_id = id::generate("input_normalized");
                        self.normalizations
                            .create(NormalizationRow {
                                id: normalization_id.clone(),
                                input_text_id: input_id.clone(),
                                normalizer_id,
                                classifier_id: pipeline.classifier_id.clone(),
                                normalized_text: text.clone(),
                                latency_ms: *latency_ms,
                                llm_usage: *usage,
                                request_metadata: metadata.clone(),
                                created_at: Utc::now(),
                            })
                            .await?;
                        Ok::<_, ClassifyError>((input_id, normalization_id))
                    })
                    .await?;
                Ok(normalization_id.clone())
            }
            State::PassThrough { .. } | State::Failed { .. } => Err(ClassifyError::Persistence {
                reason: "normalization result is not persistable".into(),
            }),
        }
    }

    /// The caller-facing view of this result.
    pub async fn response(&self) -> NormalizerResponse {
        let text = self.text().await.ok();
        NormalizerResponse {
            status: if text.is_some() {
                PredictionStatus::Pass
            } else {
                PredictionStatus::Fail
            },
            tokens_used: self.usage().map(|usage| usage.total_tokens),
            latency_ms: self.latency_ms(),
            text,
        }
    }
}
