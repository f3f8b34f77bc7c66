//! The classification engine: the caller-facing surface of one run.
//!
//! [`ClassifyEngine::classify`] resolves the configuration, runs the
//! pipeline (optionally under a whole-run deadline), assembles per-
//! predictor details, deduplicates the selected klasses, and performs the
//! best-effort save: if persistence fails, the computed result still
//! returns with a sentinel request id rather than failing the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use heddle_llm::{CompletionClient, InferenceClient};
use heddle_types::{
    ClassifyError, ClassifyInput, ConfigRef, PredictionStatus, RequestMetadata, Result,
};

use crate::config::{resolve_pipeline, PipelineOverride};
use crate::pipeline::normalizer::NormalizerResponse;
use crate::pipeline::predictor::PredictorDetails;
use crate::pipeline::run_pipeline;
use crate::store::Stores;

/// Sentinel request id returned when the run computed a result but the
/// persistence write failed.
pub const UNKNOWN_REQUEST_ID: &str = "UNKNOWN";

/// Persistence options for one call.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Metadata attached to every persisted row.
    pub metadata: RequestMetadata,
}

/// Options for one classification call.
#[derive(Clone)]
pub struct ClassifyOptions {
    /// The classifier the run belongs to.
    pub classifier_id: String,

    /// The completion client for LLM-backed stages. Required only when
    /// the resolved pipeline configures a normalizer or an LLM predictor.
    pub llm: Option<Arc<dyn CompletionClient>>,

    /// A stored configuration reference. Takes precedence over
    /// `overrides`.
    pub configuration: Option<ConfigRef>,

    /// An ad-hoc pipeline override. Results cannot be persisted.
    pub overrides: Option<PipelineOverride>,

    /// Persist the run. Requires a stored configuration.
    pub save: Option<SaveOptions>,

    /// Deadline for the whole run. On expiry the run is a total failure;
    /// nothing is persisted.
    pub timeout: Option<Duration>,
}

impl ClassifyOptions {
    /// Minimal options: classifier id plus a stored configuration.
    pub fn stored(classifier_id: impl Into<String>, configuration: ConfigRef) -> Self {
        Self {
            classifier_id: classifier_id.into(),
            llm: None,
            configuration: Some(configuration),
            overrides: None,
            save: None,
            timeout: None,
        }
    }
}

/// One deduplicated selected klass across all predictors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedKlass {
    /// Klass identifier.
    pub id: String,
    /// The highest version any predictor selected.
    pub latest_version: i64,
    /// The name attached to that highest version.
    pub latest_name: String,
    /// The maximum confidence across all selections of this id.
    pub overall_confidence: f64,
}

/// The result of one classification call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// The reconciled run status.
    pub status: PredictionStatus,
    /// Selected klasses, deduplicated by id.
    pub selected_klasses: Vec<SelectedKlass>,
    /// Per-predictor details.
    pub predictor_details: Vec<PredictorDetails>,
    /// The normalization stage's caller-facing view, when one ran.
    pub normalizer: Option<NormalizerResponse>,
    /// The persisted request id; [`UNKNOWN_REQUEST_ID`] when the save
    /// failed; `None` when saving was not requested.
    pub request_id: Option<String>,
    /// End-to-end latency of the run.
    pub latency_ms: u64,
}

/// The classification pipeline engine.
///
/// Holds the store handles and the inference client; the completion
/// client arrives per call since its target is a caller choice.
pub struct ClassifyEngine {
    stores: Stores,
    inference: Arc<dyn InferenceClient>,
}

impl ClassifyEngine {
    /// Build an engine over the given collaborators.
    pub fn new(stores: Stores, inference: Arc<dyn InferenceClient>) -> Self {
        Self { stores, inference }
    }

    /// Classify one input.
    pub async fn classify(
        &self,
        input: ClassifyInput,
        options: ClassifyOptions,
    ) -> Result<Classification> {
        let start = Instant::now();
        let (pipeline, config) = resolve_pipeline(
            &options.classifier_id,
            options.configuration.as_ref(),
            options.overrides.as_ref(),
            &*self.stores.configs,
        )
        .await?;
        debug!(
            classifier = %options.classifier_id,
            stored_config = config.is_some(),
            "resolved classification pipeline"
        );

        let llm_target_name = options.llm.as_ref().map(|llm| llm.name().to_string());
        let run_future = run_pipeline(
            &pipeline,
            options.llm.clone(),
            input,
            &self.stores,
            self.inference.clone(),
            start,
        );
        let run = match options.timeout {
            Some(deadline) => tokio::time::timeout(deadline, run_future)
                .await
                .map_err(|_| ClassifyError::Timeout {
                    timeout_ms: deadline.as_millis() as u64,
                })??,
            None => run_future.await?,
        };

        let predictor_details = run.outcome.details(&run.klasses).await?;
        let selected_klasses = dedupe_selected(&predictor_details);

        let request_id = match &options.save {
            Some(save) => {
                let config = config.as_ref().ok_or_else(|| ClassifyError::Configuration {
                    reason: "a stored configuration is required to save results".into(),
                })?;
                match run
                    .outcome
                    .save(
                        &pipeline,
                        &save.metadata,
                        &run.input,
                        run.normalization.as_deref(),
                        config,
                        llm_target_name.as_deref(),
                        Some(start),
                    )
                    .await
                {
                    Ok(id) => Some(id),
                    Err(err) => {
                        warn!(error = %err, "failed to persist classification result");
                        Some(UNKNOWN_REQUEST_ID.to_string())
                    }
                }
            }
            None => None,
        };

        let normalizer = match &run.normalization {
            Some(normalization) => Some(normalization.response().await),
            None => None,
        };

        Ok(Classification {
            status: run.outcome.status(),
            selected_klasses,
            predictor_details,
            normalizer,
            request_id,
            latency_ms: run.outcome.latency_ms(),
        })
    }
}

/// Deduplicate selected klasses across predictors: one entry per klass id,
/// keeping the highest version's name and the maximum confidence.
fn dedupe_selected(details: &[PredictorDetails]) -> Vec<SelectedKlass> {
    let mut selected: Vec<SelectedKlass> = Vec::new();
    for detail in details {
        for class in detail.classes.iter().filter(|class| class.selected) {
            if let Some(existing) = selected.iter_mut().find(|s| s.id == class.klass_id) {
                if class.klass_version >= existing.latest_version {
                    existing.latest_version = class.klass_version;
                    existing.latest_name = class.klass_name.clone();
                }
                if class.confidence > existing.overall_confidence {
                    existing.overall_confidence = class.confidence;
                }
            } else {
                selected.push(SelectedKlass {
                    id: class.klass_id.clone(),
                    latest_version: class.klass_version,
                    latest_name: class.klass_name.clone(),
                    overall_confidence: class.confidence,
                });
            }
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use heddle_types::{PredictorKind, PredictionStatus};

    use crate::pipeline::predictor::PredictorKlassDetails;

    fn detail(
        kind: PredictorKind,
        classes: Vec<PredictorKlassDetails>,
    ) -> PredictorDetails {
        PredictorDetails {
            predictor_id: "predictor".into(),
            kind,
            status: PredictionStatus::Pass,
            latency_ms: 1,
            classes,
            tokens_used: None,
            hallucinations: vec![],
            reasoning: None,
        }
    }

    fn class(
        id: &str,
        version: i64,
        name: &str,
        confidence: f64,
        selected: bool,
    ) -> PredictorKlassDetails {
        PredictorKlassDetails {
            klass_id: id.into(),
            klass_version: version,
            klass_name: name.into(),
            klass_description: String::new(),
            confidence,
            selected,
        }
    }

    #[test]
    fn dedupe_keeps_highest_version_name_and_max_confidence() {
        let details = vec![
            detail(
                PredictorKind::FineTuned,
                vec![class("x", 1, "x-v1", 0.7, true)],
            ),
            detail(PredictorKind::Llm, vec![class("x", 2, "x-v2", 1.0, true)]),
        ];
        let selected = dedupe_selected(&details);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].latest_version, 2);
        assert_eq!(selected[0].latest_name, "x-v2");
        assert!((selected[0].overall_confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dedupe_keeps_max_confidence_even_from_lower_version() {
        let details = vec![
            detail(
                PredictorKind::FineTuned,
                vec![class("x", 2, "x-v2", 0.6, true)],
            ),
            detail(PredictorKind::Llm, vec![class("x", 1, "x-v1", 1.0, true)]),
        ];
        let selected = dedupe_selected(&details);
        assert_eq!(selected.len(), 1);
        // Name stays with the highest version; confidence is the max.
        assert_eq!(selected[0].latest_name, "x-v2");
        assert!((selected[0].overall_confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dedupe_ignores_unselected_classes() {
        let details = vec![detail(
            PredictorKind::FineTuned,
            vec![
                class("x", 1, "x", 0.9, true),
                class("y", 1, "y", 0.95, false),
            ],
        )];
        let selected = dedupe_selected(&details);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "x");
    }

    #[test]
    fn dedupe_distinct_ids_stay_separate() {
        let details = vec![detail(
            PredictorKind::FineTuned,
            vec![class("x", 1, "x", 0.9, true), class("y", 1, "y", 0.8, true)],
        )];
        let selected = dedupe_selected(&details);
        assert_eq!(selected.len(), 2);
    }
}
