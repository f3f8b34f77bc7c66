//! The composite predictor: dispatch, reconciliation, caching, and
//! persistence for one classification run.
//!
//! Dispatch is concurrent by default: every predictor's run starts
//! immediately, receiving the shared futures of earlier-dispatched
//! predictors as priors. Sequencing is opt-in through each predictor's own
//! prior-awaiting logic, so dispatch order only matters insofar as it
//! decides what appears in a later predictor's prior list.
//!
//! Reconciliation: the composite is `FAIL` iff any sub-result is
//! `FAIL_PARENT`, or is `FAIL` with a `THROW` failure mode. A `FAIL` under
//! `IGNORE` keeps its empty/partial predictions and does not fail the run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::Utc;
use futures_util::future::{join_all, FutureExt};
use tokio::sync::OnceCell;
use tracing::debug;

use heddle_llm::{CompletionClient, InferenceClient};
use heddle_types::{
    id, ClassifyError, ConfigHandle, EntityKind, FailureMode, PipelineDefinition,
    PredictionStatus, RequestMetadata, Result,
};

use super::elapsed_ms;
use super::fine_tuned::FineTunedPredictor;
use super::input::Input;
use super::klass::KlassResolver;
use super::llm::LlmPredictor;
use super::normalizer::NormalizationResult;
use super::predictor::{PredictionOutcome, Predictor, PredictorDetails, PriorFuture};
use crate::store::{RequestRow, RequestStore, Stores};

/// The ordered set of predictors for one run.
pub struct CompositePredictor {
    predictors: Vec<Arc<dyn Predictor>>,
    requests: Arc<dyn RequestStore>,
}

impl std::fmt::Debug for CompositePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositePredictor")
            .field("predictors", &self.predictors.len())
            .finish_non_exhaustive()
    }
}

impl CompositePredictor {
    /// Build the composite from the pipeline definition. Fails if the
    /// pipeline configures no predictor at all.
    pub fn from_pipeline(
        pipeline: &PipelineDefinition,
        completion: Option<Arc<dyn CompletionClient>>,
        stores: &Stores,
        inference: Arc<dyn InferenceClient>,
    ) -> Result<Self> {
        let mut predictors: Vec<Arc<dyn Predictor>> = Vec::new();
        if let Some(fine_tuned) =
            FineTunedPredictor::from_pipeline(pipeline, stores.predictors.clone(), inference)
        {
            predictors.push(fine_tuned);
        }
        if let Some(llm) = LlmPredictor::from_pipeline(pipeline, completion, stores.predictors.clone())? {
            predictors.push(llm);
        }
        if predictors.is_empty() {
            return Err(ClassifyError::Configuration {
                reason: "pipeline must configure at least one predictor".into(),
            });
        }
        Ok(Self {
            predictors,
            requests: stores.requests.clone(),
        })
    }

    /// A composite over explicit predictors (used by tests).
    pub fn new(predictors: Vec<Arc<dyn Predictor>>, requests: Arc<dyn RequestStore>) -> Result<Self> {
        if predictors.is_empty() {
            return Err(ClassifyError::Configuration {
                reason: "pipeline must configure at least one predictor".into(),
            });
        }
        Ok(Self {
            predictors,
            requests,
        })
    }

    /// Run every predictor and reconcile the results, short-circuiting on
    /// a stored result for the same `(input, normalized input, predictor
    /// set)` key.
    pub async fn run(
        &self,
        input: &Arc<Input>,
        normalized: Option<&Arc<NormalizationResult>>,
        klasses: &Arc<KlassResolver>,
        start: Instant,
    ) -> Result<CompositeOutcome> {
        if let Some(cached) = self.load_from_cache(input, normalized).await? {
            return Ok(cached);
        }

        // Dispatch everything immediately; predictor N+1 receives the
        // shared futures of predictors 1..N as priors and decides itself
        // whether to await them.
        let mut priors: Vec<PriorFuture> = Vec::with_capacity(self.predictors.len());
        for predictor in &self.predictors {
            let predictor = Arc::clone(predictor);
            let input = Arc::clone(input);
            let normalized = normalized.cloned();
            let klasses = Arc::clone(klasses);
            let earlier = priors.clone();
            let future: PriorFuture = async move {
                predictor.run(input, normalized, klasses, earlier).await
            }
            .boxed()
            .shared();
            priors.push(future);
        }
        let results = join_all(priors).await;
        let latency_ms = elapsed_ms(start);

        let mut should_fail = false;
        for (predictor, outcome) in self.predictors.iter().zip(&results) {
            let failed = match outcome.status {
                PredictionStatus::Pass => false,
                PredictionStatus::FailParent => true,
                PredictionStatus::Fail => {
                    predictor.failure_mode().await? == FailureMode::Throw
                }
            };
            if failed {
                should_fail = true;
            }
        }
        let status = if should_fail {
            PredictionStatus::Fail
        } else {
            PredictionStatus::Pass
        };

        Ok(CompositeOutcome::computed(
            status,
            latency_ms,
            results,
            self.requests.clone(),
        ))
    }

    async fn load_from_cache(
        &self,
        input: &Arc<Input>,
        normalized: Option<&Arc<NormalizationResult>>,
    ) -> Result<Option<CompositeOutcome>> {
        // The cache key requires stable identities on every axis.
        let input_id = match input.id() {
            Some(id) => id.to_string(),
            None => return Ok(None),
        };
        let normalized_id = match normalized {
            None => None,
            Some(normalized) => match normalized.normalized_id() {
                Some(id) => Some(id),
                None => return Ok(None),
            },
        };
        let mut predictor_ids = Vec::with_capacity(self.predictors.len());
        for predictor in &self.predictors {
            match predictor.id() {
                Some(id) => predictor_ids.push(id.to_string()),
                None => return Ok(None),
            }
        }

        let row = match self
            .requests
            .find_cached(&input_id, normalized_id.as_deref(), &predictor_ids)
            .await?
        {
            Some(row) => row,
            None => return Ok(None),
        };
        debug!(request = %row.id, "composite cache hit");

        let mut results = Vec::with_capacity(row.predictions.len());
        for prediction in &row.predictions {
            let predictor = self
                .predictors
                .iter()
                .find(|p| p.id() == Some(prediction.predictor_id.as_str()))
                .ok_or_else(|| ClassifyError::NotFound {
                    kind: EntityKind::Predictor,
                    id: prediction.predictor_id.clone(),
                })?;
            if predictor.kind() != prediction.kind {
                return Err(ClassifyError::Configuration {
                    reason: format!(
                        "stored prediction '{}' does not match the kind of predictor '{}'",
                        prediction.id, prediction.predictor_id
                    ),
                });
            }
            results.push(Arc::new(PredictionOutcome::from_row(prediction.clone())));
        }

        Ok(Some(CompositeOutcome::rehydrated(
            row,
            results,
            self.requests.clone(),
        )))
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────

/// The merged outcome of one composite run.
pub struct CompositeOutcome {
    id: OnceLock<String>,
    status: PredictionStatus,
    latency_ms: AtomicU64,
    results: Vec<Arc<PredictionOutcome>>,
    persisted: OnceCell<String>,
    requests: Arc<dyn RequestStore>,
}

impl CompositeOutcome {
    fn computed(
        status: PredictionStatus,
        latency_ms: u64,
        results: Vec<Arc<PredictionOutcome>>,
        requests: Arc<dyn RequestStore>,
    ) -> Self {
        Self {
            id: OnceLock::new(),
            status,
            latency_ms: AtomicU64::new(latency_ms),
            results,
            persisted: OnceCell::new(),
            requests,
        }
    }

    fn rehydrated(
        row: RequestRow,
        results: Vec<Arc<PredictionOutcome>>,
        requests: Arc<dyn RequestStore>,
    ) -> Self {
        let id = OnceLock::new();
        let _ = id.set(row.id.clone());
        Self {
            id,
            status: row.status,
            latency_ms: AtomicU64::new(row.latency_ms),
            results,
            persisted: OnceCell::new_with(Some(row.id)),
            requests,
        }
    }

    /// The reconciled status.
    pub fn status(&self) -> PredictionStatus {
        self.status
    }

    /// End-to-end latency of the run.
    pub fn latency_ms(&self) -> u64 {
        self.latency_ms.load(Ordering::Relaxed)
    }

    /// The per-predictor results, in dispatch order.
    pub fn results(&self) -> &[Arc<PredictionOutcome>] {
        &self.results
    }

    /// The outcome's id, generated on first access and stable thereafter.
    pub fn id(&self) -> &str {
        self.id.get_or_init(|| id::generate("prediction"))
    }

    /// Caller-facing details for every sub-result.
    pub async fn details(&self, klasses: &KlassResolver) -> Result<Vec<PredictorDetails>> {
        let mut details = Vec::with_capacity(self.results.len());
        for result in &self.results {
            details.push(result.details(klasses).await?);
        }
        Ok(details)
    }

    /// Persist the whole run: the input, the normalization (if any), then
    /// the request row with one child row per sub-result, atomically.
    /// Idempotent: a second call performs no write and returns the same
    /// id. `start` recomputes the stored latency against the original
    /// request start.
    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        pipeline: &PipelineDefinition,
        metadata: &RequestMetadata,
        input: &Input,
        normalization: Option<&NormalizationResult>,
        config: &ConfigHandle,
        llm_target_name: Option<&str>,
        start: Option<Instant>,
    ) -> Result<String> {
        let id = self
            .persisted
            .get_or_try_init(|| async {
                let mut predictor_ids = Vec::with_capacity(self.results.len());
                let mut prediction_rows = Vec::with_capacity(self.results.len());
                for result in &self.results {
                    let row = result.to_row()?;
                    predictor_ids.push(row.predictor_id.clone());
                    prediction_rows.push(row);
                }

                let input_id = input.persist(pipeline, metadata).await?;
                let normalized_id = match normalization {
                    Some(normalization) => {
                        Some(normalization.save(pipeline, metadata, input).await?)
                    }
                    None => None,
                };

                if let Some(start) = start {
                    self.latency_ms.store(elapsed_ms(start), Ordering::Relaxed);
                }

                let id = self.id().to_string();
                self.requests
                    .create(RequestRow {
                        id: id.clone(),
                        classifier_id: pipeline.classifier_id.clone(),
                        classifier_config_id: config.id.clone(),
                        classifier_config_version_id: config.version,
                        input_text_id: input_id,
                        normalized_input_text_id: normalized_id,
                        predictor_ids,
                        status: self.status,
                        llm_target_name: llm_target_name.map(str::to_string),
                        latency_ms: self.latency_ms(),
                        request_metadata: metadata.clone(),
                        predictions: prediction_rows,
                        created_at: Utc::now(),
                    })
                    .await?;
                debug!(request = %id, "persisted classification request");
                Ok::<_, ClassifyError>(id)
            })
            .await?;
        Ok(id.clone())
    }
}
