//! The predictor capability and the shared prediction outcome type.
//!
//! The composite predictor operates only on [`Predictor`], never on the
//! concrete fine-tuned / LLM types. Dispatched runs are exposed to
//! later-dispatched predictors as [`PriorFuture`]s — cloneable shared
//! futures that form a lightweight dependency graph: a predictor that
//! reads its priors awaits them, one that does not runs fully
//! concurrently.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};

use heddle_types::{
    id, ClassifyError, FailureMode, Hallucination, Klass, KlassPrediction, LlmMeta,
    PredictionStatus, PredictorKind, Result,
};

use super::input::Input;
use super::klass::KlassResolver;
use super::normalizer::NormalizationResult;
use crate::store::PredictionRow;

/// A dispatched predictor run, shared with later-dispatched predictors.
pub type PriorFuture = Shared<BoxFuture<'static, Arc<PredictionOutcome>>>;

/// Options resolved for one predictor: the kind-specific option body plus
/// the klass wiring.
pub struct ResolvedOptions<O> {
    /// Kind-specific options.
    pub options: O,
    /// The klass versions this predictor scores, in endpoint order.
    pub supported_klasses: Vec<Klass>,
    /// Klass ids never marked selected.
    pub blacklisted_klass_ids: Vec<String>,
}

impl<O> ResolvedOptions<O> {
    /// Whether the given klass id is blacklisted.
    pub fn is_blacklisted(&self, klass_id: &str) -> bool {
        self.blacklisted_klass_ids.iter().any(|id| id == klass_id)
    }
}

/// A predictor stage. Failures are absorbed into the returned outcome's
/// status, never raised: `FAIL` when the predictor's own work failed,
/// `FAIL_PARENT` when something upstream it depended on failed.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// The stored predictor id, or `None` for an inline override.
    fn id(&self) -> Option<&str>;

    /// The predictor kind.
    fn kind(&self) -> PredictorKind;

    /// This predictor's configured failure mode, resolving options if
    /// needed. Drives composite reconciliation.
    async fn failure_mode(&self) -> Result<FailureMode>;

    /// Run the predictor. `priors` are the not-yet-awaited runs of
    /// predictors dispatched earlier in the same composite iteration.
    async fn run(
        &self,
        input: Arc<Input>,
        normalized: Option<Arc<NormalizationResult>>,
        klasses: Arc<KlassResolver>,
        priors: Vec<PriorFuture>,
    ) -> Arc<PredictionOutcome>;
}

// ── Outcome ─────────────────────────────────────────────────────────────

/// The immutable result of one predictor run.
///
/// The id is assigned lazily the first time persistence (or any other
/// id-dependent consumer) asks for it, and is stable thereafter.
pub struct PredictionOutcome {
    id: OnceLock<String>,
    predictor_id: Option<String>,
    kind: PredictorKind,
    /// The prediction status.
    pub status: PredictionStatus,
    /// Per-klass scores over the candidate set.
    pub predictions: Vec<KlassPrediction>,
    /// Hallucinated class names (LLM predictors only).
    pub hallucinations: Vec<Hallucination>,
    /// How long the predictor's own work took; `0` for `FAIL_PARENT`.
    pub latency_ms: u64,
    /// LLM call metadata (LLM predictors only).
    pub llm_meta: Option<LlmMeta>,
}

impl PredictionOutcome {
    /// An outcome for a predictor whose own work ran (or failed running).
    pub fn completed(
        predictor_id: Option<String>,
        kind: PredictorKind,
        status: PredictionStatus,
        predictions: Vec<KlassPrediction>,
        hallucinations: Vec<Hallucination>,
        latency_ms: u64,
        llm_meta: Option<LlmMeta>,
    ) -> Self {
        Self {
            id: OnceLock::new(),
            predictor_id,
            kind,
            status,
            predictions,
            hallucinations,
            latency_ms,
            llm_meta,
        }
    }

    /// An outcome for a predictor that could not even attempt work.
    pub fn fail_parent(predictor_id: Option<String>, kind: PredictorKind) -> Self {
        Self::completed(
            predictor_id,
            kind,
            PredictionStatus::FailParent,
            Vec::new(),
            Vec::new(),
            0,
            None,
        )
    }

    /// Rehydrate a persisted prediction, keeping its stored id.
    pub fn from_row(row: PredictionRow) -> Self {
        let id = OnceLock::new();
        let _ = id.set(row.id);
        Self {
            id,
            predictor_id: Some(row.predictor_id),
            kind: row.kind,
            status: row.status,
            predictions: row.predictions,
            hallucinations: row.hallucinations,
            latency_ms: row.latency_ms,
            llm_meta: row.llm_meta,
        }
    }

    /// The outcome's id, generated on first access.
    pub fn id(&self) -> &str {
        self.id.get_or_init(|| id::generate("prediction"))
    }

    /// The stored predictor id, or `None` for an inline override.
    pub fn predictor_id(&self) -> Option<&str> {
        self.predictor_id.as_deref()
    }

    /// The predictor kind.
    pub fn kind(&self) -> PredictorKind {
        self.kind
    }

    /// The predictor id shown to callers, with a local label for inline
    /// overrides.
    pub fn display_predictor_id(&self) -> String {
        match (&self.predictor_id, self.kind) {
            (Some(id), _) => id.clone(),
            (None, PredictorKind::FineTuned) => "local_ft_predictor".into(),
            (None, PredictorKind::Llm) => "local_llm_predictor".into(),
        }
    }

    /// The persistable row for this outcome. Fails for inline overrides,
    /// which have no stored predictor identity.
    pub fn to_row(&self) -> Result<PredictionRow> {
        let predictor_id =
            self.predictor_id
                .clone()
                .ok_or_else(|| ClassifyError::Configuration {
                    reason: "cannot persist a result produced by an inline predictor override"
                        .into(),
                })?;
        Ok(PredictionRow {
            id: self.id().to_string(),
            predictor_id,
            kind: self.kind,
            status: self.status,
            predictions: self.predictions.clone(),
            hallucinations: self.hallucinations.clone(),
            latency_ms: self.latency_ms,
            llm_meta: self.llm_meta.clone(),
        })
    }

    /// The caller-facing view of this outcome, with klass names and
    /// descriptions resolved.
    pub async fn details(&self, klasses: &KlassResolver) -> Result<PredictorDetails> {
        let keys: Vec<Klass> = self
            .predictions
            .iter()
            .map(|prediction| Klass {
                id: prediction.id.clone(),
                version: prediction.version,
            })
            .collect();
        let resolved = klasses.resolve(&keys).await?;
        let classes = self
            .predictions
            .iter()
            .zip(resolved)
            .map(|(prediction, details)| PredictorKlassDetails {
                klass_id: prediction.id.clone(),
                klass_version: prediction.version,
                klass_name: details.name,
                klass_description: details.description,
                confidence: prediction.confidence,
                selected: prediction.selected,
            })
            .collect();

        let (tokens_used, hallucinations, reasoning) = match self.kind {
            PredictorKind::Llm => (
                Some(
                    self.llm_meta
                        .as_ref()
                        .and_then(|meta| meta.token_usage)
                        .map(|usage| usage.total_tokens)
                        .unwrap_or(0),
                ),
                self.hallucinations
                    .iter()
                    .map(|h| h.klass_name.clone())
                    .collect(),
                Some(
                    self.llm_meta
                        .as_ref()
                        .map(|meta| meta.reasoning.clone())
                        .unwrap_or_default(),
                ),
            ),
            PredictorKind::FineTuned => (None, Vec::new(), None),
        };

        Ok(PredictorDetails {
            predictor_id: self.display_predictor_id(),
            kind: self.kind,
            status: self.status,
            latency_ms: self.latency_ms,
            classes,
            tokens_used,
            hallucinations,
            reasoning,
        })
    }
}

// ── Caller-facing detail types ──────────────────────────────────────────

/// One klass's score with its resolved name and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorKlassDetails {
    /// Klass identifier.
    pub klass_id: String,
    /// Klass version the predictor scored against.
    pub klass_version: i64,
    /// Resolved display name.
    pub klass_name: String,
    /// Resolved description.
    pub klass_description: String,
    /// Score in \[0.0, 1.0\].
    pub confidence: f64,
    /// Whether the predictor selected this klass.
    pub selected: bool,
}

/// The caller-facing view of one predictor's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorDetails {
    /// The predictor's id (or a local label for inline overrides).
    pub predictor_id: String,
    /// The predictor kind.
    pub kind: PredictorKind,
    /// The prediction status.
    pub status: PredictionStatus,
    /// How long the predictor's own work took.
    pub latency_ms: u64,
    /// Per-klass scores with resolved details.
    pub classes: Vec<PredictorKlassDetails>,
    /// Total tokens used (LLM predictors only).
    pub tokens_used: Option<u32>,
    /// Hallucinated class names (LLM predictors only).
    pub hallucinations: Vec<String>,
    /// The model's reasoning (LLM predictors only).
    pub reasoning: Option<String>,
}
