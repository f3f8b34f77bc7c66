//! The classification pipeline: input, normalization, klass resolution,
//! and prediction for one run.
//!
//! [`run_pipeline`] wires the parts together: build the input handle, the
//! optional normalizer, the composite predictor, and the per-run klass
//! resolver; run normalization; then run the composite.

pub mod composite;
pub mod fine_tuned;
pub mod input;
pub mod klass;
pub mod llm;
pub mod normalizer;
pub mod predictor;

use std::sync::Arc;
use std::time::Instant;

use heddle_llm::{CompletionClient, InferenceClient};
use heddle_types::{ClassifyInput, PipelineDefinition, Result};

use crate::store::Stores;
use composite::{CompositeOutcome, CompositePredictor};
use input::Input;
use klass::KlassResolver;
use normalizer::{NormalizationResult, Normalizer};

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Everything one pipeline run produced.
pub struct PipelineRun {
    /// The input handle (persistable on save).
    pub input: Arc<Input>,
    /// The normalization result, when a normalizer was configured.
    pub normalization: Option<Arc<NormalizationResult>>,
    /// The merged prediction outcome.
    pub outcome: CompositeOutcome,
    /// The per-run klass resolver, for detail assembly.
    pub klasses: Arc<KlassResolver>,
}

/// Run the pipeline for one input.
pub async fn run_pipeline(
    pipeline: &PipelineDefinition,
    completion: Option<Arc<dyn CompletionClient>>,
    classify_input: ClassifyInput,
    stores: &Stores,
    inference: Arc<dyn InferenceClient>,
    start: Instant,
) -> Result<PipelineRun> {
    let input = Arc::new(Input::from_classify_input(
        classify_input,
        stores.inputs.clone(),
    ));
    let normalizer = Normalizer::from_pipeline(
        pipeline,
        completion.clone(),
        stores.normalizers.clone(),
        stores.normalizations.clone(),
    )?;
    let composite = CompositePredictor::from_pipeline(pipeline, completion, stores, inference)?;
    let klasses = Arc::new(KlassResolver::from_pipeline(pipeline, stores.klasses.clone()));

    let normalization = match &normalizer {
        Some(normalizer) => Some(Arc::new(normalizer.run(&input).await?)),
        None => None,
    };

    let outcome = composite
        .run(&input, normalization.as_ref(), &klasses, start)
        .await?;

    Ok(PipelineRun {
        input,
        normalization,
        outcome,
        klasses,
    })
}
