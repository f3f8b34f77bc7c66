//! The pipeline configuration resolver.
//!
//! Two mutually exclusive resolution modes: a stored versioned
//! configuration (version `-1` means "latest"), or an ad-hoc override
//! supplied by the caller. Stored configurations translate into by-id
//! stage specs, so each stage lazy-loads its own option body; overrides
//! translate directly and carry no configuration handle, which means
//! their results cannot be persisted.

use serde::{Deserialize, Serialize};

use heddle_types::{
    ClassifyError, ConfigHandle, ConfigRef, FineTunedOptions, KlassDetails, LlmPredictorOptions,
    NormalizerSpec, PipelineDefinition, PredictorSpec, Result, LATEST_VERSION,
};

use crate::store::ConfigStore;

/// An ad-hoc pipeline supplied by the caller instead of a stored
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOverride {
    /// Optional normalization stage, by id or inlined.
    pub normalizer: Option<NormalizerSpec>,

    /// Optional fine-tuned predictor, by id or inlined.
    pub fine_tuned_predictor: Option<PredictorSpec<FineTunedOptions>>,

    /// Optional LLM predictor, by id or inlined.
    pub llm_predictor: Option<PredictorSpec<LlmPredictorOptions>>,

    /// Klass details for the run (seeded into the per-run klass cache).
    pub klasses: Vec<KlassDetails>,
}

/// Resolve the pipeline to run: a stored configuration if one is
/// referenced, otherwise the override, otherwise a configuration error.
///
/// Returns the definition plus the configuration handle required to
/// persist results (`None` for overrides).
pub async fn resolve_pipeline(
    classifier_id: &str,
    configuration: Option<&ConfigRef>,
    overrides: Option<&PipelineOverride>,
    configs: &dyn ConfigStore,
) -> Result<(PipelineDefinition, Option<ConfigHandle>)> {
    if let Some(configuration) = configuration {
        return from_stored_config(classifier_id, configuration, configs).await;
    }
    if let Some(overrides) = overrides {
        return from_override(classifier_id, overrides);
    }
    Err(ClassifyError::Configuration {
        reason: "no pipeline configuration or override specified".into(),
    })
}

async fn from_stored_config(
    classifier_id: &str,
    configuration: &ConfigRef,
    configs: &dyn ConfigStore,
) -> Result<(PipelineDefinition, Option<ConfigHandle>)> {
    let version = if configuration.version == LATEST_VERSION {
        configs.latest(&configuration.id).await?
    } else {
        configs
            .at_version(&configuration.id, configuration.version)
            .await?
    };

    let handle = ConfigHandle {
        id: version.classifier_config_id.clone(),
        version: version.version_id,
    };
    let pipeline = PipelineDefinition {
        classifier_id: classifier_id.to_string(),
        normalizer: version
            .normalizer_id
            .map(|normalizer_id| NormalizerSpec::ById { normalizer_id }),
        fine_tuned_predictor: version
            .ft_predictor_id
            .map(|predictor_id| PredictorSpec::ById { predictor_id }),
        llm_predictor: version
            .llm_predictor_id
            .map(|predictor_id| PredictorSpec::ById { predictor_id }),
        // Stored configurations carry no inline details; klasses
        // lazy-load through the klass store.
        klass_list: Vec::new(),
    };
    Ok((pipeline, Some(handle)))
}

fn from_override(
    classifier_id: &str,
    overrides: &PipelineOverride,
) -> Result<(PipelineDefinition, Option<ConfigHandle>)> {
    if overrides.fine_tuned_predictor.is_none() && overrides.llm_predictor.is_none() {
        return Err(ClassifyError::Configuration {
            reason: "an override must supply a fine-tuned or an LLM predictor".into(),
        });
    }
    let pipeline = PipelineDefinition {
        classifier_id: classifier_id.to_string(),
        normalizer: overrides.normalizer.clone(),
        fine_tuned_predictor: overrides.fine_tuned_predictor.clone(),
        llm_predictor: overrides.llm_predictor.clone(),
        klass_list: overrides.klasses.clone(),
    };
    Ok((pipeline, None))
}
