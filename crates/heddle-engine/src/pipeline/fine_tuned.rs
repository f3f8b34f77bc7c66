//! The fine-tuned predictor: hosted inference over a fixed klass vector.
//!
//! The endpoint returns a probability vector aligned positionally with the
//! predictor's supported klass list; a klass is selected iff its
//! probability clears 0.5 and it is not blacklisted. The fine-tuned
//! predictor never reads priors.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::warn;

use heddle_llm::InferenceClient;
use heddle_types::{
    ClassifyError, FailureMode, FineTunedOptions, KlassPrediction, PipelineDefinition,
    PredictionStatus, PredictorKind, PredictorSpec, Result,
};

use super::elapsed_ms;
use super::input::Input;
use super::klass::KlassResolver;
use super::normalizer::NormalizationResult;
use super::predictor::{PredictionOutcome, Predictor, PriorFuture, ResolvedOptions};
use crate::store::{PredictorOptions, PredictorStore};

/// Predictor backed by a hosted fine-tuned inference endpoint.
pub struct FineTunedPredictor {
    id: Option<String>,
    options: OnceCell<Arc<ResolvedOptions<FineTunedOptions>>>,
    store: Arc<dyn PredictorStore>,
    inference: Arc<dyn InferenceClient>,
}

impl FineTunedPredictor {
    /// Build the stage from the pipeline definition, if one is configured.
    pub fn from_pipeline(
        pipeline: &PipelineDefinition,
        store: Arc<dyn PredictorStore>,
        inference: Arc<dyn InferenceClient>,
    ) -> Option<Arc<Self>> {
        let spec = pipeline.fine_tuned_predictor.as_ref()?;
        let predictor = match spec {
            PredictorSpec::ById { predictor_id } => Self {
                id: Some(predictor_id.clone()),
                options: OnceCell::new(),
                store,
                inference,
            },
            PredictorSpec::Inline {
                options,
                supported_klasses,
                blacklisted_klass_ids,
            } => Self {
                id: None,
                options: OnceCell::new_with(Some(Arc::new(ResolvedOptions {
                    options: options.clone(),
                    supported_klasses: supported_klasses.clone(),
                    blacklisted_klass_ids: blacklisted_klass_ids.clone(),
                }))),
                store,
                inference,
            },
        };
        Some(Arc::new(predictor))
    }

    async fn options(&self) -> Result<Arc<ResolvedOptions<FineTunedOptions>>> {
        let options = self
            .options
            .get_or_try_init(|| async {
                let id = self.id.as_deref().ok_or_else(|| ClassifyError::Configuration {
                    reason: "fine-tuned predictor has neither an id nor inline options".into(),
                })?;
                let row = self.store.get(id).await?;
                match row.options {
                    PredictorOptions::FineTuned(options) => Ok(Arc::new(ResolvedOptions {
                        options,
                        supported_klasses: row.supported_klasses,
                        blacklisted_klass_ids: row.blacklisted_klass_ids,
                    })),
                    PredictorOptions::Llm(_) => Err(ClassifyError::Configuration {
                        reason: format!("predictor '{id}' is not a fine-tuned predictor"),
                    }),
                }
            })
            .await?;
        Ok(options.clone())
    }
}

#[async_trait]
impl Predictor for FineTunedPredictor {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> PredictorKind {
        PredictorKind::FineTuned
    }

    async fn failure_mode(&self) -> Result<FailureMode> {
        Ok(self.options().await?.options.failure_mode)
    }

    async fn run(
        &self,
        input: Arc<Input>,
        normalized: Option<Arc<NormalizationResult>>,
        _klasses: Arc<KlassResolver>,
        _priors: Vec<PriorFuture>,
    ) -> Arc<PredictionOutcome> {
        // Prefer normalized text when a normalizer ran. Any failure here
        // is upstream of this predictor's own work.
        let prepared = async {
            let text = match &normalized {
                Some(normalized) => normalized.text().await?,
                None => input.text().await?,
            };
            let options = self.options().await?;
            Ok::<_, ClassifyError>((text, options))
        }
        .await;
        let (text, options) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(
                    predictor = self.id.as_deref().unwrap_or("inline"),
                    error = %err,
                    "fine-tuned predictor could not start"
                );
                return Arc::new(PredictionOutcome::fail_parent(
                    self.id.clone(),
                    PredictorKind::FineTuned,
                ));
            }
        };

        let start = Instant::now();
        match self.inference.invoke(&options.options.endpoint, &text).await {
            Ok(probabilities) if probabilities.len() == options.supported_klasses.len() => {
                let predictions = options
                    .supported_klasses
                    .iter()
                    .zip(&probabilities)
                    .map(|(klass, &probability)| KlassPrediction {
                        id: klass.id.clone(),
                        version: klass.version,
                        confidence: probability,
                        selected: probability >= 0.5 && !options.is_blacklisted(&klass.id),
                    })
                    .collect();
                Arc::new(PredictionOutcome::completed(
                    self.id.clone(),
                    PredictorKind::FineTuned,
                    PredictionStatus::Pass,
                    predictions,
                    Vec::new(),
                    elapsed_ms(start),
                    None,
                ))
            }
            Ok(probabilities) => {
                warn!(
                    endpoint = %options.options.endpoint,
                    expected = options.supported_klasses.len(),
                    received = probabilities.len(),
                    "inference endpoint returned a misaligned probability vector"
                );
                Arc::new(PredictionOutcome::completed(
                    self.id.clone(),
                    PredictorKind::FineTuned,
                    PredictionStatus::Fail,
                    Vec::new(),
                    Vec::new(),
                    elapsed_ms(start),
                    None,
                ))
            }
            Err(err) => {
                warn!(
                    endpoint = %options.options.endpoint,
                    error = %err,
                    "inference invocation failed"
                );
                Arc::new(PredictionOutcome::completed(
                    self.id.clone(),
                    PredictorKind::FineTuned,
                    PredictionStatus::Fail,
                    Vec::new(),
                    Vec::new(),
                    elapsed_ms(start),
                    None,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use heddle_llm::ProviderError;
    use heddle_types::{ClassifyInput, Klass};

    use crate::store::memory::MemoryStore;
    use crate::store::PredictorRow;

    /// Inference double with a fixed reply and a call counter.
    pub(crate) struct StubInference {
        reply: Option<Vec<f64>>,
        calls: AtomicUsize,
    }

    impl StubInference {
        pub(crate) fn replying(probabilities: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(probabilities),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceClient for StubInference {
        async fn invoke(&self, _endpoint: &str, _text: &str) -> heddle_llm::Result<Vec<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(probabilities) => Ok(probabilities.clone()),
                None => Err(ProviderError::RequestFailed("stub failure".into())),
            }
        }
    }

    fn klass(id: &str, version: i64) -> Klass {
        Klass {
            id: id.into(),
            version,
        }
    }

    fn stored_predictor(blacklisted: &[&str]) -> PredictorRow {
        PredictorRow {
            id: "predictor_ft".into(),
            options: PredictorOptions::FineTuned(FineTunedOptions {
                failure_mode: FailureMode::Ignore,
                endpoint: "support-intents-v2".into(),
            }),
            supported_klasses: vec![klass("billing", 1), klass("shipping", 1)],
            blacklisted_klass_ids: blacklisted.iter().map(|id| id.to_string()).collect(),
        }
    }

    fn pipeline_with_stored_predictor() -> PipelineDefinition {
        PipelineDefinition {
            classifier_id: "classifier_1".into(),
            normalizer: None,
            fine_tuned_predictor: Some(PredictorSpec::ById {
                predictor_id: "predictor_ft".into(),
            }),
            llm_predictor: None,
            klass_list: vec![],
        }
    }

    fn run_context(store: &Arc<MemoryStore>) -> (Arc<Input>, Arc<KlassResolver>) {
        let input = Arc::new(Input::from_classify_input(
            ClassifyInput::Text("my invoice is overdue".into()),
            store.clone(),
        ));
        let resolver = Arc::new(KlassResolver::new(store.clone()));
        (input, resolver)
    }

    #[tokio::test]
    async fn selects_klasses_above_threshold() {
        let store = Arc::new(MemoryStore::new());
        store.insert_predictor(stored_predictor(&[]));
        let predictor = FineTunedPredictor::from_pipeline(
            &pipeline_with_stored_predictor(),
            store.clone(),
            StubInference::replying(vec![0.91, 0.27]),
        )
        .unwrap();

        let (input, resolver) = run_context(&store);
        let outcome = predictor.run(input, None, resolver, vec![]).await;
        assert_eq!(outcome.status, PredictionStatus::Pass);
        assert_eq!(outcome.predictions.len(), 2);
        assert!(outcome.predictions[0].selected);
        assert!((outcome.predictions[0].confidence - 0.91).abs() < f64::EPSILON);
        assert!(!outcome.predictions[1].selected);
    }

    #[tokio::test]
    async fn blacklisted_klass_is_never_selected() {
        let store = Arc::new(MemoryStore::new());
        store.insert_predictor(stored_predictor(&["billing"]));
        let predictor = FineTunedPredictor::from_pipeline(
            &pipeline_with_stored_predictor(),
            store.clone(),
            StubInference::replying(vec![0.99, 0.8]),
        )
        .unwrap();

        let (input, resolver) = run_context(&store);
        let outcome = predictor.run(input, None, resolver, vec![]).await;
        assert!(!outcome.predictions[0].selected);
        // The confidence is still reported.
        assert!((outcome.predictions[0].confidence - 0.99).abs() < f64::EPSILON);
        assert!(outcome.predictions[1].selected);
    }

    #[tokio::test]
    async fn invocation_failure_is_fail_with_latency() {
        let store = Arc::new(MemoryStore::new());
        store.insert_predictor(stored_predictor(&[]));
        let predictor = FineTunedPredictor::from_pipeline(
            &pipeline_with_stored_predictor(),
            store.clone(),
            StubInference::failing(),
        )
        .unwrap();

        let (input, resolver) = run_context(&store);
        let outcome = predictor.run(input, None, resolver, vec![]).await;
        assert_eq!(outcome.status, PredictionStatus::Fail);
        assert!(outcome.predictions.is_empty());
    }

    #[tokio::test]
    async fn missing_definition_is_fail_parent_with_zero_latency() {
        // No predictor row seeded: option resolution fails upstream of
        // the endpoint call.
        let store = Arc::new(MemoryStore::new());
        let inference = StubInference::replying(vec![1.0]);
        let predictor = FineTunedPredictor::from_pipeline(
            &pipeline_with_stored_predictor(),
            store.clone(),
            inference.clone(),
        )
        .unwrap();

        let (input, resolver) = run_context(&store);
        let outcome = predictor.run(input, None, resolver, vec![]).await;
        assert_eq!(outcome.status, PredictionStatus::FailParent);
        assert_eq!(outcome.latency_ms, 0);
        assert_eq!(inference.call_count(), 0);
    }

    #[tokio::test]
    async fn misaligned_probability_vector_is_fail() {
        let store = Arc::new(MemoryStore::new());
        store.insert_predictor(stored_predictor(&[]));
        let predictor = FineTunedPredictor::from_pipeline(
            &pipeline_with_stored_predictor(),
            store.clone(),
            StubInference::replying(vec![0.9]),
        )
        .unwrap();

        let (input, resolver) = run_context(&store);
        let outcome = predictor.run(input, None, resolver, vec![]).await;
        assert_eq!(outcome.status, PredictionStatus::Fail);
        assert!(outcome.predictions.is_empty());
    }

    #[tokio::test]
    async fn wrong_kind_row_is_a_configuration_error() {
        let store = Arc::new(MemoryStore::new());
        store.insert_predictor(PredictorRow {
            id: "predictor_ft".into(),
            options: PredictorOptions::Llm(heddle_types::LlmPredictorOptions {
                failure_mode: FailureMode::Ignore,
                llm_config: heddle_types::ModelConfig {
                    model_name: "gpt-4o".into(),
                },
                objective: "intents".into(),
                input_description: "emails".into(),
                skip_prior_available_klasses: false,
                add_prior_selected_klasses: false,
            }),
            supported_klasses: vec![],
            blacklisted_klass_ids: vec![],
        });
        let predictor = FineTunedPredictor::from_pipeline(
            &pipeline_with_stored_predictor(),
            store.clone(),
            StubInference::replying(vec![]),
        )
        .unwrap();
        let err = predictor.failure_mode().await.unwrap_err();
        assert!(matches!(err, ClassifyError::Configuration { .. }));
    }
}
