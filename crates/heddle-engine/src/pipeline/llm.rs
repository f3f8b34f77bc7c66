//! The LLM predictor: prompt-based classification over a dynamic,
//! prior-aware candidate set.
//!
//! Candidate selection honors two flags: `skip_prior_available_klasses`
//! removes every klass a prior predictor considered at all, and
//! `add_prior_selected_klasses` re-includes the ones a prior actually
//! selected. When neither flag is set the predictor does not await its
//! priors and runs fully concurrently with them.
//!
//! The model is asked for CLUES, REASONING, and a string array of chosen
//! class names (or null) as strict JSON. Names that match no candidate are
//! recorded as hallucinations and never selected. Confidence is binary
//! (1.0 for a name match, 0.0 otherwise): the completion call offers no
//! calibration signal, so none is invented.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::OnceCell;
use tracing::warn;

use heddle_llm::CompletionClient;
use heddle_types::{
    ClassifyError, FailureMode, Hallucination, Klass, KlassDetails, KlassPrediction, LlmMeta,
    LlmPredictorOptions, PipelineDefinition, PredictionStatus, PredictorKind, PredictorSpec,
    Result, TokenUsage,
};

use super::elapsed_ms;
use super::input::Input;
use super::klass::KlassResolver;
use super::normalizer::NormalizationResult;
use super::predictor::{PredictionOutcome, Predictor, PriorFuture, ResolvedOptions};
use crate::store::{PredictorOptions, PredictorStore};

/// Predictor backed by an LLM completion call.
pub struct LlmPredictor {
    id: Option<String>,
    options: OnceCell<Arc<ResolvedOptions<LlmPredictorOptions>>>,
    store: Arc<dyn PredictorStore>,
    completion: Arc<dyn CompletionClient>,
}

impl LlmPredictor {
    /// Build the stage from the pipeline definition, if one is configured.
    ///
    /// A configured LLM predictor without a completion client is a
    /// configuration error.
    pub fn from_pipeline(
        pipeline: &PipelineDefinition,
        completion: Option<Arc<dyn CompletionClient>>,
        store: Arc<dyn PredictorStore>,
    ) -> Result<Option<Arc<Self>>> {
        let spec = match &pipeline.llm_predictor {
            Some(spec) => spec,
            None => return Ok(None),
        };
        let completion = completion.ok_or_else(|| ClassifyError::Configuration {
            reason: "an LLM completion client is required to use an LLM predictor".into(),
        })?;
        let predictor = match spec {
            PredictorSpec::ById { predictor_id } => Self {
                id: Some(predictor_id.clone()),
                options: OnceCell::new(),
                store,
                completion,
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
                completion,
            },
        };
        Ok(Some(Arc::new(predictor)))
    }

    async fn options(&self) -> Result<Arc<ResolvedOptions<LlmPredictorOptions>>> {
        let options = self
            .options
            .get_or_try_init(|| async {
                let id = self.id.as_deref().ok_or_else(|| ClassifyError::Configuration {
                    reason: "LLM predictor has neither an id nor inline options".into(),
                })?;
                let row = self.store.get(id).await?;
                match row.options {
                    PredictorOptions::Llm(options) => Ok(Arc::new(ResolvedOptions {
                        options,
                        supported_klasses: row.supported_klasses,
                        blacklisted_klass_ids: row.blacklisted_klass_ids,
                    })),
                    PredictorOptions::FineTuned(_) => Err(ClassifyError::Configuration {
                        reason: format!("predictor '{id}' is not an LLM predictor"),
                    }),
                }
            })
            .await?;
        Ok(options.clone())
    }
}

#[async_trait]
impl Predictor for LlmPredictor {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn kind(&self) -> PredictorKind {
        PredictorKind::Llm
    }

    async fn failure_mode(&self) -> Result<FailureMode> {
        Ok(self.options().await?.options.failure_mode)
    }

    async fn run(
        &self,
        input: Arc<Input>,
        normalized: Option<Arc<NormalizationResult>>,
        klasses: Arc<KlassResolver>,
        priors: Vec<PriorFuture>,
    ) -> Arc<PredictionOutcome> {
        // Everything before the model call is upstream work: text and
        // option resolution, prior awaiting, candidate resolution.
        let prepared = async {
            let text = match &normalized {
                Some(normalized) => normalized.text().await?,
                None => input.text().await?,
            };
            let options = self.options().await?;

            let reads_priors = options.options.skip_prior_available_klasses
                || options.options.add_prior_selected_klasses;
            let prior_predictions: Vec<KlassPrediction> = if reads_priors {
                let outcomes = join_all(priors).await;
                outcomes
                    .iter()
                    .flat_map(|outcome| outcome.predictions.iter().cloned())
                    .collect()
            } else {
                Vec::new()
            };

            let mut skipped: HashSet<String> = HashSet::new();
            if options.options.skip_prior_available_klasses {
                skipped.extend(prior_predictions.iter().map(|p| p.id.clone()));
            }
            if options.options.add_prior_selected_klasses {
                for prediction in &prior_predictions {
                    if prediction.selected {
                        skipped.remove(&prediction.id);
                    }
                }
            }

            let candidate_keys: Vec<Klass> = options
                .supported_klasses
                .iter()
                .filter(|klass| !skipped.contains(&klass.id))
                .cloned()
                .collect();
            let candidates = klasses.resolve(&candidate_keys).await?;
            Ok::<_, ClassifyError>((text, options, candidates))
        }
        .await;
        let (text, options, candidates) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(
                    predictor = self.id.as_deref().unwrap_or("inline"),
                    error = %err,
                    "LLM predictor could not start"
                );
                return Arc::new(PredictionOutcome::fail_parent(
                    self.id.clone(),
                    PredictorKind::Llm,
                ));
            }
        };

        let start = Instant::now();
        let classification =
            classify_with_llm(self.completion.as_ref(), &options.options, &candidates, &text)
                .await;
        let latency_ms = elapsed_ms(start);

        let predictions = candidates
            .iter()
            .map(|candidate| {
                let picked = classification.selected_ids.contains(&candidate.id);
                KlassPrediction {
                    id: candidate.id.clone(),
                    version: candidate.version,
                    confidence: if picked { 1.0 } else { 0.0 },
                    selected: picked && !options.is_blacklisted(&candidate.id),
                }
            })
            .collect();
        let hallucinations = classification
            .hallucinations
            .into_iter()
            .map(|klass_name| Hallucination { klass_name })
            .collect();

        Arc::new(PredictionOutcome::completed(
            self.id.clone(),
            PredictorKind::Llm,
            if classification.success {
                PredictionStatus::Pass
            } else {
                PredictionStatus::Fail
            },
            predictions,
            hallucinations,
            latency_ms,
            Some(LlmMeta {
                reasoning: classification.reasoning,
                clues: classification.clues,
                token_usage: classification.usage,
            }),
        ))
    }
}

// ── Classification call ─────────────────────────────────────────────────

struct LlmClassification {
    success: bool,
    selected_ids: HashSet<String>,
    hallucinations: Vec<String>,
    clues: String,
    reasoning: String,
    usage: Option<TokenUsage>,
}

impl LlmClassification {
    fn failure(usage: Option<TokenUsage>) -> Self {
        Self {
            success: false,
            selected_ids: HashSet::new(),
            hallucinations: Vec::new(),
            clues: String::new(),
            reasoning: String::new(),
            usage,
        }
    }
}

/// Run one classification call. Model and parse failures are absorbed
/// into `success = false`; the owning predictor reports them as `FAIL`
/// and composite reconciliation applies the configured failure mode.
async fn classify_with_llm(
    client: &dyn CompletionClient,
    options: &LlmPredictorOptions,
    candidates: &[KlassDetails],
    text: &str,
) -> LlmClassification {
    // Nothing left to ask about: an empty candidate set is a successful
    // no-selection, not a model call.
    if candidates.is_empty() {
        return LlmClassification {
            success: true,
            selected_ids: HashSet::new(),
            hallucinations: Vec::new(),
            clues: String::new(),
            reasoning: String::new(),
            usage: None,
        };
    }

    let prompt = build_classification_prompt(options, candidates, text);
    let completion = match client.complete(&options.llm_config, &prompt).await {
        Ok(completion) => completion,
        Err(err) => {
            warn!(error = %err, "classification call failed");
            return LlmClassification::failure(None);
        }
    };
    let usage = completion.usage;

    let parsed = match parse_classification_output(&options.objective, &completion.text) {
        Some(parsed) => parsed,
        None => {
            warn!("classification output failed schema validation");
            return LlmClassification::failure(usage);
        }
    };

    let candidate_names: HashSet<&str> =
        candidates.iter().map(|candidate| candidate.name.as_str()).collect();
    let selected_ids = candidates
        .iter()
        .filter(|candidate| parsed.picked.iter().any(|name| name == &candidate.name))
        .map(|candidate| candidate.id.clone())
        .collect();
    let hallucinations = parsed
        .picked
        .iter()
        .filter(|name| !candidate_names.contains(name.as_str()))
        .cloned()
        .collect();

    LlmClassification {
        success: true,
        selected_ids,
        hallucinations,
        clues: parsed.clues,
        reasoning: parsed.reasoning,
        usage,
    }
}

fn build_classification_prompt(
    options: &LlmPredictorOptions,
    candidates: &[KlassDetails],
    text: &str,
) -> String {
    let objective = &options.objective;
    let article = match objective.chars().next() {
        Some(first) if "aeiou".contains(first.to_ascii_lowercase()) => "an",
        _ => "a",
    };
    let candidate_list = candidates
        .iter()
        .map(|candidate| format!("{}: {}", candidate.name, candidate.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"This is {article} {objective} classifier for {input_description}.

First, list CLUES (i.e., keywords, phrases, contextual information, semantic relations, semantic meaning, tones, references) that support the classification of INPUT.
Second, deduce the diagnostic REASONING process from premises (i.e., CLUES, INPUT) that supports the INPUT classification determination (Limit the number of words to 130).
Third, based on CLUES, REASONING and INPUT, determine the overall {objective} of INPUT as any of the following or null. Only include the name, not the description given as "name: description".
{candidate_list}
Output should be the JSON format below. Do not add any additional text.
{{
    "CLUES": "string",
    "REASONING": "string",
    "{objective}": string[] | null
}}

CLASSIFY THIS INPUT:
```
{text}
```

JSON: {{"#,
        input_description = options.input_description,
    )
}

struct ParsedClassification {
    clues: String,
    reasoning: String,
    picked: Vec<String>,
}

/// Parse and schema-validate the model output. The completion is seeded
/// with an opening brace in the prompt, so the raw text is parsed as
/// `"{" + text`. Returns `None` on any parse or schema violation.
fn parse_classification_output(objective: &str, raw: &str) -> Option<ParsedClassification> {
    let value: serde_json::Value = serde_json::from_str(&format!("{{{raw}")).ok()?;
    let object = value.as_object()?;

    let clues = match object.get("CLUES") {
        None => String::new(),
        Some(serde_json::Value::String(clues)) => clues.clone(),
        Some(_) => return None,
    };
    let reasoning = match object.get("REASONING") {
        None => String::new(),
        Some(serde_json::Value::String(reasoning)) => reasoning.clone(),
        Some(_) => return None,
    };
    let picked = match object.get(objective) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?,
        Some(_) => return None,
    };

    Some(ParsedClassification {
        clues,
        reasoning,
        picked,
    })
}
