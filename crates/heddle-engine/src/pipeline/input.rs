//! The input resolver: the text to classify, inline or by reference.
//!
//! Invariant: exactly one of id / text is populated at construction; once
//! materialized, the text stays cached. An inline input is assigned an id
//! only when the run is persisted, and exactly once.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;

use heddle_types::{id, ClassifyError, ClassifyInput, PipelineDefinition, RequestMetadata, Result};

use crate::store::{InputRow, InputStore};

/// The text being classified.
pub struct Input {
    id: OnceCell<String>,
    text: OnceCell<String>,
    store: Arc<dyn InputStore>,
}

impl Input {
    /// Build from the caller-supplied input shape.
    pub fn from_classify_input(input: ClassifyInput, store: Arc<dyn InputStore>) -> Self {
        match input {
            ClassifyInput::Text(text) => Self {
                id: OnceCell::new(),
                text: OnceCell::new_with(Some(text)),
                store,
            },
            ClassifyInput::InputId(id) => Self {
                id: OnceCell::new_with(Some(id)),
                text: OnceCell::new(),
                store,
            },
        }
    }

    /// The input's id, if known (supplied by reference, or assigned by a
    /// prior [`persist`](Self::persist)).
    pub fn id(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    /// Materialize the input text, loading it from the store on first use
    /// when the input was supplied by reference.
    pub async fn text(&self) -> Result<String> {
        if let Some(text) = self.text.get() {
            return Ok(text.clone());
        }
        let id = match self.id.get() {
            Some(id) => id.clone(),
            None => {
                return Err(ClassifyError::Configuration {
                    reason: "input has neither an id nor text".into(),
                })
            }
        };
        let text = self
            .text
            .get_or_try_init(|| async {
                let row = self.store.get(&id).await?;
                Ok::<_, ClassifyError>(row.text)
            })
            .await?;
        Ok(text.clone())
    }

    /// Persist the input, assigning an id exactly once. Idempotent: a
    /// by-reference or already-persisted input returns its id unchanged
    /// with no write.
    pub async fn persist(
        &self,
        pipeline: &PipelineDefinition,
        metadata: &RequestMetadata,
    ) -> Result<String> {
        let id = self
            .id
            .get_or_try_init(|| async {
                let text = match self.text.get() {
                    Some(text) => text.clone(),
                    None => {
                        return Err(ClassifyError::Configuration {
                            reason: "input has neither an id nor text".into(),
                        })
                    }
                };
                let id = id::generate("input");
                self.store
                    .create(InputRow {
                        id: id.clone(),
                        classifier_id: pipeline.classifier_id.clone(),
                        text,
                        request_metadata: metadata.clone(),
                        created_at: Utc::now(),
                    })
                    .await?;
                Ok(id)
            })
            .await?;
        Ok(id.clone())
    }
}
