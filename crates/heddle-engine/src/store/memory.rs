//! In-memory store backend.
//!
//! One [`MemoryStore`] implements every collaborator trait over
//! process-local maps. It backs the integration tests and is useful for
//! embedding the engine without external storage. Request creation is
//! atomic by construction (a single append under one lock).

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use heddle_types::{
    ClassifyError, EntityKind, Klass, KlassDetails, PipelineConfigVersion, Result,
};

use super::{
    ConfigStore, InputRow, InputStore, KlassStore, NormalizationRow, NormalizationStore,
    NormalizerRow, NormalizerStore, PredictorRow, PredictorStore, RequestRow, RequestStore,
};

/// Process-local implementation of all engine stores.
#[derive(Default)]
pub struct MemoryStore {
    inputs: DashMap<String, InputRow>,
    normalizations: DashMap<String, NormalizationRow>,
    normalizers: DashMap<String, NormalizerRow>,
    predictors: DashMap<String, PredictorRow>,
    klasses: DashMap<(String, i64), KlassDetails>,
    configs: RwLock<Vec<PipelineConfigVersion>>,
    requests: RwLock<Vec<RequestRow>>,
}

impl MemoryStore {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a normalizer definition.
    pub fn insert_normalizer(&self, row: NormalizerRow) {
        self.normalizers.insert(row.id.clone(), row);
    }

    /// Seed a predictor definition.
    pub fn insert_predictor(&self, row: PredictorRow) {
        self.predictors.insert(row.id.clone(), row);
    }

    /// Seed a klass version.
    pub fn insert_klass(&self, details: KlassDetails) {
        self.klasses
            .insert((details.id.clone(), details.version), details);
    }

    /// Seed an input text.
    pub fn insert_input(&self, row: InputRow) {
        self.inputs.insert(row.id.clone(), row);
    }

    /// Seed a configuration version row.
    pub fn insert_config_version(&self, row: PipelineConfigVersion) {
        self.configs.write().push(row);
    }

    /// Number of persisted requests (for test assertions).
    pub fn request_count(&self) -> usize {
        self.requests.read().len()
    }

    /// A persisted request by id (for test assertions).
    pub fn request(&self, id: &str) -> Option<RequestRow> {
        self.requests.read().iter().find(|r| r.id == id).cloned()
    }

    /// Number of persisted inputs (for test assertions).
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of persisted normalizations (for test assertions).
    pub fn normalization_count(&self) -> usize {
        self.normalizations.len()
    }
}

#[async_trait]
impl InputStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<InputRow> {
        self.inputs
            .get(id)
            .map(|row| row.clone())
            .ok_or_else(|| ClassifyError::NotFound {
                kind: EntityKind::Input,
                id: id.to_string(),
            })
    }

    async fn create(&self, row: InputRow) -> Result<()> {
        self.inputs.insert(row.id.clone(), row);
        Ok(())
    }
}

#[async_trait]
impl NormalizationStore for MemoryStore {
    async fn find_by_input_and_normalizer(
        &self,
        input_text_id: &str,
        normalizer_id: &str,
    ) -> Result<Option<NormalizationRow>> {
        Ok(self
            .normalizations
            .iter()
            .find(|entry| {
                entry.input_text_id == input_text_id && entry.normalizer_id == normalizer_id
            })
            .map(|entry| entry.clone()))
    }

    async fn create(&self, row: NormalizationRow) -> Result<()> {
        self.normalizations.insert(row.id.clone(), row);
        Ok(())
    }
}

#[async_trait]
impl NormalizerStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<NormalizerRow> {
        self.normalizers
            .get(id)
            .map(|row| row.clone())
            .ok_or_else(|| ClassifyError::NotFound {
                kind: EntityKind::Normalizer,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl PredictorStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<PredictorRow> {
        self.predictors
            .get(id)
            .map(|row| row.clone())
            .ok_or_else(|| ClassifyError::NotFound {
                kind: EntityKind::Predictor,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl KlassStore for MemoryStore {
    async fn fetch_many(&self, keys: &[Klass]) -> Result<Vec<KlassDetails>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.klasses
                    .get(&(key.id.clone(), key.version))
                    .map(|details| details.clone())
            })
            .collect())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn latest(&self, config_id: &str) -> Result<PipelineConfigVersion> {
        self.configs
            .read()
            .iter()
            .filter(|row| row.classifier_config_id == config_id)
            .max_by_key(|row| row.version_id)
            .cloned()
            .ok_or_else(|| ClassifyError::NotFound {
                kind: EntityKind::Configuration,
                id: config_id.to_string(),
            })
    }

    async fn at_version(&self, config_id: &str, version: i64) -> Result<PipelineConfigVersion> {
        self.configs
            .read()
            .iter()
            .find(|row| row.classifier_config_id == config_id && row.version_id == version)
            .cloned()
            .ok_or_else(|| ClassifyError::NotFound {
                kind: EntityKind::Configuration,
                id: format!("{config_id}@v{version}"),
            })
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn find_cached(
        &self,
        input_text_id: &str,
        normalized_input_text_id: Option<&str>,
        predictor_ids: &[String],
    ) -> Result<Option<RequestRow>> {
        let mut requested: Vec<&str> = predictor_ids.iter().map(String::as_str).collect();
        requested.sort_unstable();

        let requests = self.requests.read();
        let newest = requests
            .iter()
            .filter(|row| {
                if row.input_text_id != input_text_id {
                    return false;
                }
                if row.normalized_input_text_id.as_deref() != normalized_input_text_id {
                    return false;
                }
                let mut stored: Vec<&str> = row.predictor_ids.iter().map(String::as_str).collect();
                stored.sort_unstable();
                stored == requested
            })
            .max_by_key(|row| row.created_at);
        Ok(newest.cloned())
    }

    async fn create(&self, row: RequestRow) -> Result<()> {
        self.requests.write().push(row);
        Ok(())
    }
}
