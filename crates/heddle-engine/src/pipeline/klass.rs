//! The klass resolver: per-run cache over the klass-version store.
//!
//! Resolution batches all cache misses into one bulk fetch. A pair that is
//! still missing after the fetch is a data-integrity violation (a
//! predictor referenced a klass version that was never created) and fails
//! the resolution; it is never silently skipped.
//!
//! The cache is owned by a single pipeline run and is never shared across
//! concurrent requests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use heddle_types::{ClassifyError, EntityKind, Klass, KlassDetails, PipelineDefinition, Result};

use crate::store::KlassStore;

/// Resolves `(id, version)` klass references to their details.
pub struct KlassResolver {
    store: Arc<dyn KlassStore>,
    cache: Mutex<HashMap<(String, i64), KlassDetails>>,
}

impl KlassResolver {
    /// An empty resolver over the given store.
    pub fn new(store: Arc<dyn KlassStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A resolver seeded with the pipeline's known klass list.
    pub fn from_pipeline(pipeline: &PipelineDefinition, store: Arc<dyn KlassStore>) -> Self {
        let resolver = Self::new(store);
        {
            let mut cache = resolver.cache.lock();
            for details in &pipeline.klass_list {
                cache.insert((details.id.clone(), details.version), details.clone());
            }
        }
        resolver
    }

    /// Resolve every requested pair, in request order.
    pub async fn resolve(&self, requested: &[Klass]) -> Result<Vec<KlassDetails>> {
        let pending: Vec<Klass> = {
            let cache = self.cache.lock();
            let mut seen = HashSet::new();
            requested
                .iter()
                .filter(|klass| {
                    !cache.contains_key(&(klass.id.clone(), klass.version))
                        && seen.insert((klass.id.clone(), klass.version))
                })
                .cloned()
                .collect()
        };

        if !pending.is_empty() {
            debug!(pending = pending.len(), "bulk fetching klass versions");
            let fetched = self.store.fetch_many(&pending).await?;
            let mut cache = self.cache.lock();
            for details in fetched {
                cache.insert((details.id.clone(), details.version), details);
            }
        }

        let cache = self.cache.lock();
        requested
            .iter()
            .map(|klass| {
                cache
                    .get(&(klass.id.clone(), klass.version))
                    .cloned()
                    .ok_or_else(|| ClassifyError::NotFound {
                        kind: EntityKind::Klass,
                        id: format!("{}@v{}", klass.id, klass.version),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn details(id: &str, version: i64, name: &str) -> KlassDetails {
        KlassDetails {
            id: id.into(),
            version,
            name: name.into(),
            description: format!("{name} things"),
        }
    }

    #[tokio::test]
    async fn resolves_from_store_and_caches() {
        let store = Arc::new(MemoryStore::new());
        store.insert_klass(details("billing", 1, "billing"));
        store.insert_klass(details("shipping", 2, "shipping"));

        let resolver = KlassResolver::new(store);
        let resolved = resolver
            .resolve(&[
                Klass {
                    id: "billing".into(),
                    version: 1,
                },
                Klass {
                    id: "shipping".into(),
                    version: 2,
                },
            ])
            .await
            .unwrap();
        assert_eq!(resolved[0].name, "billing");
        assert_eq!(resolved[1].name, "shipping");
    }

    #[tokio::test]
    async fn seeded_klasses_skip_the_store() {
        // The store is empty; a seeded pipeline list must be enough.
        let store = Arc::new(MemoryStore::new());
        let pipeline = PipelineDefinition {
            classifier_id: "classifier_1".into(),
            normalizer: None,
            fine_tuned_predictor: None,
            llm_predictor: None,
            klass_list: vec![details("billing", 1, "billing")],
        };
        let resolver = KlassResolver::from_pipeline(&pipeline, store);
        let resolved = resolver
            .resolve(&[Klass {
                id: "billing".into(),
                version: 1,
            }])
            .await
            .unwrap();
        assert_eq!(resolved[0].name, "billing");
    }

    #[tokio::test]
    async fn missing_version_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        store.insert_klass(details("billing", 1, "billing"));

        let resolver = KlassResolver::new(store);
        let err = resolver
            .resolve(&[Klass {
                id: "billing".into(),
                version: 9,
            }])
            .await
            .unwrap_err();
        match err {
            ClassifyError::NotFound { kind, id } => {
                assert_eq!(kind, EntityKind::Klass);
                assert_eq!(id, "billing@v9");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_requests_resolve_in_order() {
        let store = Arc::new(MemoryStore::new());
        store.insert_klass(details("billing", 1, "billing"));

        let resolver = KlassResolver::new(store);
        let key = Klass {
            id: "billing".into(),
            version: 1,
        };
        let resolved = resolver
            .resolve(&[key.clone(), key.clone(), key])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 3);
    }
}
