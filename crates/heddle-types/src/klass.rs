//! Versioned classification labels ("klasses").
//!
//! A klass is identified by `(id, version)`. Klass versions are immutable
//! once created: a change to a klass's name or description is a new version
//! row, never a mutation of an existing one.

use serde::{Deserialize, Serialize};

/// A reference to one version of a klass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Klass {
    /// Stable klass identifier, shared by all versions.
    pub id: String,

    /// Version number, monotonically increasing per klass id.
    pub version: i64,
}

/// A klass version with its human-readable payload attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlassDetails {
    /// Stable klass identifier, shared by all versions.
    pub id: String,

    /// Version number, monotonically increasing per klass id.
    pub version: i64,

    /// Display name, shown to the LLM predictor and to callers.
    pub name: String,

    /// Description, shown to the LLM predictor alongside the name.
    pub description: String,
}

impl KlassDetails {
    /// The `(id, version)` reference for this klass version.
    pub fn key(&self) -> Klass {
        Klass {
            id: self.id.clone(),
            version: self.version,
        }
    }
}
