//! Prefixed identifier generation.
//!
//! Every persisted entity gets an id of the form `{prefix}_{uuid}` so that
//! raw ids in logs and stores are self-describing. Ids are generated lazily
//! at the point of first need (typically persistence), never in
//! constructors.

use uuid::Uuid;

/// Generate a new prefixed id, e.g. `generate("input")` →
/// `input_67e5504410b1426f9247bb680e5fe0c8`.
pub fn generate(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}
