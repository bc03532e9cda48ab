//! Index configuration: model identity, dimensions, graph tuning.

use serde::{Deserialize, Serialize};

/// Default max connections per graph node on non-ground layers.
pub const DEFAULT_M: usize = 16;

/// Default candidate-set width during graph construction.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default candidate-set width during graph queries.
pub const DEFAULT_EF_SEARCH: usize = 50;

/// Configuration for creating a vector index.
///
/// Two configurations are compatible iff their `model_id` values are
/// equal; equal models imply equal dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding model identifier
    pub model_id: String,

    /// Vector dimensions
    pub dimensions: usize,

    /// Graph M parameter (max connections per non-ground layer)
    pub m: usize,

    /// Graph efConstruction parameter
    pub ef_construction: usize,

    /// Graph efSearch parameter
    pub ef_search: usize,
}

impl IndexConfig {
    /// Creates a configuration for a specific model with default graph
    /// tuning.
    #[must_use]
    pub fn for_model(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }

    /// True when `other` was produced by the same embedding model.
    #[must_use]
    pub fn is_compatible_with(&self, other: &IndexConfig) -> bool {
        self.model_id == other.model_id
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::for_model("microsoft/unixcoder-base", 768)
    }
}
