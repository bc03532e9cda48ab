//! Cross-format index merging with provenance tracking.
//!
//! The merger consumes any mixture of backends through the `entries()`
//! contract, enforces a single embedding model, deduplicates by chunk id
//! (first artifact wins), stamps every surviving chunk with the artifact
//! coordinates that introduced it, and emits a freshly built index of the
//! configured backend.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::{Backend, HnswIndex, InMemoryIndex, VectorIndex};
use crate::types::VectorEntry;

/// Default graph capacity hint when the caller gives none.
const DEFAULT_GRAPH_MAX_ITEMS: usize = 100_000;

/// Accumulates entries from multiple indexes and builds a unified one.
pub struct IndexMerger {
    target_model_id: String,
    dimensions: usize,
    target_backend: Backend,
    graph_max_items: usize,
    seen_ids: HashSet<String>,
    pending: Vec<VectorEntry>,
    rejected: Vec<String>,
}

impl IndexMerger {
    /// Creates a merger targeting `backend`, accepting only sources whose
    /// model id equals `target_model_id`.
    ///
    /// `graph_max_items` sizes the graph backend's capacity; it is
    /// ignored for the in-memory backend.
    #[must_use]
    pub fn new(
        target_model_id: impl Into<String>,
        dimensions: usize,
        backend: Backend,
        graph_max_items: usize,
    ) -> Self {
        Self {
            target_model_id: target_model_id.into(),
            dimensions,
            target_backend: backend,
            graph_max_items,
            seen_ids: HashSet::new(),
            pending: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Creates a merger with the default graph capacity hint.
    #[must_use]
    pub fn for_backend(
        target_model_id: impl Into<String>,
        dimensions: usize,
        backend: Backend,
    ) -> Self {
        Self::new(target_model_id, dimensions, backend, DEFAULT_GRAPH_MAX_ITEMS)
    }

    /// Adds all entries from an index, stamping them with `artifact_coords`.
    ///
    /// Returns false and records the coordinates when the source's model
    /// does not match the target; chunk ids already seen are silently
    /// skipped (the first offering artifact wins).
    pub fn add_index(&mut self, source: &dyn VectorIndex, artifact_coords: &str) -> bool {
        if source.model_id() != self.target_model_id {
            warn!(
                artifact = artifact_coords,
                source_model = source.model_id(),
                target_model = %self.target_model_id,
                "skipping incompatible index"
            );
            self.rejected.push(artifact_coords.to_string());
            return false;
        }

        let entries = source.entries();
        let offered = entries.len();
        let mut added = 0usize;
        for entry in entries {
            if self.seen_ids.contains(&entry.chunk.id) {
                continue;
            }
            self.seen_ids.insert(entry.chunk.id.clone());
            let stamped = entry.chunk.with_artifact(artifact_coords);
            self.pending.push(VectorEntry::new(stamped, entry.vector));
            added += 1;
        }
        info!(
            artifact = artifact_coords,
            added,
            skipped = offered - added,
            "absorbed index entries"
        );
        true
    }

    /// Builds the merged index from all accepted entries.
    ///
    /// The merger's pending state is left intact; callers that want to
    /// reuse the merger should construct a fresh one instead.
    pub fn build(&self) -> Result<Box<dyn VectorIndex>> {
        if self.dimensions == 0 {
            return Err(IndexError::DimensionUndetermined);
        }
        let config = IndexConfig::for_model(self.target_model_id.clone(), self.dimensions);

        let mut target: Box<dyn VectorIndex> = match self.target_backend {
            Backend::Hnsw => {
                let capacity = (self.pending.len() * 2).max(self.graph_max_items);
                Box::new(HnswIndex::with_capacity(config, capacity))
            }
            Backend::InMemory => Box::new(InMemoryIndex::new(config)),
        };

        target.add_all(self.pending.clone())?;
        Ok(target)
    }

    /// Artifact coordinates rejected for model incompatibility, in offer
    /// order.
    #[must_use]
    pub fn rejected_artifacts(&self) -> &[String] {
        &self.rejected
    }

    /// Number of entries pending after deduplication.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for IndexMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMerger")
            .field("target_model_id", &self.target_model_id)
            .field("dimensions", &self.dimensions)
            .field("target_backend", &self.target_backend)
            .field("pending", &self.pending.len())
            .field("rejected", &self.rejected.len())
            .finish()
    }
}
