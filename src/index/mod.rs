//! The index contract and format auto-detection.
//!
//! Two interchangeable backends implement [`VectorIndex`]: the exhaustive
//! [`InMemoryIndex`] and the approximate [`HnswIndex`]. Callers that do
//! not care which one they hold traffic in `Box<dyn VectorIndex>`;
//! [`load`] picks the right decoder from the magic bytes.

mod graph;
mod hnsw;
mod memory;

pub use graph::ProximityGraph;
pub use hnsw::HnswIndex;
pub use memory::InMemoryIndex;

use std::any::Any;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::chunk::{ChunkKind, CodeChunk};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::format::{self, MAGIC_MHNS, MAGIC_MVEC};
use crate::provider::EmbeddingProvider;
use crate::types::{DuplicateGroup, IndexStats, SearchResult, VectorEntry};

/// Identifies which concrete backend an index uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Brute-force exact search, suitable up to ~100k vectors
    InMemory,
    /// Hierarchical proximity graph, recommended above ~10k vectors
    Hnsw,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::InMemory => f.write_str("in-memory"),
            Backend::Hnsw => f.write_str("hnsw"),
        }
    }
}

/// A store of code chunks with their embeddings, searchable by vector or
/// text similarity.
///
/// One index instance is single-threaded for mutation; a fully built
/// index may be shared for read-only operations.
pub trait VectorIndex: std::fmt::Debug {
    /// The configuration this index was created with.
    fn config(&self) -> &IndexConfig;

    /// Which backend this index is.
    fn backend(&self) -> Backend;

    /// Adds a chunk with its embedding. The vector is copied into
    /// internal storage. Fails on dimension mismatch.
    fn add(&mut self, chunk: CodeChunk, vector: &[f32]) -> Result<()>;

    /// Adds entries in order, with the same constraints as [`add`].
    ///
    /// [`add`]: VectorIndex::add
    fn add_all(&mut self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Absorbs another index of the same backend, skipping chunk ids
    /// already present (first-wins). Fails with `IncompatibleModel` on a
    /// model mismatch and `UnsupportedMerge` across backends; use
    /// [`crate::IndexMerger`] for the cross-backend path.
    fn merge(&mut self, other: &dyn VectorIndex) -> Result<()>;

    /// Searches with a pre-computed query vector, returning the `k`
    /// highest-scoring results in descending similarity.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Embeds `query` through the attached provider, then searches.
    fn search_text(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    /// Text search restricted to chunks of one kind.
    fn search_by_kind(&self, query: &str, kind: ChunkKind, k: usize)
        -> Result<Vec<SearchResult>>;

    /// Finds groups of near-duplicate chunks at or above `threshold`.
    fn find_duplicates(&self, threshold: f32) -> Vec<DuplicateGroup>;

    /// Finds chunks whose mean similarity to their peers falls below
    /// `threshold`. Returns empty for indexes smaller than 5 chunks.
    fn find_anomalies(&self, threshold: f32) -> Vec<CodeChunk>;

    /// An ordered snapshot of all entries; vectors are defensive copies.
    fn entries(&self) -> Vec<VectorEntry>;

    /// Statistics about the indexed corpus.
    fn stats(&self) -> IndexStats;

    /// Serializes the index to a writer in its backend's wire format.
    fn save(&self, writer: &mut dyn Write) -> Result<()>;

    /// Number of indexed chunks.
    fn size(&self) -> usize;

    /// Attaches (or replaces) the provider used by textual searches.
    fn set_embedding_provider(&mut self, provider: Arc<dyn EmbeddingProvider>);

    /// Releases any resources held by the index.
    fn close(&mut self);

    /// Downcast seam for same-backend merges.
    fn as_any(&self) -> &dyn Any;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    fn model_id(&self) -> &str {
        &self.config().model_id
    }

    /// Hash of the embedding model for compatibility checks.
    fn model_hash(&self) -> i64 {
        format::model_hash(self.model_id())
    }

    fn dimensions(&self) -> usize {
        self.config().dimensions
    }

    /// Serializes the index to an owned byte buffer.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.save(&mut buf)?;
        Ok(buf)
    }

    /// Saves the index to a file.
    fn save_to_path(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.save(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Creates a new empty brute-force index.
#[must_use]
pub fn create(config: IndexConfig) -> InMemoryIndex {
    InMemoryIndex::new(config)
}

/// Creates a new graph-backed index with the default capacity hint.
#[must_use]
pub fn create_hnsw(config: IndexConfig) -> HnswIndex {
    HnswIndex::new(config)
}

/// Creates a new graph-backed index sized for `max_items` entries.
#[must_use]
pub fn create_hnsw_with_capacity(config: IndexConfig, max_items: usize) -> HnswIndex {
    HnswIndex::with_capacity(config, max_items)
}

/// Loads an index from a file, auto-detecting the format from the magic
/// bytes.
pub fn load(path: &Path) -> Result<Box<dyn VectorIndex>> {
    let reader = BufReader::new(File::open(path)?);
    load_from(reader)
}

/// Loads an index from a reader, auto-detecting the format.
///
/// The four magic bytes are consumed here; the matching decoder reads the
/// rest of the stream.
pub fn load_from(mut reader: impl Read) -> Result<Box<dyn VectorIndex>> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    match magic {
        MAGIC_MVEC => {
            let index = InMemoryIndex::read_body(&mut reader)?;
            tracing::info!(chunks = index.size(), "loaded in-memory index");
            Ok(Box::new(index))
        }
        MAGIC_MHNS => {
            let index = HnswIndex::read_body(&mut reader)?;
            tracing::info!(chunks = index.size(), "loaded hnsw index");
            Ok(Box::new(index))
        }
        found => Err(IndexError::InvalidMagic { found }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unknown_magic_is_rejected() {
        let bytes = b"NOPE and then some trailing garbage".to_vec();
        let err = load_from(Cursor::new(bytes)).unwrap_err();
        match err {
            IndexError::InvalidMagic { found } => assert_eq!(&found, b"NOPE"),
            other => panic!("expected InvalidMagic, got {other}"),
        }
    }

    #[test]
    fn truncated_stream_is_io_error() {
        let err = load_from(Cursor::new(vec![0x4du8, 0x56])).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[test]
    fn backend_display() {
        assert_eq!(Backend::InMemory.to_string(), "in-memory");
        assert_eq!(Backend::Hnsw.to_string(), "hnsw");
    }
}
