//! Core value types: vector entries, search results, stats, duplicates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkKind, CodeChunk};

/// A code chunk paired with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub chunk: CodeChunk,
    pub vector: Vec<f32>,
}

impl VectorEntry {
    #[must_use]
    pub fn new(chunk: CodeChunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }
}

/// A single result from a similarity query.
///
/// `similarity` is whatever the backend computed (cosine), clamped to
/// `[0.0, 1.0]` at construction; the clamp tolerates floating-point drift
/// on unit-normalized inputs. `artifact_id` mirrors the chunk's provenance
/// slot at the time the result was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    pub similarity: f32,
    pub artifact_id: Option<String>,
}

impl SearchResult {
    /// Wraps a chunk with its raw similarity, clamping to `[0, 1]` and
    /// carrying over the chunk's provenance.
    #[must_use]
    pub fn new(chunk: CodeChunk, similarity: f32) -> Self {
        let artifact_id = chunk.artifact.clone();
        Self {
            chunk,
            similarity: similarity.clamp(0.0, 1.0),
            artifact_id,
        }
    }

    /// Returns the similarity as a percentage string, e.g. `"87.3%"`.
    #[must_use]
    pub fn similarity_percent(&self) -> String {
        format!("{:.1}%", self.similarity * 100.0)
    }
}

impl std::fmt::Display for SearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.2}] {}", self.similarity, self.chunk.qualified_name())?;
        if let Some(artifact) = &self.artifact_id {
            write!(f, " ({artifact})")?;
        }
        write!(f, "\n  {}:{}", self.chunk.file, self.chunk.line_start)
    }
}

/// Statistics about an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of chunks
    pub total: usize,

    /// Chunk counts by kind; lists exactly the kinds present
    pub by_kind: BTreeMap<ChunkKind, usize>,

    /// Number of distinct source files
    pub file_count: usize,

    /// Embedding model identifier
    pub model_id: String,

    /// Vector dimensions
    pub dimensions: usize,

    /// Estimated in-memory size in bytes
    pub size_bytes: u64,
}

/// A group of nearly-duplicate code chunks.
///
/// `similarity` is the floor every member reached against the group
/// representative; `count` always equals `chunks.len()` and is at least 2.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub similarity: f32,
    pub count: usize,
    pub chunks: Vec<CodeChunk>,
}

impl DuplicateGroup {
    #[must_use]
    pub fn new(similarity: f32, chunks: Vec<CodeChunk>) -> Self {
        Self {
            similarity,
            count: chunks.len(),
            chunks,
        }
    }
}
