//! Brute-force in-memory index.
//!
//! Scores every stored vector against the query. Exact, predictable, and
//! fast enough up to roughly 100k vectors; above that, prefer
//! [`crate::HnswIndex`].

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::debug;

use crate::chunk::{ChunkKind, CodeChunk};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::format::{self, MAGIC_MVEC};
use crate::index::{Backend, VectorIndex};
use crate::provider::EmbeddingProvider;
use crate::similarity::cosine_similarity;
use crate::types::{DuplicateGroup, IndexStats, SearchResult, VectorEntry};

/// Exhaustive-search index: chunks and vectors in parallel arrays, with
/// an id-to-position map for merge-time deduplication.
pub struct InMemoryIndex {
    config: IndexConfig,
    chunks: Vec<CodeChunk>,
    vectors: Vec<Vec<f32>>,
    id_to_position: HashMap<String, usize>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl InMemoryIndex {
    /// Creates a new empty index.
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            vectors: Vec::new(),
            id_to_position: HashMap::new(),
            provider: None,
        }
    }

    /// Reads the MVEC body, assuming the magic bytes were already
    /// consumed and matched.
    pub(crate) fn read_body(r: &mut impl Read) -> Result<Self> {
        let header = format::read_header(r)?;
        let chunks = format::read_chunks(r)?;

        let config = IndexConfig::for_model(header.model_id, header.dimensions);
        let mut index = Self::new(config);
        for chunk in chunks.into_iter().take(header.chunk_count) {
            let vector = format::read_vector(r, header.dimensions)?;
            index.add(chunk, &vector)?;
        }
        Ok(index)
    }

    /// Loads an index from a reader carrying the MVEC format.
    pub fn load_from(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC_MVEC {
            return Err(IndexError::InvalidMagic { found: magic });
        }
        Self::read_body(&mut r)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(IndexError::MissingEmbeddingProvider)?;
        provider.embed(query).map_err(IndexError::Embedding)
    }

    /// Ranks a pre-scored candidate list: stable descending sort, so ties
    /// keep insertion order, then truncate to `k`.
    fn rank(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        results
    }

    fn estimate_size_bytes(&self) -> u64 {
        let vector_bytes = (self.vectors.len() * self.config.dimensions * 4) as u64;
        let chunk_estimate: u64 = self
            .chunks
            .iter()
            .map(|c| (c.code.len() + c.name.len() + c.file.len() + 100) as u64)
            .sum();
        vector_bytes + chunk_estimate
    }
}

impl VectorIndex for InMemoryIndex {
    fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn backend(&self) -> Backend {
        Backend::InMemory
    }

    fn add(&mut self, chunk: CodeChunk, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;

        let position = self.chunks.len();
        self.id_to_position.insert(chunk.id.clone(), position);
        debug!(chunk = %chunk.name, position, "added chunk");
        self.chunks.push(chunk);
        self.vectors.push(vector.to_vec());
        Ok(())
    }

    fn add_all(&mut self, entries: Vec<VectorEntry>) -> Result<()> {
        for entry in entries {
            self.add(entry.chunk, &entry.vector)?;
        }
        Ok(())
    }

    fn merge(&mut self, other: &dyn VectorIndex) -> Result<()> {
        if self.model_id() != other.model_id() {
            return Err(IndexError::IncompatibleModel {
                expected: self.model_id().to_string(),
                actual: other.model_id().to_string(),
            });
        }

        let Some(source) = other.as_any().downcast_ref::<InMemoryIndex>() else {
            return Err(IndexError::UnsupportedMerge);
        };

        for (chunk, vector) in source.chunks.iter().zip(source.vectors.iter()) {
            if !self.id_to_position.contains_key(&chunk.id) {
                self.add(chunk.clone(), vector)?;
            }
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimensions(query)?;

        let results = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vector)| {
                SearchResult::new(chunk.clone(), cosine_similarity(query, vector))
            })
            .collect();
        Ok(Self::rank(results, k))
    }

    fn search_text(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed(query)?;
        self.search(&query_vector, k)
    }

    fn search_by_kind(
        &self,
        query: &str,
        kind: ChunkKind,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed(query)?;
        if !self.chunks.is_empty() {
            self.check_dimensions(&query_vector)?;
        }

        // Filter first, then rank only the matching kind.
        let results = self
            .chunks
            .iter()
            .zip(self.vectors.iter())
            .filter(|(chunk, _)| chunk.kind == kind)
            .map(|(chunk, vector)| {
                SearchResult::new(chunk.clone(), cosine_similarity(&query_vector, vector))
            })
            .collect();
        Ok(Self::rank(results, k))
    }

    fn find_duplicates(&self, threshold: f32) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        let mut processed = vec![false; self.chunks.len()];

        for i in 0..self.chunks.len() {
            if processed[i] {
                continue;
            }
            processed[i] = true;
            let mut members = vec![self.chunks[i].clone()];

            for j in (i + 1)..self.chunks.len() {
                if processed[j] {
                    continue;
                }
                let similarity = cosine_similarity(&self.vectors[i], &self.vectors[j]);
                if similarity >= threshold {
                    members.push(self.chunks[j].clone());
                    processed[j] = true;
                }
            }

            if members.len() > 1 {
                groups.push(DuplicateGroup::new(threshold, members));
            }
        }
        groups
    }

    fn find_anomalies(&self, threshold: f32) -> Vec<CodeChunk> {
        if self.chunks.len() < 5 {
            return Vec::new();
        }

        let mut anomalies = Vec::new();
        for i in 0..self.chunks.len() {
            let mut total = 0.0f32;
            for j in 0..self.vectors.len() {
                if i != j {
                    total += cosine_similarity(&self.vectors[i], &self.vectors[j]);
                }
            }
            let mean = total / (self.vectors.len() - 1) as f32;
            if mean < threshold {
                anomalies.push(self.chunks[i].clone());
            }
        }
        anomalies
    }

    fn entries(&self) -> Vec<VectorEntry> {
        self.chunks
            .iter()
            .zip(self.vectors.iter())
            .map(|(chunk, vector)| VectorEntry::new(chunk.clone(), vector.clone()))
            .collect()
    }

    fn stats(&self) -> IndexStats {
        let mut by_kind = std::collections::BTreeMap::new();
        let mut files = HashSet::new();
        for chunk in &self.chunks {
            *by_kind.entry(chunk.kind).or_insert(0) += 1;
            files.insert(chunk.file.as_str());
        }
        IndexStats {
            total: self.chunks.len(),
            by_kind,
            file_count: files.len(),
            model_id: self.config.model_id.clone(),
            dimensions: self.config.dimensions,
            size_bytes: self.estimate_size_bytes(),
        }
    }

    fn save(&self, writer: &mut dyn Write) -> Result<()> {
        format::write_header(
            writer,
            &MAGIC_MVEC,
            self.config.dimensions,
            self.chunks.len(),
            &self.config.model_id,
        )?;
        format::write_chunks(writer, &self.chunks)?;
        for vector in &self.vectors {
            format::write_vector(writer, vector)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn size(&self) -> usize {
        self.chunks.len()
    }

    fn set_embedding_provider(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        self.provider = Some(provider);
    }

    fn close(&mut self) {
        // Nothing to release.
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("model_id", &self.config.model_id)
            .field("dimensions", &self.config.dimensions)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
