//! Graph-backed approximate index.
//!
//! Pairs the chunk store with a [`ProximityGraph`] for sub-linear
//! queries. Recommended above ~10k vectors; below that the brute-force
//! [`crate::InMemoryIndex`] is simpler and exact.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use tracing::{debug, info};

use crate::chunk::{ChunkKind, CodeChunk};
use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::format::{self, MAGIC_MHNS};
use crate::index::graph::ProximityGraph;
use crate::index::{Backend, VectorIndex};
use crate::provider::EmbeddingProvider;
use crate::types::{DuplicateGroup, IndexStats, SearchResult, VectorEntry};

/// Default pre-sizing when no capacity hint is given.
const DEFAULT_MAX_ITEMS: usize = 100_000;

/// Neighborhood width scanned per representative during duplicate
/// grouping.
const DUPLICATE_NEIGHBORHOOD: usize = 20;

/// Nearest-neighbor count averaged for anomaly scoring (excluding self).
const ANOMALY_NEIGHBORS: usize = 10;

/// Approximate-nearest-neighbor index over a hierarchical proximity
/// graph.
///
/// Chunks live in insertion order; their vectors live in the graph, keyed
/// by chunk id. Graph node ordinals equal chunk positions because both
/// grow in lockstep.
pub struct HnswIndex {
    config: IndexConfig,
    chunks: Vec<CodeChunk>,
    id_to_position: HashMap<String, usize>,
    graph: ProximityGraph,
    provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl HnswIndex {
    /// Creates an empty index with the default capacity hint.
    #[must_use]
    pub fn new(config: IndexConfig) -> Self {
        Self::with_capacity(config, DEFAULT_MAX_ITEMS)
    }

    /// Creates an empty index pre-sized for `max_items` entries.
    #[must_use]
    pub fn with_capacity(config: IndexConfig, max_items: usize) -> Self {
        let graph = ProximityGraph::new(
            config.dimensions,
            config.m,
            config.ef_construction,
            max_items,
        );
        debug!(
            dimensions = config.dimensions,
            max_items, "created hnsw index"
        );
        Self {
            config,
            chunks: Vec::new(),
            id_to_position: HashMap::new(),
            graph,
            provider: None,
        }
    }

    /// Reads the MHNS body, assuming the magic bytes were already
    /// consumed and matched.
    pub(crate) fn read_body(r: &mut impl Read) -> Result<Self> {
        let header = format::read_header(r)?;
        let chunks = format::read_chunks(r)?;

        let blob_len = format::read_i32(r)?;
        if blob_len < 0 {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("negative graph image length: {blob_len}"),
            )));
        }
        let mut blob = vec![0u8; blob_len as usize];
        r.read_exact(&mut blob)?;

        let config = IndexConfig::for_model(header.model_id, header.dimensions);
        let graph = ProximityGraph::read_image(
            &mut Cursor::new(blob),
            config.dimensions,
            config.m,
            config.ef_construction,
        )?;

        if graph.len() != chunks.len() {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "graph image holds {} nodes but the chunk table holds {}",
                    graph.len(),
                    chunks.len()
                ),
            )));
        }

        let mut index = Self {
            config,
            chunks: Vec::with_capacity(chunks.len()),
            id_to_position: HashMap::with_capacity(chunks.len()),
            graph,
            provider: None,
        };
        for (position, chunk) in chunks.into_iter().enumerate() {
            index.id_to_position.insert(chunk.id.clone(), position);
            index.chunks.push(chunk);
        }
        Ok(index)
    }

    /// Loads an index from a reader carrying the MHNS format.
    pub fn load_from(mut r: impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC_MHNS {
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

    /// Runs a graph query and wraps the hits; similarity is
    /// `1 - cosine distance`.
    fn graph_search(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        self.graph
            .search(query, k, self.config.ef_search)
            .into_iter()
            .map(|(position, distance)| {
                SearchResult::new(self.chunks[position].clone(), 1.0 - distance)
            })
            .collect()
    }

    fn estimate_size_bytes(&self) -> u64 {
        let vector_bytes = (self.chunks.len() * self.config.dimensions * 4) as u64;
        let graph_overhead = (self.chunks.len() * self.config.m * 8) as u64;
        let chunk_estimate: u64 = self
            .chunks
            .iter()
            .map(|c| (c.code.len() + c.name.len() + c.file.len() + 100) as u64)
            .sum();
        vector_bytes + graph_overhead + chunk_estimate
    }
}

impl VectorIndex for HnswIndex {
    fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn backend(&self) -> Backend {
        Backend::Hnsw
    }

    fn add(&mut self, chunk: CodeChunk, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;

        let position = self.chunks.len();
        self.id_to_position.insert(chunk.id.clone(), position);
        self.graph.insert(chunk.id.clone(), vector.to_vec());
        debug!(chunk = %chunk.name, position, "added chunk to graph");
        self.chunks.push(chunk);
        Ok(())
    }

    fn add_all(&mut self, entries: Vec<VectorEntry>) -> Result<()> {
        let count = entries.len();
        for entry in entries {
            self.add(entry.chunk, &entry.vector)?;
        }
        info!(count, "batch added chunks to graph");
        Ok(())
    }

    fn merge(&mut self, other: &dyn VectorIndex) -> Result<()> {
        if self.model_id() != other.model_id() {
            return Err(IndexError::IncompatibleModel {
                expected: self.model_id().to_string(),
                actual: other.model_id().to_string(),
            });
        }

        let Some(source) = other.as_any().downcast_ref::<HnswIndex>() else {
            return Err(IndexError::UnsupportedMerge);
        };

        for chunk in &source.chunks {
            if self.id_to_position.contains_key(&chunk.id) {
                continue;
            }
            if let Some(vector) = source.graph.vector(&chunk.id) {
                let vector = vector.to_vec();
                self.add(chunk.clone(), &vector)?;
            }
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimensions(query)?;
        Ok(self.graph_search(query, k))
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
        if self.chunks.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimensions(&query_vector)?;

        // Over-fetch, then filter: an approximate top-k filtered after the
        // fact would starve rare kinds.
        let fetch = (k.saturating_mul(10)).min(self.chunks.len());
        let results = self
            .graph_search(&query_vector, fetch)
            .into_iter()
            .filter(|r| r.chunk.kind == kind)
            .take(k)
            .collect();
        Ok(results)
    }

    fn find_duplicates(&self, threshold: f32) -> Vec<DuplicateGroup> {
        let mut groups = Vec::new();
        let mut processed = vec![false; self.chunks.len()];
        let distance_threshold = 1.0 - threshold;

        for i in 0..self.chunks.len() {
            if processed[i] {
                continue;
            }
            let Some(vector) = self.graph.vector(&self.chunks[i].id) else {
                continue;
            };
            let vector = vector.to_vec();

            let neighbors =
                self.graph
                    .search(&vector, DUPLICATE_NEIGHBORHOOD, self.config.ef_search);

            processed[i] = true;
            let mut members = vec![self.chunks[i].clone()];
            for (position, distance) in neighbors {
                if position != i && !processed[position] && distance <= distance_threshold {
                    members.push(self.chunks[position].clone());
                    processed[position] = true;
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
            let Some(vector) = self.graph.vector(&self.chunks[i].id) else {
                continue;
            };
            let vector = vector.to_vec();

            // +1 because the node itself comes back first.
            let neighbors =
                self.graph
                    .search(&vector, ANOMALY_NEIGHBORS + 1, self.config.ef_search);

            let mut total = 0.0f32;
            let mut count = 0usize;
            for (position, distance) in neighbors {
                if position != i {
                    total += 1.0 - distance;
                    count += 1;
                }
            }
            if count > 0 && total / (count as f32) < threshold {
                anomalies.push(self.chunks[i].clone());
            }
        }
        anomalies
    }

    fn entries(&self) -> Vec<VectorEntry> {
        self.chunks
            .iter()
            .map(|chunk| {
                let vector = self
                    .graph
                    .vector(&chunk.id)
                    .map(<[f32]>::to_vec)
                    .unwrap_or_default();
                VectorEntry::new(chunk.clone(), vector)
            })
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
            &MAGIC_MHNS,
            self.config.dimensions,
            self.chunks.len(),
            &self.config.model_id,
        )?;
        format::write_chunks(writer, &self.chunks)?;

        let mut image = Vec::new();
        self.graph.write_image(&mut image)?;
        format::write_i32(writer, image.len() as i32)?;
        writer.write_all(&image)?;
        writer.flush()?;

        info!(
            chunks = self.chunks.len(),
            image_bytes = image.len(),
            "saved hnsw index"
        );
        Ok(())
    }

    fn size(&self) -> usize {
        self.chunks.len()
    }

    fn set_embedding_provider(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        self.provider = Some(provider);
    }

    fn close(&mut self) {
        self.graph.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("model_id", &self.config.model_id)
            .field("dimensions", &self.config.dimensions)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
