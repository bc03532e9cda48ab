//! Embedding indexes for code chunks.
//!
//! This crate stores, searches, and merges collections of
//! fixed-dimensional embedding vectors attached to code-fragment records.
//! Build tools serialize one codebase's embeddings into a distributable
//! binary artifact; consumers load many such artifacts, merge them under
//! strict model-compatibility rules, and run similarity search, duplicate
//! detection, and anomaly detection across the merged corpus.
//!
//! # Usage Example
//!
//! ```no_run
//! use code_vectors::{create, load, ChunkKind, CodeChunk, IndexConfig, VectorIndex};
//!
//! # fn main() -> code_vectors::Result<()> {
//! // Build side: collect chunks with their embeddings.
//! let mut index = create(IndexConfig::for_model("my-model", 768));
//! let chunk = CodeChunk::of(
//!     "UserService.findById",
//!     ChunkKind::Method,
//!     "User findById(Long id) { ... }",
//!     "src/UserService.java",
//!     10,
//!     25,
//! )?;
//! index.add(chunk, &[0.0; 768])?;
//! index.save_to_path(std::path::Path::new("vectors.mvec"))?;
//!
//! // Query side: format is auto-detected from the magic bytes.
//! let loaded = load(std::path::Path::new("vectors.mvec"))?;
//! let results = loaded.search(&[0.0; 768], 10)?;
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod merger;
pub mod provider;
pub mod similarity;
pub mod types;

// Explicit exports for better API clarity
pub use chunk::{ChunkKind, CodeChunk};
pub use config::{IndexConfig, DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M};
pub use error::{IndexError, Result};
pub use index::{
    create, create_hnsw, create_hnsw_with_capacity, load, load_from, Backend, HnswIndex,
    InMemoryIndex, ProximityGraph, VectorIndex,
};
pub use merger::IndexMerger;
pub use provider::{EmbeddingProvider, ProviderError};
pub use similarity::{cosine_distance, cosine_similarity, normalize, normalized};
pub use types::{DuplicateGroup, IndexStats, SearchResult, VectorEntry};
