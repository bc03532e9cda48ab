//! Error types for the vector index core
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use thiserror::Error;

/// Main error type for index operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// A vector's length does not match the index configuration
    #[error(
        "Embedding dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    /// Two indexes built with different embedding models cannot be combined
    #[error(
        "Incompatible embedding models: this index uses '{expected}', the other uses '{actual}'\nSuggestion: Re-embed one of the indexes with a matching model before merging"
    )]
    IncompatibleModel { expected: String, actual: String },

    /// The first four bytes of a stream match neither known format
    #[error("Unknown index format: bad magic bytes {found:?}\nSuggestion: Check that the file is a vector index and not truncated")]
    InvalidMagic { found: [u8; 4] },

    /// The stream declares a format version this build does not understand
    #[error("Unsupported index format version {version}\nSuggestion: Update to a release that reads this version, or re-export the index")]
    UnsupportedFormat { version: u16 },

    /// A text query was issued with no embedding provider attached
    #[error("No embedding provider configured for text queries\nSuggestion: Attach a provider with set_embedding_provider, or search with a pre-computed vector")]
    MissingEmbeddingProvider,

    /// Same-backend merge was asked to cross backends
    #[error("Cannot merge across index backends directly\nSuggestion: Use IndexMerger, which accepts any mixture of backends")]
    UnsupportedMerge,

    /// The merger was built without usable dimensions
    #[error("Merged index dimensions undetermined\nSuggestion: Construct IndexMerger with the embedding model's dimensions")]
    DimensionUndetermined,

    /// A chunk failed construction-time validation
    #[error("Invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    /// Underlying I/O failure during save or load
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chunk JSON payload could not be encoded or decoded
    #[error("Chunk payload error: {0}\nSuggestion: The index file may be corrupted; rebuild it from source")]
    ChunkJson(#[from] serde_json::Error),

    /// The embedding provider failed; its error is passed through unchanged
    #[error("Embedding provider failed: {0}")]
    Embedding(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_message_names_both_sizes() {
        let err = IndexError::DimensionMismatch {
            expected: 768,
            actual: 384,
        };
        let msg = err.to_string();
        assert!(msg.contains("768"));
        assert!(msg.contains("384"));
    }

    #[test]
    fn io_errors_convert() {
        fn load() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"))?;
            Ok(())
        }
        assert!(matches!(load(), Err(IndexError::Io(_))));
    }
}
