//! Query-time embedding provider interface.
//!
//! The core never generates embeddings itself. Textual search variants
//! turn the query into a vector through a provider attached to the index;
//! provider failures surface to the caller unchanged.

/// Error type providers are free to return; it is passed through as
/// [`crate::IndexError::Embedding`].
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

/// Turns a text query into an embedding vector.
///
/// Implementations must produce vectors whose length equals the owning
/// index's dimensions. They should be thread-safe; an `Arc<dyn
/// EmbeddingProvider>` may be shared across read-only index handles.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text query.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

impl<F> EmbeddingProvider for F
where
    F: Fn(&str) -> Result<Vec<f32>, ProviderError> + Send + Sync,
{
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_providers() {
        let provider = |text: &str| -> Result<Vec<f32>, ProviderError> {
            Ok(vec![text.len() as f32, 1.0])
        };
        let vector = provider.embed("abc").unwrap();
        assert_eq!(vector, vec![3.0, 1.0]);
    }

    #[test]
    fn provider_errors_pass_through() {
        let failing = |_: &str| -> Result<Vec<f32>, ProviderError> {
            Err("model not loaded".into())
        };
        let err = failing.embed("query").unwrap_err();
        assert_eq!(err.to_string(), "model not loaded");
    }
}
