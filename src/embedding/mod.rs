//! Embedding generation for semantic indexing and retrieval.
//!
//! Wraps an external text→vector provider behind the [`Embedder`] trait.
//! A deterministic hash-based fallback is always available; real semantic
//! embeddings come from `FastEmbed` when the feature is enabled.
//!
//! # Feature Flags
//!
//! - `fastembed-embeddings`: Enables `FastEmbed` with all-MiniLM-L6-v2 (384 dimensions)
//! - Without the feature: Uses hash-based fallback (deterministic but not semantic)

mod fallback;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackEmbedder;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::error::{EmbeddingError, Result};
use std::sync::Arc;

/// Default embedding dimensions for the all-MiniLM-L6-v2 model.
///
/// This is the authoritative source for embedding dimensions across the
/// codebase. The vector index and config validation both use this constant.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Default per-request cap on batch size.
pub const DEFAULT_MAX_BATCH: usize = 100;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`): the indexing
/// pipeline may keep several batches in flight concurrently.
///
/// # Examples
///
/// ```
/// use promptpack::embedding::{Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};
///
/// let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
/// let embedding = embedder.embed("fn main() {}").unwrap();
/// assert_eq!(embedding.len(), DEFAULT_DIMENSIONS);
/// ```
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// The provider's per-request batch cap. [`Embedder::embed_batch`]
    /// rejects larger batches.
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts, preserving order.
    ///
    /// A batch either fully succeeds or fully fails; no partial results.
    /// The default implementation calls `embed` for each text sequentially.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails for any text or the batch
    /// exceeds [`Embedder::max_batch_size`].
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.len() > self.max_batch_size() {
            return Err(EmbeddingError::BatchTooLarge {
                size: texts.len(),
                max: self.max_batch_size(),
            }
            .into());
        }
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Chains a primary embedder with a fallback provider.
///
/// On primary failure the same input is retried against the fallback; the
/// caller picks this behavior over plain retry by constructing the chain.
/// Both providers must agree on dimensions.
pub struct EmbedderWithFallback {
    primary: Arc<dyn Embedder>,
    fallback: Arc<dyn Embedder>,
}

impl EmbedderWithFallback {
    /// Builds the chain, checking dimension agreement.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::DimensionMismatch`] when the providers
    /// produce vectors of different dimensions.
    pub fn new(primary: Arc<dyn Embedder>, fallback: Arc<dyn Embedder>) -> Result<Self> {
        if primary.dimensions() != fallback.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: primary.dimensions(),
                actual: fallback.dimensions(),
            }
            .into());
        }
        Ok(Self { primary, fallback })
    }
}

impl Embedder for EmbedderWithFallback {
    fn dimensions(&self) -> usize {
        self.primary.dimensions()
    }

    fn max_batch_size(&self) -> usize {
        self.primary
            .max_batch_size()
            .min(self.fallback.max_batch_size())
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match self.primary.embed(text) {
            Ok(vector) => Ok(vector),
            Err(primary_err) => {
                tracing::warn!(error = %primary_err, "primary embedder failed, using fallback");
                self.fallback.embed(text)
            }
        }
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        match self.primary.embed_batch(texts) {
            Ok(vectors) => Ok(vectors),
            Err(primary_err) => {
                tracing::warn!(error = %primary_err, "primary embedder failed, using fallback");
                self.fallback.embed_batch(texts)
            }
        }
    }
}

/// Creates the default embedder based on available features.
///
/// - With `fastembed-embeddings`: Returns `FastEmbedEmbedder`
/// - Without: Returns `FallbackEmbedder`
///
/// # Errors
///
/// Returns an error if embedder initialization fails.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FastEmbedEmbedder::new()?))
}

/// Creates the default embedder based on available features.
///
/// - With `fastembed-embeddings`: Returns `FastEmbedEmbedder`
/// - Without: Returns `FallbackEmbedder`
///
/// # Errors
///
/// Returns an error if embedder initialization fails (never fails for fallback).
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder() -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)))
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value between -1.0 (opposite) and 1.0 (identical).
/// For normalized vectors (L2 norm = 1), this is equivalent to the dot product.
/// Returns 0.0 if the vectors have different lengths or zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_batch_cap_enforced() {
        struct Tiny;
        impl Embedder for Tiny {
            fn dimensions(&self) -> usize {
                4
            }
            fn max_batch_size(&self) -> usize {
                2
            }
            fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![0.0; 4])
            }
        }

        let embedder = Tiny;
        assert!(embedder.embed_batch(&["a", "b"]).is_ok());
        let err = embedder.embed_batch(&["a", "b", "c"]).unwrap_err();
        assert!(err.to_string().contains("exceeds provider cap"));
    }

    #[test]
    fn test_fallback_chain_dimension_check() {
        let a: Arc<dyn Embedder> = Arc::new(FallbackEmbedder::new(8));
        let b: Arc<dyn Embedder> = Arc::new(FallbackEmbedder::new(16));
        assert!(EmbedderWithFallback::new(a, b).is_err());
    }

    #[test]
    fn test_fallback_chain_recovers() {
        struct AlwaysFails;
        impl Embedder for AlwaysFails {
            fn dimensions(&self) -> usize {
                8
            }
            fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Err(crate::error::EmbeddingError::Failed {
                    reason: "provider down".to_string(),
                }
                .into())
            }
        }

        let chain =
            EmbedderWithFallback::new(Arc::new(AlwaysFails), Arc::new(FallbackEmbedder::new(8)))
                .unwrap();

        let vector = chain.embed("hello").unwrap();
        assert_eq!(vector.len(), 8);

        let batch = chain.embed_batch(&["a", "b"]).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_create_embedder() {
        let embedder = create_embedder().unwrap();
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_embed_batch_preserves_order() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let texts = vec!["alpha", "beta", "gamma"];
        let batch = embedder.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0], embedder.embed("alpha").unwrap());
        assert_eq!(batch[2], embedder.embed("gamma").unwrap());
    }
}
