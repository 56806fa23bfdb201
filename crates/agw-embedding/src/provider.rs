// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pluggable vector source.

use crate::EmbeddingError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Produces a raw vector for a piece of text.
///
/// Implementations must return vectors of a fixed dimension; the service
/// normalizes and validates them. An HTTP client talking to a real model is
/// a drop-in replacement for the deterministic reference provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier of the producing model, stored with each embedding.
    fn model_id(&self) -> &str;

    /// The dimension of vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed `text` into a vector of [`dimensions`](Self::dimensions)
    /// components.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Provider`] when the vector source fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Deterministic reference provider.
///
/// Seeds an xorshift generator with a SHA-256 hash of the text, so equal
/// texts always embed identically and distinct texts land far apart. The
/// output is L2-normalized.
#[derive(Debug, Clone)]
pub struct DeterministicProvider {
    model_id: String,
    dimensions: usize,
}

impl DeterministicProvider {
    /// A provider producing `dimensions`-component vectors under the given
    /// model tag.
    #[must_use]
    pub fn new(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimensions,
        }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut seed = u64::from_le_bytes(digest[..8].try_into().expect("digest has 32 bytes"));
        // xorshift64* degenerates on a zero seed.
        seed |= 1;

        let mut vector: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 7;
                seed ^= seed << 17;
                let scrambled = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                // Map the top 24 bits into [-1.0, 1.0).
                let unit = (scrambled >> 40) as f32 / (1u64 << 24) as f32;
                unit * 2.0 - 1.0
            })
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.generate(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> DeterministicProvider {
        DeterministicProvider::new("deterministic-sha256", 384)
    }

    #[tokio::test]
    async fn equal_texts_embed_identically() {
        let p = provider();
        let a = p.embed("hello world").await.unwrap();
        let b = p.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn distinct_texts_embed_differently() {
        let p = provider();
        let a = p.embed("hello").await.unwrap();
        let b = p.embed("goodbye").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn output_has_configured_dimension() {
        for dims in [4, 128, 384, 512] {
            let p = DeterministicProvider::new("m", dims);
            let v = p.embed("x").await.unwrap();
            assert_eq!(v.len(), dims);
        }
    }

    #[tokio::test]
    async fn output_is_l2_normalized() {
        let v = provider().embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[tokio::test]
    async fn empty_text_still_embeds() {
        let v = provider().embed("").await.unwrap();
        assert_eq!(v.len(), 384);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
