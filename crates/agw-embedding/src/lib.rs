// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// TTL cache for embedding vectors.
pub mod cache;
/// The pluggable vector source and the deterministic reference provider.
pub mod provider;

pub use cache::TtlCache;
pub use provider::{DeterministicProvider, EmbeddingProvider};

use agw_config::EmbeddingConfig;
use agw_core::canonical::canonical_map;
use agw_core::similarity::cosine_similarity;
use agw_core::{Embedding, NormalizedIntent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the embedding service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmbeddingError {
    /// Two vectors of different dimensions were compared, or a provider
    /// returned a vector of the wrong dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Observed dimension.
        actual: usize,
    },

    /// The vector source failed.
    #[error("embedding provider failed: {message}")]
    Provider {
        /// Human-readable detail.
        message: String,
    },
}

impl EmbeddingError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> agw_error::ErrorCode {
        match self {
            Self::DimensionMismatch { .. } => agw_error::ErrorCode::DimensionMismatch,
            Self::Provider { .. } => agw_error::ErrorCode::Internal,
        }
    }
}

// ---------------------------------------------------------------------------
// EmbeddingService
// ---------------------------------------------------------------------------

/// Produces deterministic, L2-normalized embeddings for intents and tool
/// descriptors, cached by canonical text key.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: TtlCache,
    dimensions: usize,
}

impl EmbeddingService {
    /// A service over the given provider and cache TTL.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache_ttl: Duration) -> Self {
        let dimensions = provider.dimensions();
        Self {
            provider,
            cache: TtlCache::new(cache_ttl),
            dimensions,
        }
    }

    /// A service using the deterministic reference provider configured from
    /// [`EmbeddingConfig`].
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self::new(
            Arc::new(DeterministicProvider::new(
                config.embedding_model.clone(),
                config.embedding_dimensions,
            )),
            Duration::from_millis(config.cache_ttl_ms),
        )
    }

    /// The configured vector dimension D.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The cache, exposed for observability.
    #[must_use]
    pub fn cache(&self) -> &TtlCache {
        &self.cache
    }

    /// Embed a normalized intent, keyed by
    /// `intent|category|action|canonical(parameters)`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Provider`] or
    /// [`EmbeddingError::DimensionMismatch`] when the provider misbehaves.
    pub async fn embed_intent(
        &self,
        intent: &NormalizedIntent,
    ) -> Result<Embedding, EmbeddingError> {
        let key = intent_cache_key(intent);
        let text = intent_text(intent);
        self.embed_cached(&key, &text).await
    }

    /// Embed a tool descriptor, keyed by `tool|name`.
    ///
    /// # Errors
    ///
    /// See [`embed_intent`](Self::embed_intent).
    pub async fn embed_tool_description(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Embedding, EmbeddingError> {
        let key = format!("tool|{name}");
        let text = format!("{name}: {description}");
        self.embed_cached(&key, &text).await
    }

    /// Cosine similarity between two embeddings.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::DimensionMismatch`] when the vectors
    /// differ in length.
    pub fn similarity(&self, a: &Embedding, b: &Embedding) -> Result<f64, EmbeddingError> {
        cosine_similarity(&a.vector, &b.vector)
            .map(f64::from)
            .map_err(|e| EmbeddingError::DimensionMismatch {
                expected: e.left,
                actual: e.right,
            })
    }

    async fn embed_cached(&self, key: &str, text: &str) -> Result<Embedding, EmbeddingError> {
        if let Some(vector) = self.cache.get(key) {
            return Ok(Embedding {
                vector,
                model: self.provider.model_id().to_string(),
            });
        }

        debug!(key, "embedding cache miss");
        let mut vector = self.provider.embed(text).await?;
        if vector.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        normalize_in_place(&mut vector);

        self.cache.insert(key, vector.clone());
        Ok(Embedding {
            vector,
            model: self.provider.model_id().to_string(),
        })
    }
}

/// Canonical cache key for an intent.
#[must_use]
pub fn intent_cache_key(intent: &NormalizedIntent) -> String {
    format!(
        "intent|{}|{}|{}",
        intent.category.as_str(),
        intent.action,
        canonical_map(&intent.parameters)
    )
}

/// Deterministic text composition for an intent.
#[must_use]
pub fn intent_text(intent: &NormalizedIntent) -> String {
    format!(
        "Action: {}\nCategory: {}\nTarget: {}\nParameters: {}",
        intent.action,
        intent.category.as_str(),
        intent.target,
        canonical_map(&intent.parameters)
    )
}

fn normalize_in_place(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && (norm - 1.0).abs() > 1e-6 {
        for x in vector {
            *x /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::IntentCategory;
    use async_trait::async_trait;

    fn service() -> EmbeddingService {
        EmbeddingService::from_config(&EmbeddingConfig::default())
    }

    fn intent(action: &str) -> NormalizedIntent {
        let mut intent = NormalizedIntent::new(IntentCategory::ToolCall, action, 1.0);
        intent.target = "tool".into();
        intent
    }

    #[tokio::test]
    async fn intent_embedding_has_configured_dimension_and_unit_norm() {
        let svc = service();
        let e = svc.embed_intent(&intent("search")).await.unwrap();
        assert_eq!(e.dimensions(), 384);
        assert!(e.is_normalized(1e-4));
        assert_eq!(e.model, "deterministic-sha256");
    }

    #[tokio::test]
    async fn equal_intents_share_an_embedding() {
        let svc = service();
        let a = svc.embed_intent(&intent("search")).await.unwrap();
        let b = svc.embed_intent(&intent("search")).await.unwrap();
        assert_eq!(a.vector, b.vector);
        let sim = svc.similarity(&a, &b).unwrap();
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn parameter_order_does_not_change_the_key() {
        let mut a = intent("search");
        a.parameters
            .insert("q".into(), serde_json::json!({"x": 1, "y": 2}));
        let mut b = intent("search");
        b.parameters
            .insert("q".into(), serde_json::json!({"y": 2, "x": 1}));
        assert_eq!(intent_cache_key(&a), intent_cache_key(&b));
    }

    #[tokio::test]
    async fn tool_embedding_is_cached_by_name() {
        let svc = service();
        let first = svc
            .embed_tool_description("t1", "search the web")
            .await
            .unwrap();
        assert_eq!(svc.cache().len(), 1);
        let second = svc
            .embed_tool_description("t1", "search the web")
            .await
            .unwrap();
        assert_eq!(first.vector, second.vector);
        assert_eq!(svc.cache().len(), 1);
    }

    #[tokio::test]
    async fn similarity_is_symmetric() {
        let svc = service();
        let a = svc.embed_tool_description("a", "send email").await.unwrap();
        let b = svc.embed_tool_description("b", "query a database").await.unwrap();
        let ab = svc.similarity(&a, &b).unwrap();
        let ba = svc.similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-9);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_rejected() {
        let svc = service();
        let a = Embedding {
            vector: vec![1.0, 0.0],
            model: "m".into(),
        };
        let b = Embedding {
            vector: vec![1.0, 0.0, 0.0],
            model: "m".into(),
        };
        let err = svc.similarity(&a, &b).unwrap_err();
        assert_eq!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(err.error_code(), agw_error::ErrorCode::DimensionMismatch);
    }

    struct WrongDimsProvider;

    #[async_trait]
    impl EmbeddingProvider for WrongDimsProvider {
        fn model_id(&self) -> &str {
            "broken"
        }
        fn dimensions(&self) -> usize {
            8
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0; 4])
        }
    }

    #[tokio::test]
    async fn provider_returning_wrong_dimension_is_an_error() {
        let svc = EmbeddingService::new(Arc::new(WrongDimsProvider), Duration::from_secs(1));
        let err = svc.embed_intent(&intent("x")).await.unwrap_err();
        assert_eq!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        );
    }

    struct UnnormalizedProvider;

    #[async_trait]
    impl EmbeddingProvider for UnnormalizedProvider {
        fn model_id(&self) -> &str {
            "raw"
        }
        fn dimensions(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![3.0, 0.0, 4.0])
        }
    }

    #[tokio::test]
    async fn service_normalizes_provider_output() {
        let svc = EmbeddingService::new(Arc::new(UnnormalizedProvider), Duration::from_secs(1));
        let e = svc.embed_intent(&intent("x")).await.unwrap();
        assert!(e.is_normalized(1e-6));
        assert!((e.vector[0] - 0.6).abs() < 1e-6);
        assert!((e.vector[2] - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn expired_cache_entry_regenerates_identically() {
        let svc = EmbeddingService::new(
            Arc::new(DeterministicProvider::new("m", 16)),
            Duration::from_millis(10),
        );
        let a = svc.embed_intent(&intent("x")).await.unwrap();
        std::thread::sleep(Duration::from_millis(25));
        let b = svc.embed_intent(&intent("x")).await.unwrap();
        // Miss regenerated deterministically.
        assert_eq!(a.vector, b.vector);
    }
}
