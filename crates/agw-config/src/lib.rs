// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Semantic validation failure for a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid config: {reasons:?}")]
pub struct ConfigError {
    /// Individual validation failure messages.
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

/// Embedding service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model identifier stored with each embedding.
    pub embedding_model: String,
    /// Vector dimension D.
    pub embedding_dimensions: usize,
    /// Cache time-to-live in milliseconds.
    pub cache_ttl_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_model: "deterministic-sha256".into(),
            embedding_dimensions: 384,
            cache_ttl_ms: 300_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Intent router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum cosine similarity for a tool to be considered.
    pub similarity_threshold: f64,
    /// Minimum adjusted confidence for a tool to survive filtering.
    pub min_confidence: f64,
    /// Maximum number of fallback tools in a decision.
    pub max_alternatives: usize,
    /// Multiply confidence by a cost preference factor when the tool
    /// carries a cost estimate.
    pub optimize_cost: bool,
    /// Multiply confidence by a latency preference factor when the tool
    /// carries a latency estimate.
    pub optimize_latency: bool,
    /// Routing deadline in milliseconds.
    pub deadline_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            min_confidence: 0.70,
            max_alternatives: 3,
            optimize_cost: false,
            optimize_latency: false,
            deadline_ms: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// Sandbox pool
// ---------------------------------------------------------------------------

/// Sandbox pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SandboxPoolConfig {
    /// Floor the warmer keeps the pool at.
    pub min_instances: usize,
    /// Hard ceiling on live sandboxes.
    pub max_instances: usize,
    /// Idle time after which a ready sandbox is reaped, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Maintenance loop period, in milliseconds.
    pub warmup_interval_ms: u64,
}

impl Default for SandboxPoolConfig {
    fn default() -> Self {
        Self {
            min_instances: 2,
            max_instances: 100,
            idle_timeout_ms: 300_000,
            warmup_interval_ms: 60_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit stream
// ---------------------------------------------------------------------------

/// Audit stream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AuditConfig {
    /// Buffered entries before a synchronous flush.
    pub buffer_size: usize,
    /// Periodic flush interval, in milliseconds.
    pub flush_interval_ms: u64,
    /// Sink-level retention horizon, in days.
    pub retention_days: u32,
    /// Whether the sink compresses persisted batches.
    pub compression: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            flush_interval_ms: 5_000,
            retention_days: 90,
            compression: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Every configuration key the gateway core recognizes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    /// Embedding service settings.
    pub embedding: EmbeddingConfig,
    /// Intent router settings.
    pub router: RouterConfig,
    /// Sandbox pool settings.
    pub sandbox: SandboxPoolConfig,
    /// Audit stream settings.
    pub audit: AuditConfig,
}

impl GatewayConfig {
    /// Validate cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] listing every violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut reasons = Vec::new();

        if self.embedding.embedding_dimensions == 0 {
            reasons.push("embedding_dimensions must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.router.similarity_threshold) {
            reasons.push("similarity_threshold must lie in [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.router.min_confidence) {
            reasons.push("min_confidence must lie in [0, 1]".to_string());
        }
        if self.sandbox.max_instances == 0 {
            reasons.push("sandbox.max_instances must be positive".to_string());
        }
        if self.sandbox.min_instances > self.sandbox.max_instances {
            reasons.push(format!(
                "sandbox.min_instances ({}) exceeds max_instances ({})",
                self.sandbox.min_instances, self.sandbox.max_instances
            ));
        }
        if self.audit.buffer_size == 0 {
            reasons.push("audit.buffer_size must be positive".to_string());
        }

        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { reasons })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
