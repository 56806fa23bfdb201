// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use agw_config::RouterConfig;
use agw_core::clock::Deadline;
use agw_core::{NormalizedRequest, RoutingDecision, ToolDefinition};
use agw_embedding::{EmbeddingError, EmbeddingService};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Decisions below this confidence require a human sign-off.
pub const APPROVAL_THRESHOLD: f64 = 0.8;

// ── Errors ──────────────────────────────────────────────────────────────

/// A tool that failed the similarity threshold, reported with a NoMatch so
/// the caller can reprompt or escalate.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCandidate {
    /// Tool identifier.
    pub tool_id: String,
    /// Raw cosine similarity against the intent.
    pub similarity: f64,
}

/// Errors from the intent router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// No catalog tool cleared the similarity and confidence thresholds.
    #[error("no tool matched the intent ({} near misses)", alternatives.len())]
    NoMatch {
        /// Up to three below-threshold candidates, best first.
        alternatives: Vec<RejectedCandidate>,
    },

    /// A downstream embedding failure surfaced during routing.
    #[error("routing failed")]
    Routing(#[source] EmbeddingError),

    /// The routing call exceeded its deadline.
    #[error("routing exceeded its {}ms deadline", deadline_ms)]
    Timeout {
        /// The deadline that fired.
        deadline_ms: u64,
    },
}

impl RouterError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> agw_error::ErrorCode {
        match self {
            Self::NoMatch { .. } => agw_error::ErrorCode::NoMatch,
            Self::Routing(e) => match e {
                EmbeddingError::DimensionMismatch { .. } => {
                    agw_error::ErrorCode::DimensionMismatch
                }
                EmbeddingError::Provider { .. } => agw_error::ErrorCode::RoutingError,
            },
            Self::Timeout { .. } => agw_error::ErrorCode::Timeout,
        }
    }
}

// ── Ranking ─────────────────────────────────────────────────────────────

/// One catalog tool scored against the intent.
#[derive(Debug, Clone)]
struct RankedTool {
    tool: ToolDefinition,
    similarity: f64,
    confidence: f64,
    adjusted: bool,
}

// ── Router ──────────────────────────────────────────────────────────────

/// Ranks catalog tools against a normalized intent and emits a
/// [`RoutingDecision`].
///
/// The router borrows the catalog for the duration of one call and owns
/// the decision it returns.
pub struct IntentRouter {
    embeddings: Arc<EmbeddingService>,
    config: RouterConfig,
}

impl IntentRouter {
    /// A router over the given embedding service and configuration.
    #[must_use]
    pub fn new(embeddings: Arc<EmbeddingService>, config: RouterConfig) -> Self {
        Self { embeddings, config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a request against the catalog.
    ///
    /// # Errors
    ///
    /// [`RouterError::NoMatch`] when nothing clears the thresholds,
    /// [`RouterError::Routing`] on embedding failures, and
    /// [`RouterError::Timeout`] when the configured deadline fires.
    pub async fn route(
        &self,
        request: &NormalizedRequest,
        catalog: &[ToolDefinition],
    ) -> Result<RoutingDecision, RouterError> {
        let deadline = Deadline::after(Duration::from_millis(self.config.deadline_ms));

        let intent_embedding = self
            .embeddings
            .embed_intent(&request.intent)
            .await
            .map_err(RouterError::Routing)?;
        self.check_deadline(&deadline)?;

        // Score every candidate; retain those at or above the similarity
        // threshold, remembering near misses for NoMatch reporting.
        let mut ranked: Vec<RankedTool> = Vec::new();
        let mut rejected: Vec<RejectedCandidate> = Vec::new();

        for tool in catalog {
            let tool_embedding = self
                .embeddings
                .embed_tool_description(&tool.name, &tool.description)
                .await
                .map_err(RouterError::Routing)?;
            let similarity = self
                .embeddings
                .similarity(&intent_embedding, &tool_embedding)
                .map_err(RouterError::Routing)?;
            self.check_deadline(&deadline)?;

            if similarity < self.config.similarity_threshold {
                rejected.push(RejectedCandidate {
                    tool_id: tool.id.clone(),
                    similarity,
                });
                continue;
            }

            let (confidence, adjusted) = self.adjust(similarity, tool);
            if confidence < self.config.min_confidence {
                debug!(tool = %tool.id, similarity, confidence, "dropped below min_confidence");
                rejected.push(RejectedCandidate {
                    tool_id: tool.id.clone(),
                    similarity,
                });
                continue;
            }

            ranked.push(RankedTool {
                tool: tool.clone(),
                similarity,
                confidence,
                adjusted,
            });
        }

        if ranked.is_empty() {
            rejected.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            rejected.truncate(3);
            return Err(RouterError::NoMatch {
                alternatives: rejected,
            });
        }

        // Sort by similarity descending; ties break on lower latency, then
        // lower cost, then lexicographic tool id for determinism.
        ranked.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let la = a.tool.latency_estimate_ms.unwrap_or(u64::MAX);
                    let lb = b.tool.latency_estimate_ms.unwrap_or(u64::MAX);
                    la.cmp(&lb)
                })
                .then_with(|| {
                    let ca = a.tool.cost_estimate.unwrap_or(f64::INFINITY);
                    let cb = b.tool.cost_estimate.unwrap_or(f64::INFINITY);
                    ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.tool.id.cmp(&b.tool.id))
        });

        let selected = ranked[0].clone();
        let fallbacks: Vec<ToolDefinition> = ranked
            .iter()
            .skip(1)
            .take(self.config.max_alternatives)
            .map(|r| r.tool.clone())
            .collect();

        let requires_approval = selected.confidence < APPROVAL_THRESHOLD;
        let approval_reason = requires_approval.then(|| {
            format!(
                "Confidence {:.1}% is below the {:.0}% approval threshold",
                selected.confidence * 100.0,
                APPROVAL_THRESHOLD * 100.0
            )
        });

        Ok(RoutingDecision {
            request_id: request.id,
            reasoning: reasoning(&selected),
            estimated_latency_ms: selected.tool.latency_estimate_ms,
            estimated_cost: selected.tool.cost_estimate,
            confidence: selected.confidence,
            fallbacks,
            requires_approval,
            approval_reason,
            tool: selected.tool,
        })
    }

    /// Apply cost and latency preference adjustments, clamped to `[0, 1]`.
    fn adjust(&self, similarity: f64, tool: &ToolDefinition) -> (f64, bool) {
        let mut confidence = similarity;
        let mut adjusted = false;

        if self.config.optimize_cost
            && let Some(cost) = tool.cost_estimate
        {
            confidence *= 0.9 + 0.1 * (1.0 / (1.0 + cost / 100.0));
            adjusted = true;
        }
        if self.config.optimize_latency
            && let Some(latency_ms) = tool.latency_estimate_ms
        {
            confidence *= 0.9 + 0.1 * (1.0 / (1.0 + latency_ms as f64 / 1000.0));
            adjusted = true;
        }

        (confidence.clamp(0.0, 1.0), adjusted)
    }

    fn check_deadline(&self, deadline: &Deadline) -> Result<(), RouterError> {
        if deadline.expired() {
            return Err(RouterError::Timeout {
                deadline_ms: self.config.deadline_ms,
            });
        }
        Ok(())
    }
}

/// Compose the human-readable account of a selection.
fn reasoning(selected: &RankedTool) -> String {
    let mut parts = vec![format!(
        "Matched \"{}\" at {:.1}% similarity",
        selected.tool.id,
        selected.similarity * 100.0
    )];
    if let Some(cost) = selected.tool.cost_estimate {
        parts.push(format!("estimated cost {cost:.1}¢"));
    }
    if let Some(latency) = selected.tool.latency_estimate_ms {
        parts.push(format!("estimated latency {latency} ms"));
    }
    if selected.adjusted {
        parts.push("confidence reduced by optimization adjustments".to_string());
    }
    parts.join("; ")
}

// ═══════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::{IntentCategory, NormalizedIntent, ProtocolTag, RequestContext, RequestMetadata};
    use agw_embedding::EmbeddingProvider;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Provider returning hand-crafted unit vectors so tests control every
    /// similarity exactly. Texts route on distinctive substrings.
    struct FixtureProvider;

    #[async_trait]
    impl EmbeddingProvider for FixtureProvider {
        fn model_id(&self) -> &str {
            "fixture"
        }
        fn dimensions(&self) -> usize {
            2
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            // The intent axis is [1, 0]; tools sit at known angles.
            let v = if text.contains("find documentation") {
                vec![1.0, 0.0]
            } else if text.contains("search the web") {
                angle(0.90)
            } else if text.contains("mirror search") {
                angle(0.90)
            } else if text.contains("borderline") {
                angle(0.72)
            } else if text.contains("send email") {
                angle(0.30)
            } else if text.contains("midrange") {
                angle(0.86)
            } else {
                angle(0.10)
            };
            Ok(v)
        }
    }

    fn angle(cos: f32) -> Vec<f32> {
        vec![cos, (1.0 - cos * cos).sqrt()]
    }

    fn request() -> NormalizedRequest {
        let mut intent = NormalizedIntent::new(IntentCategory::InformationRequest, "find documentation", 0.9);
        intent.target = "docs".into();
        NormalizedRequest {
            id: uuid::Uuid::new_v4(),
            created_at: Utc::now(),
            source_protocol: ProtocolTag::Mcp,
            raw_payload: serde_json::json!({}),
            intent,
            context: RequestContext::default(),
            metadata: RequestMetadata::new(),
        }
    }

    fn router(config: RouterConfig) -> IntentRouter {
        let service = EmbeddingService::new(Arc::new(FixtureProvider), Duration::from_secs(60));
        IntentRouter::new(Arc::new(service), config)
    }

    fn tool(id: &str, description: &str) -> ToolDefinition {
        ToolDefinition::new(id, description)
    }

    #[tokio::test]
    async fn selects_highest_similarity_tool() {
        let catalog = vec![tool("t1", "search the web"), tool("t2", "send email")];
        let decision = router(RouterConfig::default())
            .route(&request(), &catalog)
            .await
            .unwrap();
        assert_eq!(decision.tool.id, "t1");
        // t2 sits at 0.30, far below the threshold, so no fallbacks.
        assert!(decision.fallbacks.is_empty());
        assert!(decision.reasoning.contains("t1"));
        assert!(decision.reasoning.contains("90.0%"));
    }

    #[tokio::test]
    async fn selected_outscores_every_fallback() {
        let catalog = vec![
            tool("a", "search the web"),
            tool("b", "midrange catalog lookup"),
        ];
        let decision = router(RouterConfig::default())
            .route(&request(), &catalog)
            .await
            .unwrap();
        assert_eq!(decision.tool.id, "a");
        assert_eq!(decision.fallbacks.len(), 1);
        assert_eq!(decision.fallbacks[0].id, "b");
    }

    #[tokio::test]
    async fn no_match_reports_up_to_three_near_misses() {
        let catalog = vec![
            tool("low1", "send email"),
            tool("low2", "anything else"),
            tool("low3", "send email again"),
            tool("low4", "borderline relevance"),
        ];
        let err = router(RouterConfig::default())
            .route(&request(), &catalog)
            .await
            .unwrap_err();
        let RouterError::NoMatch { alternatives } = err else {
            panic!("expected NoMatch");
        };
        assert_eq!(alternatives.len(), 3);
        // Best near miss first.
        assert_eq!(alternatives[0].tool_id, "low4");
        for w in alternatives.windows(2) {
            assert!(w[0].similarity >= w[1].similarity);
        }
    }

    #[tokio::test]
    async fn approval_required_below_threshold_with_percentage() {
        let mut config = RouterConfig::default();
        config.similarity_threshold = 0.5;
        let catalog = vec![tool("edge", "borderline relevance")];
        let decision = router(config).route(&request(), &catalog).await.unwrap();
        assert!((decision.confidence - 0.72).abs() < 1e-3);
        assert!(decision.requires_approval);
        let reason = decision.approval_reason.unwrap();
        assert!(reason.contains("72.0%"), "reason was: {reason}");
    }

    #[tokio::test]
    async fn approval_not_required_at_high_confidence() {
        let catalog = vec![tool("t1", "search the web")];
        let decision = router(RouterConfig::default())
            .route(&request(), &catalog)
            .await
            .unwrap();
        assert!(!decision.requires_approval);
        assert!(decision.approval_reason.is_none());
        // The invariant: requires_approval == (confidence < 0.8).
        assert_eq!(
            decision.requires_approval,
            decision.confidence < APPROVAL_THRESHOLD
        );
    }

    #[tokio::test]
    async fn optimization_adjustments_can_drop_below_min_confidence() {
        // similarity 0.86 clears the 0.85 threshold, but with both
        // adjustments saturated the confidence lands near 0.86 × 0.81 ≈ 0.70.
        let mut config = RouterConfig::default();
        config.optimize_cost = true;
        config.optimize_latency = true;
        let mut t = tool("pricey", "midrange catalog lookup");
        t.cost_estimate = Some(100_000.0);
        t.latency_estimate_ms = Some(1_000_000);
        let err = router(config).route(&request(), &[t]).await.unwrap_err();
        assert!(matches!(err, RouterError::NoMatch { .. }));
    }

    #[tokio::test]
    async fn cost_adjustment_notes_reduction_in_reasoning() {
        let mut config = RouterConfig::default();
        config.optimize_cost = true;
        let mut t = tool("t1", "search the web");
        t.cost_estimate = Some(50.0);
        let decision = router(config).route(&request(), &[t]).await.unwrap();
        assert!(decision.confidence < 0.90);
        assert!(decision.reasoning.contains("optimization adjustments"));
        assert!(decision.reasoning.contains("estimated cost"));
    }

    #[tokio::test]
    async fn ties_break_on_latency_then_cost_then_id() {
        let mut fast = tool("zz-fast", "search the web");
        fast.latency_estimate_ms = Some(10);
        let mut slow = tool("aa-slow", "mirror search of the web");
        slow.latency_estimate_ms = Some(500);
        let decision = router(RouterConfig::default())
            .route(&request(), &[slow, fast])
            .await
            .unwrap();
        assert_eq!(decision.tool.id, "zz-fast");

        // Same latency: lexicographic id decides.
        let mut a = tool("aa", "search the web");
        a.latency_estimate_ms = Some(10);
        let mut z = tool("zz", "mirror search of the web");
        z.latency_estimate_ms = Some(10);
        let decision = router(RouterConfig::default())
            .route(&request(), &[z, a])
            .await
            .unwrap();
        assert_eq!(decision.tool.id, "aa");
    }

    #[tokio::test]
    async fn zero_deadline_times_out() {
        let mut config = RouterConfig::default();
        config.deadline_ms = 0;
        let catalog = vec![tool("t1", "search the web")];
        let err = router(config).route(&request(), &catalog).await.unwrap_err();
        assert!(matches!(err, RouterError::Timeout { deadline_ms: 0 }));
        assert_eq!(err.error_code(), agw_error::ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn empty_catalog_is_no_match_with_no_alternatives() {
        let err = router(RouterConfig::default())
            .route(&request(), &[])
            .await
            .unwrap_err();
        let RouterError::NoMatch { alternatives } = err else {
            panic!("expected NoMatch");
        };
        assert!(alternatives.is_empty());
    }

    #[tokio::test]
    async fn decision_carries_estimates_from_selected_tool() {
        let mut t = tool("t1", "search the web");
        t.cost_estimate = Some(3.0);
        t.latency_estimate_ms = Some(120);
        let decision = router(RouterConfig::default())
            .route(&request(), &[t])
            .await
            .unwrap();
        assert_eq!(decision.estimated_cost, Some(3.0));
        assert_eq!(decision.estimated_latency_ms, Some(120));
    }
}
