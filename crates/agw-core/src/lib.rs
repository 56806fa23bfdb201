// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! agw-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for the Agent Gateway.
//!
//! If you only take one dependency, take this one.

/// Canonical JSON rendering (sorted keys) for hashing and change detection.
pub mod canonical;
/// Monotonic stopwatch and wall-clock helpers.
pub mod clock;
/// Identifier generation for requests, traces, and audit entries.
pub mod id;
/// Cosine similarity over fixed-dimension vectors.
pub mod similarity;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Contract version string embedded in wire-facing payloads.
///
/// # Examples
///
/// ```
/// assert_eq!(agw_core::CONTRACT_VERSION, "agw/v0.1");
/// ```
pub const CONTRACT_VERSION: &str = "agw/v0.1";

// ── Protocol tag ────────────────────────────────────────────────────────

/// The closed set of wire protocols the gateway accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolTag {
    /// Model Context Protocol (JSON-RPC 2.0 framing).
    Mcp,
    /// Agent-to-Agent messaging.
    A2a,
    /// Unified Context Protocol.
    Ucp,
    /// Agent Communication Protocol (header/body framing).
    Acp,
    /// Vendor chat API, first generation.
    V1,
    /// Vendor chat API, second generation.
    V2,
}

impl ProtocolTag {
    /// Human-readable label for this protocol.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mcp => "MCP",
            Self::A2a => "A2A",
            Self::Ucp => "UCP",
            Self::Acp => "ACP",
            Self::V1 => "V1",
            Self::V2 => "V2",
        }
    }

    /// Returns all known protocol tags.
    #[must_use]
    pub fn all() -> &'static [ProtocolTag] {
        &[
            Self::Mcp,
            Self::A2a,
            Self::Ucp,
            Self::Acp,
            Self::V1,
            Self::V2,
        ]
    }
}

impl std::fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Intent ──────────────────────────────────────────────────────────────

/// What kind of work a normalized intent asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Invoke a named tool with arguments.
    ToolCall,
    /// Answer a question from available knowledge.
    InformationRequest,
    /// Perform a side-effecting action.
    ActionExecution,
    /// Fetch stored data.
    DataRetrieval,
    /// Produce source code.
    CodeGeneration,
    /// Analyze supplied material.
    Analysis,
    /// Free-form conversation.
    Conversation,
    /// Hand off to a human.
    Escalation,
}

impl IntentCategory {
    /// snake_case name matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::InformationRequest => "information_request",
            Self::ActionExecution => "action_execution",
            Self::DataRetrieval => "data_retrieval",
            Self::CodeGeneration => "code_generation",
            Self::Analysis => "analysis",
            Self::Conversation => "conversation",
            Self::Escalation => "escalation",
        }
    }
}

/// A lower-confidence reading of the same payload, kept for diagnostics
/// and reprompting. Alternatives are data, not control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntentAlternative {
    /// Alternative action string.
    pub action: String,
    /// Confidence in `[0.0, 1.0]`, never above the primary intent's.
    pub confidence: f64,
    /// Why this alternative was considered.
    pub reason: String,
}

/// The protocol-independent intent produced by adapter normalization.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedIntent {
    /// Unique intent identifier.
    pub id: Uuid,
    /// Broad category of the request.
    pub category: IntentCategory,
    /// Free-form action verb (e.g. `"search"`, `"read_resource"`).
    pub action: String,
    /// What the action operates on (e.g. `"tool"`, a resource URI).
    pub target: String,
    /// Dynamic parameters, preserved as opaque JSON.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Alternatives in non-increasing confidence order.
    pub alternatives: Vec<IntentAlternative>,
    /// Embedding of this intent, if one has been computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

impl NormalizedIntent {
    /// Create an intent with a fresh id and no alternatives.
    #[must_use]
    pub fn new(category: IntentCategory, action: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            action: action.into(),
            target: String::new(),
            parameters: BTreeMap::new(),
            confidence,
            alternatives: Vec::new(),
            embedding: None,
        }
    }

    /// `true` when alternatives are sorted in non-increasing confidence
    /// and every confidence lies in `[0.0, 1.0]`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if !(0.0..=1.0).contains(&self.confidence) {
            return false;
        }
        if self
            .alternatives
            .iter()
            .any(|a| !(0.0..=1.0).contains(&a.confidence))
        {
            return false;
        }
        self.alternatives
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence)
    }
}

// ── Request ─────────────────────────────────────────────────────────────

/// One turn of conversation history carried in the request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConversationTurn {
    /// Speaker role (`"user"`, `"assistant"`, `"system"`).
    pub role: String,
    /// Utterance text.
    pub content: String,
}

/// Caller-supplied context attached to a [`NormalizedRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RequestContext {
    /// Session the request belongs to, if any.
    pub session_id: Option<String>,
    /// End user on whose behalf the request runs.
    pub user_id: Option<String>,
    /// Prior conversation turns.
    pub history: Vec<ConversationTurn>,
    /// Tool ids the caller declared available.
    pub available_tools: Vec<String>,
    /// Hard constraints (opaque to the gateway).
    pub constraints: BTreeMap<String, serde_json::Value>,
    /// Soft preferences (e.g. `"optimize_cost": true`).
    pub preferences: BTreeMap<String, serde_json::Value>,
}

/// Request priority, highest last.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Latency-sensitive.
    High,
    /// Drop-everything.
    Critical,
}

/// How much detail the audit pipeline records for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Only failures and approvals.
    Minimal,
    /// Every pipeline transition.
    #[default]
    Standard,
    /// Transitions plus before/after snapshots.
    Verbose,
}

/// Processing directives attached to a [`NormalizedRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RequestMetadata {
    /// Scheduling priority.
    pub priority: Priority,
    /// Hard latency ceiling, if the caller set one.
    pub max_latency_ms: Option<u64>,
    /// Hard budget ceiling in USD, if the caller set one.
    pub max_budget_usd: Option<f64>,
    /// Caller demands a human sign-off regardless of confidence.
    pub require_human_approval: bool,
    /// Audit verbosity for this request.
    pub audit_level: AuditLevel,
    /// Trace id correlating every audit entry for this request.
    pub trace_id: String,
}

impl RequestMetadata {
    /// Metadata with defaults and a fresh trace id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            priority: Priority::default(),
            max_latency_ms: None,
            max_budget_usd: None,
            require_human_approval: false,
            audit_level: AuditLevel::default(),
            trace_id: id::new_trace_id(),
        }
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// The internal post-adapter request shared by every downstream component.
///
/// Created by the adapter dispatcher and never mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormalizedRequest {
    /// Unique request identifier.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Protocol the raw payload arrived in.
    pub source_protocol: ProtocolTag,
    /// The original payload, kept opaque.
    pub raw_payload: serde_json::Value,
    /// The normalized intent.
    pub intent: NormalizedIntent,
    /// Caller context.
    pub context: RequestContext,
    /// Processing directives.
    pub metadata: RequestMetadata,
}

// ── Tool catalog ────────────────────────────────────────────────────────

/// A tool the gateway can route to. Immutable for the lifetime of a
/// routing call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolDefinition {
    /// Unique tool identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description used for semantic matching.
    pub description: String,
    /// Protocol the tool was registered through.
    pub source_protocol: ProtocolTag,
    /// JSON Schema for the tool's parameters.
    pub parameters_schema: serde_json::Value,
    /// JSON Schema for the tool's return value.
    pub returns_schema: serde_json::Value,
    /// Estimated cost per invocation in USD cents.
    pub cost_estimate: Option<f64>,
    /// Estimated latency per invocation in milliseconds.
    pub latency_estimate_ms: Option<u64>,
    /// Credential ids the tool needs resolved before execution.
    pub required_credentials: Vec<String>,
}

impl ToolDefinition {
    /// Minimal definition with the given id and description.
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: description.into(),
            source_protocol: ProtocolTag::Mcp,
            parameters_schema: serde_json::json!({"type": "object"}),
            returns_schema: serde_json::json!({"type": "object"}),
            cost_estimate: None,
            latency_estimate_ms: None,
            required_credentials: Vec::new(),
        }
    }
}

// ── Routing decision ────────────────────────────────────────────────────

/// Outcome of routing a normalized request against the tool catalog.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RoutingDecision {
    /// Request this decision answers.
    pub request_id: Uuid,
    /// The selected tool.
    pub tool: ToolDefinition,
    /// Adjusted confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Human-readable account of how the selection was made.
    pub reasoning: String,
    /// Alternatives in descending score order, each scoring below the
    /// selected tool.
    pub fallbacks: Vec<ToolDefinition>,
    /// Latency estimate carried over from the selected tool.
    pub estimated_latency_ms: Option<u64>,
    /// Cost estimate carried over from the selected tool.
    pub estimated_cost: Option<f64>,
    /// `true` exactly when `confidence` is below the approval threshold.
    pub requires_approval: bool,
    /// Present iff `requires_approval`; carries the confidence percentage.
    pub approval_reason: Option<String>,
}

// ── Execution result ────────────────────────────────────────────────────

/// Failure detail for an execution that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionFailure {
    /// Stable failure code (e.g. `"TIMEOUT"`, `"SANDBOX_CREATE_FAILED"`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Captured stdout, when the sandbox produced any.
    pub stdout: Option<String>,
    /// Captured stderr, when the sandbox produced any.
    pub stderr: Option<String>,
    /// Process exit code, when one exists.
    pub exit_code: Option<i32>,
}

/// Timings and resource usage for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionMetrics {
    /// Sandbox creation time; `0` on a pool hit.
    pub cold_start_ms: u64,
    /// Tool execution time inside the sandbox.
    pub execution_ms: u64,
    /// End-to-end wall time.
    pub total_ms: u64,
    /// Peak memory in MiB, when the driver reports it.
    pub memory_peak_mib: Option<u64>,
    /// Mean CPU utilization percentage, when the driver reports it.
    pub cpu_percent: Option<f64>,
}

/// Result of executing a tool inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionResult {
    /// `true` when the tool ran to completion.
    pub success: bool,
    /// Tool output; present exactly when `success`.
    pub output: Option<serde_json::Value>,
    /// Failure detail; present exactly when `!success`.
    pub error: Option<ExecutionFailure>,
    /// Timings and resource usage.
    pub metrics: ExecutionMetrics,
}

impl ExecutionResult {
    /// A successful result with the given output and metrics.
    #[must_use]
    pub fn success(output: serde_json::Value, metrics: ExecutionMetrics) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            metrics,
        }
    }

    /// A failed result with the given failure and metrics.
    #[must_use]
    pub fn failure(failure: ExecutionFailure, metrics: ExecutionMetrics) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(failure),
            metrics,
        }
    }
}

// ── Audit entries ───────────────────────────────────────────────────────

/// The closed set of consequential events the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Raw bytes accepted at the front door.
    RequestReceived,
    /// Protocol detection resolved a tag.
    ProtocolDetected,
    /// Adapter normalization produced an intent.
    IntentClassified,
    /// The router selected a tool.
    RoutingDecision,
    /// A decision is waiting on a human reviewer.
    HumanApprovalRequested,
    /// A human reviewer resolved a pending approval.
    HumanReviewCompleted,
    /// A credential was resolved for a tool.
    CredentialAccessed,
    /// A sandbox was created (cold start).
    SandboxCreated,
    /// A tool ran to completion.
    ToolExecuted,
    /// A tool execution failed.
    ToolFailed,
    /// Something looked hostile or out of policy.
    SecurityAlert,
}

impl AuditEventType {
    /// snake_case name matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestReceived => "request_received",
            Self::ProtocolDetected => "protocol_detected",
            Self::IntentClassified => "intent_classified",
            Self::RoutingDecision => "routing_decision",
            Self::HumanApprovalRequested => "human_approval_requested",
            Self::HumanReviewCompleted => "human_review_completed",
            Self::CredentialAccessed => "credential_accessed",
            Self::SandboxCreated => "sandbox_created",
            Self::ToolExecuted => "tool_executed",
            Self::ToolFailed => "tool_failed",
            Self::SecurityAlert => "security_alert",
        }
    }
}

/// Severity of an audit entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine.
    #[default]
    Info,
    /// Worth a look.
    Warning,
    /// Something failed.
    Error,
    /// Something failed in a way that needs humans now.
    Critical,
}

/// A human reviewer's verdict on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Proceed as decided.
    Approved,
    /// Do not proceed.
    Rejected,
    /// Proceed with the reviewer's modifications.
    Modified,
}

/// Human review attached to an audit entry, at most once.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HumanReview {
    /// Reviewer identity.
    pub reviewer_id: String,
    /// The verdict.
    pub decision: ReviewDecision,
    /// When the review happened.
    pub timestamp: DateTime<Utc>,
    /// Free-form comments.
    pub comments: Option<String>,
    /// Structured modifications when `decision` is `Modified`.
    pub modifications: Option<BTreeMap<String, serde_json::Value>>,
}

/// Returned when a second review is attached to the same entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit entry {entry_id} already carries a human review")]
pub struct ReviewAlreadySet {
    /// The entry that was reviewed twice.
    pub entry_id: Uuid,
}

/// An append-only record of one consequential event in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Trace correlating every entry for one request.
    pub trace_id: String,
    /// Request the event belongs to, when known.
    pub request_id: Option<Uuid>,
    /// What happened.
    pub event_type: AuditEventType,
    /// How bad it was.
    pub severity: AuditSeverity,
    /// Who did it (`"gateway"`, a user id, a reviewer id).
    pub actor: String,
    /// What was done.
    pub action: String,
    /// What it was done to.
    pub target: String,
    /// Structured event detail.
    pub details: BTreeMap<String, serde_json::Value>,
    /// State snapshot before the event, for change detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<BTreeMap<String, serde_json::Value>>,
    /// State snapshot after the event, for change detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<BTreeMap<String, serde_json::Value>>,
    /// Human review, set at most once via [`AuditEntry::attach_review`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_review: Option<HumanReview>,
}

impl AuditEntry {
    /// Attach a human review.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewAlreadySet`] when a review is already present; the
    /// first review always wins.
    pub fn attach_review(&mut self, review: HumanReview) -> Result<(), ReviewAlreadySet> {
        if self.human_review.is_some() {
            return Err(ReviewAlreadySet { entry_id: self.id });
        }
        self.human_review = Some(review);
        Ok(())
    }
}

// ── Embedding ───────────────────────────────────────────────────────────

/// A fixed-dimension, L2-normalized vector representing a piece of text,
/// tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Embedding {
    /// The vector components.
    pub vector: Vec<f32>,
    /// Identifier of the producing model.
    pub model: String,
}

impl Embedding {
    /// Number of dimensions.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    /// Euclidean norm of the vector.
    #[must_use]
    pub fn l2_norm(&self) -> f32 {
        self.vector.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// `true` when the norm is within `eps` of 1.
    #[must_use]
    pub fn is_normalized(&self, eps: f32) -> bool {
        (self.l2_norm() - 1.0).abs() <= eps
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════
