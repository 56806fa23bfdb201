// SPDX-License-Identifier: MIT OR Apache-2.0
//! Human-optimized projections of audit entries.
//!
//! A view targets a comprehension time of five seconds: one title, a
//! five-field summary, collapsible details, and the actions a reviewer can
//! take.

use crate::telemetry::ComprehensionStats;
use agw_core::canonical::canonical_json;
use agw_core::{AuditEntry, AuditEventType, AuditSeverity, ReviewDecision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Comprehension target for every view, in seconds.
pub const COMPREHENSION_TARGET_SEC: u32 = 5;

// ── Value types ─────────────────────────────────────────────────────────

/// How consequential an event is for a reviewer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    /// Routine.
    Low,
    /// Worth scanning.
    Medium,
    /// Read this.
    High,
    /// Drop everything.
    Critical,
}

/// How hard a view is to absorb.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    /// One glance.
    Simple,
    /// A short read.
    Moderate,
    /// Needs attention.
    Complex,
}

/// Review state surfaced in the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// Awaiting a human decision.
    Pending,
    /// Approved by a reviewer.
    Approved,
    /// Rejected by a reviewer.
    Rejected,
    /// Approved with modifications.
    Modified,
    /// No review involved.
    Recorded,
}

/// Actions a reviewer can take from a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewAction {
    /// Expand the full entry.
    ViewDetails,
    /// Approve the pending decision.
    Approve,
    /// Reject the pending decision.
    Reject,
    /// Approve with modifications.
    Modify,
}

/// One detected difference between the before and after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The changed key.
    pub field: String,
    /// What happened to it.
    pub kind: ChangeKind,
    /// Value before, for removed/modified keys.
    pub before: Option<serde_json::Value>,
    /// Value after, for added/modified keys.
    pub after: Option<serde_json::Value>,
}

/// The kind of a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Key present only in the after snapshot.
    Added,
    /// Key present only in the before snapshot.
    Removed,
    /// Key present in both with different canonical values.
    Modified,
}

/// The five-field summary a reviewer reads first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSummary {
    /// One line: what happened.
    pub what: String,
    /// Who did it.
    pub who: String,
    /// Relative time ("just now", "5m ago", "2h ago", else a date).
    pub when: String,
    /// How consequential it is.
    pub impact: Impact,
    /// Review state.
    pub status: ViewStatus,
}

/// Context block inside the details section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewContext {
    /// Trace correlating the request's entries.
    pub trace_id: String,
    /// Request the event belongs to, when known.
    pub request_id: Option<Uuid>,
    /// The event type, snake_case.
    pub event_type: String,
    /// Entry severity.
    pub severity: AuditSeverity,
    /// Absolute timestamp.
    pub timestamp: DateTime<Utc>,
    /// Entry actor.
    pub actor: String,
    /// How many other entries share the trace.
    pub related_events: usize,
    /// Whether a human review is attached.
    pub has_human_review: bool,
}

/// Collapsible detail section of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDetails {
    /// Before snapshot, verbatim.
    pub before: Option<BTreeMap<String, serde_json::Value>>,
    /// After snapshot, verbatim.
    pub after: Option<BTreeMap<String, serde_json::Value>>,
    /// Differences between the snapshots.
    pub changes: Vec<ChangeRecord>,
    /// Context block.
    pub context: ViewContext,
    /// Ids of entries sharing the trace.
    pub related_entries: Vec<Uuid>,
}

/// View metadata for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMetadata {
    /// When the view was generated.
    pub created_at: DateTime<Utc>,
    /// The comprehension target, always five seconds.
    pub comprehension_target_sec: u32,
    /// Estimated time to read this view.
    pub estimated_read_time_sec: u32,
    /// How hard the view is to absorb.
    pub complexity: Complexity,
}

/// The human-optimized projection of one audit entry (or a batch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditView {
    /// Headline.
    pub title: String,
    /// The five-field summary.
    pub summary: ViewSummary,
    /// Collapsible details.
    pub details: ViewDetails,
    /// Actions available to the reviewer.
    pub actions: Vec<ViewAction>,
    /// Rendering metadata.
    pub metadata: ViewMetadata,
}

// ── Generator ───────────────────────────────────────────────────────────

/// Generates [`AuditView`]s and records comprehension telemetry.
#[derive(Debug, Clone, Default)]
pub struct ViewGenerator {
    telemetry: ComprehensionStats,
}

impl ViewGenerator {
    /// A generator with fresh telemetry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The comprehension telemetry collected so far.
    #[must_use]
    pub fn telemetry(&self) -> &ComprehensionStats {
        &self.telemetry
    }

    /// Generate the view for one entry. `related` are other entries sharing
    /// the trace (the entry itself is ignored if present).
    #[must_use]
    pub fn generate(&self, entry: &AuditEntry, related: &[AuditEntry]) -> AuditView {
        let related_ids: Vec<Uuid> = related
            .iter()
            .filter(|e| e.id != entry.id)
            .map(|e| e.id)
            .collect();

        let title = title_for(entry);
        let what = what_for(entry);
        let impact = impact_for(entry);
        let status = status_for(entry);
        let changes = detect_changes(entry.before.as_ref(), entry.after.as_ref());
        let detail_size = detail_size(entry);
        let complexity = complexity_for(entry, detail_size);
        let read_time = estimated_read_time(&title, &what, detail_size);

        let view = AuditView {
            summary: ViewSummary {
                what,
                who: entry.actor.clone(),
                when: relative_time(entry.timestamp, Utc::now()),
                impact,
                status,
            },
            details: ViewDetails {
                before: entry.before.clone(),
                after: entry.after.clone(),
                changes,
                context: ViewContext {
                    trace_id: entry.trace_id.clone(),
                    request_id: entry.request_id,
                    event_type: entry.event_type.as_str().to_string(),
                    severity: entry.severity,
                    timestamp: entry.timestamp,
                    actor: entry.actor.clone(),
                    related_events: related_ids.len(),
                    has_human_review: entry.human_review.is_some(),
                },
                related_entries: related_ids,
            },
            actions: actions_for(entry),
            metadata: ViewMetadata {
                created_at: Utc::now(),
                comprehension_target_sec: COMPREHENSION_TARGET_SEC,
                estimated_read_time_sec: read_time,
                complexity,
            },
            title,
        };

        self.telemetry.observe(read_time);
        view
    }

    /// Generate a batch view for two or more entries sharing a trace id.
    ///
    /// Returns `None` when fewer than two entries are supplied or the
    /// trace ids differ.
    #[must_use]
    pub fn generate_batch(&self, entries: &[AuditEntry]) -> Option<AuditView> {
        if entries.len() < 2 {
            return None;
        }
        let trace_id = &entries[0].trace_id;
        if entries.iter().any(|e| &e.trace_id != trace_id) {
            return None;
        }

        let impact = entries
            .iter()
            .map(impact_for)
            .max()
            .unwrap_or(Impact::Low);
        let status = batch_status(entries);
        let complexity = entries
            .iter()
            .map(|e| complexity_for(e, detail_size(e)))
            .max()
            .unwrap_or(Complexity::Simple);
        let read_time = ((entries.len() as u32) * 2).min(30);
        let latest = entries
            .iter()
            .map(|e| e.timestamp)
            .max()
            .unwrap_or_else(Utc::now);

        let any_pending = entries.iter().any(is_pending_approval);
        let mut actions = vec![ViewAction::ViewDetails];
        if any_pending {
            actions.extend([ViewAction::Approve, ViewAction::Reject, ViewAction::Modify]);
        }

        let view = AuditView {
            title: format!("Batch: {} events", entries.len()),
            summary: ViewSummary {
                what: format!("{} events for trace {trace_id}", entries.len()),
                who: entries[0].actor.clone(),
                when: relative_time(latest, Utc::now()),
                impact,
                status,
            },
            details: ViewDetails {
                before: None,
                after: None,
                changes: Vec::new(),
                context: ViewContext {
                    trace_id: trace_id.clone(),
                    request_id: entries[0].request_id,
                    event_type: "batch".to_string(),
                    severity: entries.iter().map(|e| e.severity).max().unwrap_or_default(),
                    timestamp: latest,
                    actor: entries[0].actor.clone(),
                    related_events: entries.len(),
                    has_human_review: entries.iter().any(|e| e.human_review.is_some()),
                },
                related_entries: entries.iter().map(|e| e.id).collect(),
            },
            actions,
            metadata: ViewMetadata {
                created_at: Utc::now(),
                comprehension_target_sec: COMPREHENSION_TARGET_SEC,
                estimated_read_time_sec: read_time,
                complexity,
            },
        };

        self.telemetry.observe(read_time);
        Some(view)
    }
}

// ── Derivations ─────────────────────────────────────────────────────────

fn title_for(entry: &AuditEntry) -> String {
    match entry.event_type {
        AuditEventType::ToolExecuted => {
            if entry.target.is_empty() {
                "Tool Executed".to_string()
            } else {
                format!("Tool Executed: {}", entry.target)
            }
        }
        AuditEventType::HumanApprovalRequested => "Approval Required".to_string(),
        AuditEventType::SecurityAlert => "Security Alert".to_string(),
        other => other
            .as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn what_for(entry: &AuditEntry) -> String {
    let detail_str = |key: &str| {
        entry
            .details
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(String::from)
    };
    match entry.event_type {
        AuditEventType::RequestReceived => match detail_str("protocol") {
            Some(protocol) => format!("Received a {protocol} request"),
            None => "Received a request".to_string(),
        },
        AuditEventType::ProtocolDetected => match detail_str("protocol") {
            Some(protocol) => format!("Detected the {protocol} protocol"),
            None => "Detected the source protocol".to_string(),
        },
        AuditEventType::IntentClassified => match detail_str("category") {
            Some(category) => format!("Classified intent as {category}"),
            None => "Classified the request intent".to_string(),
        },
        AuditEventType::RoutingDecision => {
            format!("Selected tool \"{}\"", entry.target)
        }
        AuditEventType::HumanApprovalRequested => {
            format!("Decision on \"{}\" needs a human sign-off", entry.target)
        }
        AuditEventType::HumanReviewCompleted => {
            format!("A reviewer resolved the decision on \"{}\"", entry.target)
        }
        AuditEventType::CredentialAccessed => {
            format!("Resolved credential \"{}\"", entry.target)
        }
        AuditEventType::SandboxCreated => {
            format!("Created sandbox for \"{}\"", entry.target)
        }
        AuditEventType::ToolExecuted => {
            format!("Executed \"{}\" successfully", entry.target)
        }
        AuditEventType::ToolFailed => {
            format!("Execution of \"{}\" failed", entry.target)
        }
        AuditEventType::SecurityAlert => {
            format!("Security rule fired on \"{}\"", entry.target)
        }
    }
}

/// Impact assignment; first match wins.
fn impact_for(entry: &AuditEntry) -> Impact {
    if entry.event_type == AuditEventType::SecurityAlert {
        return Impact::Critical;
    }
    if entry.event_type == AuditEventType::ToolFailed && entry.severity == AuditSeverity::Error {
        return Impact::High;
    }
    if entry.event_type == AuditEventType::HumanApprovalRequested {
        return Impact::High;
    }
    if entry.severity == AuditSeverity::Error {
        return Impact::High;
    }
    if matches!(
        entry.event_type,
        AuditEventType::ToolExecuted | AuditEventType::IntentClassified
    ) {
        return Impact::Medium;
    }
    Impact::Low
}

fn status_for(entry: &AuditEntry) -> ViewStatus {
    match &entry.human_review {
        Some(review) => match review.decision {
            ReviewDecision::Approved => ViewStatus::Approved,
            ReviewDecision::Rejected => ViewStatus::Rejected,
            ReviewDecision::Modified => ViewStatus::Modified,
        },
        None if entry.event_type == AuditEventType::HumanApprovalRequested => ViewStatus::Pending,
        None => ViewStatus::Recorded,
    }
}

fn batch_status(entries: &[AuditEntry]) -> ViewStatus {
    if entries.iter().any(is_pending_approval) {
        return ViewStatus::Pending;
    }
    if entries.iter().any(|e| {
        e.human_review
            .as_ref()
            .is_some_and(|r| r.decision == ReviewDecision::Rejected)
    }) {
        return ViewStatus::Rejected;
    }
    ViewStatus::Approved
}

fn is_pending_approval(entry: &AuditEntry) -> bool {
    entry.event_type == AuditEventType::HumanApprovalRequested && entry.human_review.is_none()
}

fn actions_for(entry: &AuditEntry) -> Vec<ViewAction> {
    let mut actions = vec![ViewAction::ViewDetails];
    if is_pending_approval(entry) {
        actions.extend([ViewAction::Approve, ViewAction::Reject, ViewAction::Modify]);
    }
    actions
}

/// Detect added/removed/modified keys between two snapshots, comparing by
/// canonical JSON so key order never reads as a change.
#[must_use]
pub fn detect_changes(
    before: Option<&BTreeMap<String, serde_json::Value>>,
    after: Option<&BTreeMap<String, serde_json::Value>>,
) -> Vec<ChangeRecord> {
    let empty = BTreeMap::new();
    let before = before.unwrap_or(&empty);
    let after = after.unwrap_or(&empty);
    let mut changes = Vec::new();

    for (key, value) in after {
        if !before.contains_key(key) {
            changes.push(ChangeRecord {
                field: key.clone(),
                kind: ChangeKind::Added,
                before: None,
                after: Some(value.clone()),
            });
        }
    }
    for (key, value) in before {
        if !after.contains_key(key) {
            changes.push(ChangeRecord {
                field: key.clone(),
                kind: ChangeKind::Removed,
                before: Some(value.clone()),
                after: None,
            });
        }
    }
    for (key, old) in before {
        if let Some(new) = after.get(key)
            && canonical_json(old) != canonical_json(new)
        {
            changes.push(ChangeRecord {
                field: key.clone(),
                kind: ChangeKind::Modified,
                before: Some(old.clone()),
                after: Some(new.clone()),
            });
        }
    }
    changes
}

/// Relative rendering of a timestamp against `now`.
#[must_use]
pub fn relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - timestamp;
    if elapsed < chrono::Duration::seconds(60) {
        return "just now".to_string();
    }
    if elapsed < chrono::Duration::hours(1) {
        return format!("{}m ago", elapsed.num_minutes());
    }
    if elapsed < chrono::Duration::hours(24) {
        return format!("{}h ago", elapsed.num_hours());
    }
    timestamp.format("%Y-%m-%d").to_string()
}

fn detail_size(entry: &AuditEntry) -> usize {
    let mut size = serde_json::to_string(&entry.details).map_or(0, |s| s.len());
    if let Some(before) = &entry.before {
        size += serde_json::to_string(before).map_or(0, |s| s.len());
    }
    if let Some(after) = &entry.after {
        size += serde_json::to_string(after).map_or(0, |s| s.len());
    }
    size
}

fn complexity_for(entry: &AuditEntry, detail_size: usize) -> Complexity {
    if entry.event_type == AuditEventType::RequestReceived {
        return Complexity::Simple;
    }
    if entry.event_type == AuditEventType::SecurityAlert {
        return Complexity::Complex;
    }
    if detail_size > 5000 {
        return Complexity::Complex;
    }
    if detail_size > 1000 {
        return Complexity::Moderate;
    }
    Complexity::Simple
}

/// `ceil(word_count / 3.3 + detail_size / 100 × 0.5)` seconds.
fn estimated_read_time(title: &str, what: &str, detail_size: usize) -> u32 {
    let word_count = title.split_whitespace().count() + what.split_whitespace().count();
    let seconds = word_count as f64 / 3.3 + detail_size as f64 / 100.0 * 0.5;
    seconds.ceil() as u32
}

// ═══════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════
