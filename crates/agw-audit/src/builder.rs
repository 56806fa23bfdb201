// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fluent builder for constructing [`AuditEntry`]s.

use agw_core::{AuditEntry, AuditEventType, AuditSeverity, id};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Fluent builder for [`AuditEntry`]s.
///
/// # Examples
///
/// ```
/// use agw_audit::AuditEntryBuilder;
/// use agw_core::{AuditEventType, AuditSeverity};
///
/// let entry = AuditEntryBuilder::new(AuditEventType::ToolExecuted)
///     .actor("gateway")
///     .action("execute")
///     .target("search")
///     .trace_id("trc-abc123")
///     .detail("execution_ms", 42)
///     .build();
///
/// assert_eq!(entry.event_type, AuditEventType::ToolExecuted);
/// assert_eq!(entry.severity, AuditSeverity::Info);
/// ```
#[derive(Debug)]
pub struct AuditEntryBuilder {
    event_type: AuditEventType,
    severity: AuditSeverity,
    trace_id: String,
    request_id: Option<Uuid>,
    actor: String,
    action: String,
    target: String,
    details: BTreeMap<String, serde_json::Value>,
    before: Option<BTreeMap<String, serde_json::Value>>,
    after: Option<BTreeMap<String, serde_json::Value>>,
}

impl AuditEntryBuilder {
    /// Start a builder for the given event type with a fresh trace id.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_type,
            severity: AuditSeverity::Info,
            trace_id: id::new_trace_id(),
            request_id: None,
            actor: "gateway".into(),
            action: String::new(),
            target: String::new(),
            details: BTreeMap::new(),
            before: None,
            after: None,
        }
    }

    /// Set the severity.
    #[must_use]
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the trace id.
    #[must_use]
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    /// Set the request id.
    #[must_use]
    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Set the actor.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Set the action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Set the target.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Attach one detail key-value pair.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    /// Attach the before snapshot.
    #[must_use]
    pub fn before(mut self, before: BTreeMap<String, serde_json::Value>) -> Self {
        self.before = Some(before);
        self
    }

    /// Attach the after snapshot.
    #[must_use]
    pub fn after(mut self, after: BTreeMap<String, serde_json::Value>) -> Self {
        self.after = Some(after);
        self
    }

    /// Finish the entry with a fresh id and the current timestamp.
    #[must_use]
    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: id::new_id(),
            timestamp: Utc::now(),
            trace_id: self.trace_id,
            request_id: self.request_id,
            event_type: self.event_type,
            severity: self.severity,
            actor: self.actor,
            action: self.action,
            target: self.target,
            details: self.details,
            before: self.before,
            after: self.after,
            human_review: None,
        }
    }
}
