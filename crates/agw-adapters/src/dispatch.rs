// SPDX-License-Identifier: MIT OR Apache-2.0
//! The adapter dispatcher: protocol detection and request conversion.

use crate::traits::{ProtocolAdapter, StageTimings};
use crate::{A2aAdapter, AcpAdapter, AdapterError, McpAdapter, UcpAdapter, V1Adapter, V2Adapter};
use agw_core::clock::Stopwatch;
use agw_core::{
    ConversationTurn, NormalizedRequest, ProtocolTag, RequestContext, RequestMetadata, id,
};
use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Per-call adapter overhead budget. Exceeding it warns; it never aborts.
pub const OVERHEAD_BUDGET_MS: u64 = 5;

/// Detection order. V2 precedes V1 because V2's mandatory fields are a
/// strict superset of V1's; everything else is disjoint.
const DETECTION_ORDER: [ProtocolTag; 6] = [
    ProtocolTag::Mcp,
    ProtocolTag::A2a,
    ProtocolTag::Ucp,
    ProtocolTag::Acp,
    ProtocolTag::V2,
    ProtocolTag::V1,
];

/// Holds the six adapters and converts tagged payloads into
/// [`NormalizedRequest`]s.
pub struct AdapterDispatcher {
    adapters: Vec<Box<dyn ProtocolAdapter>>,
}

impl Default for AdapterDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterDispatcher {
    /// A dispatcher with all six protocol adapters registered.
    #[must_use]
    pub fn new() -> Self {
        let adapters: Vec<Box<dyn ProtocolAdapter>> = vec![
            Box::new(McpAdapter),
            Box::new(A2aAdapter),
            Box::new(UcpAdapter),
            Box::new(AcpAdapter),
            Box::new(V2Adapter),
            Box::new(V1Adapter),
        ];
        debug_assert_eq!(adapters.len(), DETECTION_ORDER.len());
        Self { adapters }
    }

    fn adapter(&self, tag: ProtocolTag) -> &dyn ProtocolAdapter {
        self.adapters
            .iter()
            .find(|a| a.tag() == tag)
            .map(|a| a.as_ref())
            .expect("all six adapters are registered at construction")
    }

    /// Run each adapter's parse in fixed order and return the tag of the
    /// first that succeeds, or `None` when nothing parses.
    #[must_use]
    pub fn detect_protocol(&self, raw: &[u8]) -> Option<ProtocolTag> {
        DETECTION_ORDER
            .iter()
            .find(|&&tag| self.adapter(tag).parse(raw).is_ok())
            .copied()
    }

    /// Resolve a tag string (one of `mcp`, `a2a`, `ucp`, `acp`, `v1`, `v2`).
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnsupportedProtocol`] for anything else.
    pub fn parse_tag(tag: &str) -> Result<ProtocolTag, AdapterError> {
        match tag {
            "mcp" => Ok(ProtocolTag::Mcp),
            "a2a" => Ok(ProtocolTag::A2a),
            "ucp" => Ok(ProtocolTag::Ucp),
            "acp" => Ok(ProtocolTag::Acp),
            "v1" => Ok(ProtocolTag::V1),
            "v2" => Ok(ProtocolTag::V2),
            other => Err(AdapterError::UnsupportedProtocol { tag: other.into() }),
        }
    }

    /// Convert a raw payload under a tag string, failing with
    /// `UnsupportedProtocol` for unknown tags.
    ///
    /// # Errors
    ///
    /// See [`convert`](Self::convert).
    pub fn convert_tagged(
        &self,
        raw: &[u8],
        tag: &str,
        trace_id: Option<String>,
    ) -> Result<NormalizedRequest, AdapterError> {
        let tag = Self::parse_tag(tag)?;
        self.convert(raw, tag, trace_id)
    }

    /// Convert a raw payload into a [`NormalizedRequest`].
    ///
    /// The request owns the opaque payload, the normalized intent, and
    /// context extracted from protocol-specific fields. Overhead above
    /// [`OVERHEAD_BUDGET_MS`] is logged but never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Parse`] when the payload violates the
    /// protocol's required shape, or [`AdapterError::Normalize`] when no
    /// intent can be derived.
    pub fn convert(
        &self,
        raw: &[u8],
        tag: ProtocolTag,
        trace_id: Option<String>,
    ) -> Result<NormalizedRequest, AdapterError> {
        let total = Stopwatch::start();
        let adapter = self.adapter(tag);

        let parsed = adapter.parse(raw)?;
        let outcome = adapter.normalize(&parsed)?;

        let context = extract_context(tag, &parsed.payload);
        let mut metadata = RequestMetadata::new();
        if let Some(trace_id) = trace_id {
            metadata.trace_id = trace_id;
        }

        let request = NormalizedRequest {
            id: id::new_id(),
            created_at: Utc::now(),
            source_protocol: tag,
            raw_payload: parsed.payload,
            intent: outcome.intent,
            context,
            metadata,
        };

        warn_if_over_budget(tag, request.id, &outcome.timings, total.elapsed_ms());
        Ok(request)
    }
}

fn warn_if_over_budget(tag: ProtocolTag, request_id: Uuid, timings: &StageTimings, total_ms: u64) {
    if total_ms > OVERHEAD_BUDGET_MS {
        warn!(
            protocol = %tag,
            %request_id,
            total_ms,
            parse_us = timings.parse.as_micros() as u64,
            normalize_us = timings.normalize.as_micros() as u64,
            "adapter overhead exceeded {OVERHEAD_BUDGET_MS} ms budget"
        );
    }
}

/// Pull session/user/history/tool context out of protocol-specific fields.
fn extract_context(tag: ProtocolTag, payload: &Value) -> RequestContext {
    let mut context = RequestContext::default();
    let Some(obj) = payload.as_object() else {
        return context;
    };

    context.session_id = obj
        .get("session_id")
        .or_else(|| obj.get("conversation_id"))
        .and_then(Value::as_str)
        .map(String::from);
    context.user_id = obj
        .get("user_id")
        .or_else(|| obj.get("sender"))
        .and_then(Value::as_str)
        .map(String::from);

    match tag {
        ProtocolTag::V1 | ProtocolTag::V2 => {
            if let Some(messages) = obj.get("messages").and_then(Value::as_array) {
                context.history = messages
                    .iter()
                    .filter_map(|m| {
                        let role = m.get("role").and_then(Value::as_str)?;
                        let content = m.get("content").and_then(Value::as_str)?;
                        Some(ConversationTurn {
                            role: role.to_string(),
                            content: content.to_string(),
                        })
                    })
                    .collect();
            }
            if let Some(tools) = obj.get("tools").and_then(Value::as_array) {
                context.available_tools = tools
                    .iter()
                    .filter_map(|t| {
                        t.get("name")
                            .or_else(|| t.get("function").and_then(|f| f.get("name")))
                            .and_then(Value::as_str)
                            .map(String::from)
                    })
                    .collect();
            }
        }
        _ => {}
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use agw_core::IntentCategory;
    use serde_json::json;

    fn dispatcher() -> AdapterDispatcher {
        AdapterDispatcher::new()
    }

    #[test]
    fn detects_each_protocol() {
        let cases = [
            (
                json!({"jsonrpc": "2.0", "method": "tools/call", "params": {"name": "x"}}),
                ProtocolTag::Mcp,
            ),
            (
                json!({"id": "1", "sender": "a", "recipient": "b"}),
                ProtocolTag::A2a,
            ),
            (
                json!({"context_id": "c", "operation": "read"}),
                ProtocolTag::Ucp,
            ),
            (json!({"header": {}, "body": {}}), ProtocolTag::Acp),
            (
                json!({"model": "m", "messages": [{"role": "user", "content": "x"}]}),
                ProtocolTag::V1,
            ),
            (
                json!({"model": "m", "messages": [{"role": "user", "content": "x"}], "max_tokens": 5}),
                ProtocolTag::V2,
            ),
        ];
        for (payload, expected) in cases {
            let detected = dispatcher().detect_protocol(payload.to_string().as_bytes());
            assert_eq!(detected, Some(expected), "payload {payload}");
        }
    }

    #[test]
    fn detect_returns_none_for_garbage() {
        assert_eq!(dispatcher().detect_protocol(b"not json"), None);
        assert_eq!(dispatcher().detect_protocol(b"{}"), None);
    }

    #[test]
    fn unknown_tag_string_is_unsupported() {
        let err = dispatcher()
            .convert_tagged(b"{}", "grpc", None)
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedProtocol { ref tag } if tag == "grpc"));
    }

    #[test]
    fn convert_builds_immutable_request() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "search", "arguments": {"q": "hi"}}
        })
        .to_string();
        let request = dispatcher()
            .convert(raw.as_bytes(), ProtocolTag::Mcp, Some("trc-fixed".into()))
            .unwrap();
        assert_eq!(request.source_protocol, ProtocolTag::Mcp);
        assert_eq!(request.intent.category, IntentCategory::ToolCall);
        assert_eq!(request.intent.action, "search");
        assert_eq!(request.metadata.trace_id, "trc-fixed");
        assert_eq!(request.raw_payload["method"], json!("tools/call"));
    }

    #[test]
    fn convert_generates_trace_id_when_absent() {
        let raw = json!({"context_id": "c", "operation": "read"}).to_string();
        let request = dispatcher()
            .convert(raw.as_bytes(), ProtocolTag::Ucp, None)
            .unwrap();
        assert!(request.metadata.trace_id.starts_with("trc-"));
    }

    #[test]
    fn v1_context_extracts_history_and_tools() {
        let raw = json!({
            "model": "m",
            "user_id": "u-9",
            "messages": [
                {"role": "user", "content": "find docs"},
                {"role": "assistant", "content": "sure"}
            ],
            "tools": [{"type": "function", "function": {"name": "search"}}]
        })
        .to_string();
        let request = dispatcher()
            .convert(raw.as_bytes(), ProtocolTag::V1, None)
            .unwrap();
        assert_eq!(request.context.history.len(), 2);
        assert_eq!(request.context.available_tools, vec!["search".to_string()]);
        assert_eq!(request.context.user_id.as_deref(), Some("u-9"));
    }

    #[test]
    fn v2_payload_detects_as_v2_not_v1() {
        let raw = json!({
            "model": "m",
            "messages": [{"role": "user", "content": "x"}],
            "max_tokens": 5
        })
        .to_string();
        assert_eq!(
            dispatcher().detect_protocol(raw.as_bytes()),
            Some(ProtocolTag::V2)
        );
    }

    #[test]
    fn parse_tag_accepts_all_six() {
        for (s, tag) in [
            ("mcp", ProtocolTag::Mcp),
            ("a2a", ProtocolTag::A2a),
            ("ucp", ProtocolTag::Ucp),
            ("acp", ProtocolTag::Acp),
            ("v1", ProtocolTag::V1),
            ("v2", ProtocolTag::V2),
        ] {
            assert_eq!(AdapterDispatcher::parse_tag(s).unwrap(), tag);
        }
    }
}
