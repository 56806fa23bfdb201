// SPDX-License-Identifier: MIT OR Apache-2.0
//! The shared parse/normalize contract every adapter implements.

use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{NormalizedIntent, ProtocolTag};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Hard ceiling on accepted payloads: 10 MiB, adapter-enforced.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Metadata captured at the start of a parse.
#[derive(Debug, Clone, Copy)]
pub struct ParseMeta {
    /// Protocol the adapter speaks.
    pub protocol: ProtocolTag,
    /// Stopwatch started when parse began; normalization reads it for the
    /// end-to-end overhead measurement.
    pub started: Stopwatch,
    /// Size of the raw payload in bytes.
    pub byte_size: usize,
}

/// A successfully parsed message: the validated payload plus metadata.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    /// Parse metadata.
    pub meta: ParseMeta,
    /// The payload, validated against the protocol's mandatory fields.
    pub payload: Value,
    /// How long the parse took.
    pub parse_time: Duration,
}

/// Durations for the two adapter stages, from the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct StageTimings {
    /// Time spent in parse.
    pub parse: Duration,
    /// Time spent in normalize.
    pub normalize: Duration,
}

impl StageTimings {
    /// Combined adapter overhead.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.parse + self.normalize
    }
}

/// Output of a successful normalization.
#[derive(Debug, Clone)]
pub struct NormalizedOutcome {
    /// The normalized intent.
    pub intent: NormalizedIntent,
    /// Stage durations.
    pub timings: StageTimings,
}

/// One wire protocol's parse and normalize operations.
///
/// Both operations return discriminated results; they never panic on
/// hostile input.
pub trait ProtocolAdapter: Send + Sync {
    /// The protocol this adapter speaks.
    fn tag(&self) -> ProtocolTag;

    /// Validate the payload's mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Parse`] with a stable code naming the
    /// violated rule.
    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, AdapterError>;

    /// Turn a successful parse into a [`NormalizedIntent`].
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Normalize`] when no intent can be derived.
    fn normalize(&self, parsed: &ParsedMessage) -> Result<NormalizedOutcome, AdapterError>;
}

// ── Shared parse helpers ────────────────────────────────────────────────

/// Enforce the payload size cap and decode JSON.
pub(crate) fn decode(raw: &[u8]) -> Result<Value, AdapterError> {
    if raw.len() > MAX_PAYLOAD_BYTES {
        return Err(AdapterError::parse(
            "PAYLOAD_TOO_LARGE",
            format!("payload is {} bytes, cap is {MAX_PAYLOAD_BYTES}", raw.len()),
        ));
    }
    serde_json::from_slice(raw)
        .map_err(|e| AdapterError::parse("INVALID_JSON", format!("payload is not JSON: {e}")))
}

/// Require the decoded value to be a JSON object.
pub(crate) fn require_object(value: &Value) -> Result<&serde_json::Map<String, Value>, AdapterError> {
    value
        .as_object()
        .ok_or_else(|| AdapterError::parse("NOT_AN_OBJECT", "payload must be a JSON object"))
}

/// Extract an object field into the intent parameter map; non-objects and
/// absent fields yield an empty map.
pub(crate) fn params_from(value: Option<&Value>) -> BTreeMap<String, Value> {
    match value.and_then(Value::as_object) {
        Some(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_oversized_payload() {
        let raw = vec![b'x'; MAX_PAYLOAD_BYTES + 1];
        let err = decode(&raw).unwrap_err();
        assert!(matches!(err, AdapterError::Parse { ref code, .. } if code == "PAYLOAD_TOO_LARGE"));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode(b"not json at all").unwrap_err();
        assert!(matches!(err, AdapterError::Parse { ref code, .. } if code == "INVALID_JSON"));
    }

    #[test]
    fn require_object_rejects_arrays() {
        let v = serde_json::json!([1, 2, 3]);
        assert!(require_object(&v).is_err());
    }

    #[test]
    fn params_from_copies_object_entries() {
        let v = serde_json::json!({"q": "hi", "n": 3});
        let params = params_from(Some(&v));
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("q").unwrap(), &serde_json::json!("hi"));
    }

    #[test]
    fn params_from_tolerates_non_objects() {
        assert!(params_from(Some(&serde_json::json!("scalar"))).is_empty());
        assert!(params_from(None).is_empty());
    }
}
