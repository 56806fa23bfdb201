// SPDX-License-Identifier: MIT OR Apache-2.0
//! Protocol detection diagnostics.
//!
//! [`AdapterDispatcher::detect_protocol`](crate::AdapterDispatcher::detect_protocol)
//! is the authoritative first-parse-wins detector; this module scores *all*
//! protocols against a payload for diagnostics and ambiguity reporting.

use agw_core::ProtocolTag;
use serde_json::Value;

/// Result of scoring one protocol against a payload.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// The scored protocol.
    pub tag: ProtocolTag,
    /// Score in `[0.0, 1.0]`: fraction of the protocol's markers present.
    pub confidence: f64,
    /// Human-readable evidence strings explaining the match.
    pub evidence: Vec<String>,
}

/// Score every protocol against a JSON payload, returning matches sorted by
/// descending confidence. Non-objects match nothing.
#[must_use]
pub fn detect_all(value: &Value) -> Vec<DetectionResult> {
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };

    let mut results: Vec<DetectionResult> = ProtocolTag::all()
        .iter()
        .filter_map(|&tag| {
            let (confidence, evidence) = score(tag, obj);
            (confidence > 0.0).then_some(DetectionResult {
                tag,
                confidence,
                evidence,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

fn score(tag: ProtocolTag, obj: &serde_json::Map<String, Value>) -> (f64, Vec<String>) {
    let markers: &[&str] = match tag {
        ProtocolTag::Mcp => &["jsonrpc", "method"],
        ProtocolTag::A2a => &["id", "sender", "recipient"],
        ProtocolTag::Ucp => &["context_id", "operation"],
        ProtocolTag::Acp => &["header", "body"],
        ProtocolTag::V1 => &["model", "messages"],
        ProtocolTag::V2 => &["model", "messages", "max_tokens"],
    };

    let mut evidence = Vec::new();
    let mut present = 0usize;
    for &marker in markers {
        if obj.contains_key(marker) {
            present += 1;
            evidence.push(format!("has \"{marker}\" key"));
        }
    }

    (present as f64 / markers.len() as f64, evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mcp_payload_scores_mcp_highest() {
        let results = detect_all(&json!({"jsonrpc": "2.0", "method": "tools/call"}));
        assert_eq!(results[0].tag, ProtocolTag::Mcp);
        assert!((results[0].confidence - 1.0).abs() < f64::EPSILON);
        assert!(!results[0].evidence.is_empty());
    }

    #[test]
    fn v2_payload_outranks_v1() {
        let results = detect_all(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 100
        }));
        let v2_pos = results.iter().position(|r| r.tag == ProtocolTag::V2).unwrap();
        let v1_pos = results.iter().position(|r| r.tag == ProtocolTag::V1).unwrap();
        assert!(v2_pos < v1_pos || results[v2_pos].confidence >= results[v1_pos].confidence);
    }

    #[test]
    fn non_object_matches_nothing() {
        assert!(detect_all(&json!(42)).is_empty());
        assert!(detect_all(&json!([1, 2])).is_empty());
        assert!(detect_all(&json!(null)).is_empty());
    }

    #[test]
    fn results_sorted_descending() {
        let results = detect_all(&json!({
            "id": "x",
            "sender": "a",
            "model": "m"
        }));
        for w in results.windows(2) {
            assert!(w[0].confidence >= w[1].confidence);
        }
    }
}
