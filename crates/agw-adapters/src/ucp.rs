// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for Unified Context Protocol operations.

use crate::traits::{
    NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings, decode,
    params_from, require_object,
};
use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{IntentCategory, NormalizedIntent, ProtocolTag};
use serde_json::Value;

/// Adapter for UCP payloads.
///
/// Mandatory fields: `context_id` and `operation`.
#[derive(Debug, Default)]
pub struct UcpAdapter;

impl ProtocolAdapter for UcpAdapter {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Ucp
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, AdapterError> {
        let started = Stopwatch::start();
        let payload = decode(raw)?;
        let obj = require_object(&payload)?;

        if !obj.contains_key("context_id") {
            return Err(AdapterError::parse(
                "MISSING_CONTEXT_ID",
                "missing required \"context_id\" field",
            ));
        }
        if obj.get("operation").and_then(Value::as_str).is_none() {
            return Err(AdapterError::parse(
                "MISSING_OPERATION",
                "missing required \"operation\" field",
            ));
        }

        Ok(ParsedMessage {
            meta: ParseMeta {
                protocol: ProtocolTag::Ucp,
                started,
                byte_size: raw.len(),
            },
            payload,
            parse_time: started.elapsed(),
        })
    }

    fn normalize(&self, parsed: &ParsedMessage) -> Result<NormalizedOutcome, AdapterError> {
        let sw = Stopwatch::start();
        let obj = parsed
            .payload
            .as_object()
            .ok_or_else(|| AdapterError::normalize("NOT_AN_OBJECT", "parsed payload lost shape"))?;

        let operation = obj
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::normalize("MISSING_OPERATION", "operation vanished after parse")
            })?;

        let (category, confidence) = match operation {
            "read" => (IntentCategory::DataRetrieval, 0.95),
            "write" | "update" | "delete" => (IntentCategory::ActionExecution, 0.95),
            "query" | "search" => (IntentCategory::InformationRequest, 0.9),
            "analyze" => (IntentCategory::Analysis, 0.9),
            "generate" => (IntentCategory::CodeGeneration, 0.9),
            _ => (IntentCategory::Conversation, 0.7),
        };

        let mut intent = NormalizedIntent::new(category, operation, confidence);
        intent.target = obj
            .get("resource")
            .and_then(Value::as_str)
            .or_else(|| obj.get("context_id").and_then(Value::as_str))
            .unwrap_or("context")
            .to_string();
        intent.parameters = params_from(obj.get("payload"));
        debug_assert!(intent.is_well_formed());

        Ok(NormalizedOutcome {
            intent,
            timings: StageTimings {
                parse: parsed.parse_time,
                normalize: sw.elapsed(),
            },
        })
    }
}
