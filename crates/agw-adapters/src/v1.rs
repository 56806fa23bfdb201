// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for the first-generation vendor chat API.
//!
//! The V1 shape is the familiar `model` + `messages[]` completion request;
//! tool use is signalled by `tool_calls` on assistant messages.

use crate::traits::{
    NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings, decode,
    params_from, require_object,
};
use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{IntentAlternative, IntentCategory, NormalizedIntent, ProtocolTag};
use serde_json::Value;

/// Adapter for V1 chat payloads.
///
/// Mandatory fields: `model` and a non-empty `messages` array.
#[derive(Debug, Default)]
pub struct V1Adapter;

impl ProtocolAdapter for V1Adapter {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::V1
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, AdapterError> {
        let started = Stopwatch::start();
        let payload = decode(raw)?;
        let obj = require_object(&payload)?;

        if obj.get("model").and_then(Value::as_str).is_none() {
            return Err(AdapterError::parse(
                "MISSING_MODEL",
                "missing required \"model\" field",
            ));
        }
        match obj.get("messages") {
            Some(Value::Array(msgs)) if !msgs.is_empty() => {}
            Some(Value::Array(_)) => {
                return Err(AdapterError::parse(
                    "EMPTY_MESSAGES",
                    "\"messages\" must not be empty",
                ));
            }
            _ => {
                return Err(AdapterError::parse(
                    "MISSING_MESSAGES",
                    "missing required \"messages\" array",
                ));
            }
        }

        Ok(ParsedMessage {
            meta: ParseMeta {
                protocol: ProtocolTag::V1,
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
        let messages = obj
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AdapterError::normalize("MISSING_MESSAGES", "messages vanished after parse")
            })?;

        let intent = match find_tool_call(messages) {
            Some(call) => {
                let name = call
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("tool_call");
                let mut intent = NormalizedIntent::new(IntentCategory::ToolCall, name, 1.0);
                intent.target = "tool".into();
                intent.parameters = tool_call_arguments(call);
                intent
            }
            None => {
                let mut intent =
                    NormalizedIntent::new(IntentCategory::Conversation, "chat", 0.7);
                intent.target = "conversation".into();
                intent.alternatives = seed_alternatives(obj);
                intent
            }
        };
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

/// First `tool_calls` entry on any assistant message, if one exists.
fn find_tool_call(messages: &[Value]) -> Option<&Value> {
    messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
        .find_map(|m| m.get("tool_calls").and_then(Value::as_array))
        .and_then(|calls| calls.first())
}

/// V1 carries tool arguments as a JSON-encoded string; fall back to the
/// raw string when it does not decode.
fn tool_call_arguments(call: &Value) -> std::collections::BTreeMap<String, Value> {
    let args = call.get("function").and_then(|f| f.get("arguments"));
    match args {
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(decoded) => params_from(Some(&decoded)),
            Err(_) => {
                let mut map = std::collections::BTreeMap::new();
                map.insert("arguments".to_string(), Value::String(s.clone()));
                map
            }
        },
        other => params_from(other),
    }
}

/// Alternatives seeded by declared tools and a low sampling temperature.
fn seed_alternatives(obj: &serde_json::Map<String, Value>) -> Vec<IntentAlternative> {
    let mut alts = Vec::new();
    if obj.get("tools").is_some_and(|t| t.as_array().is_some_and(|a| !a.is_empty())) {
        alts.push(IntentAlternative {
            action: "tool_call".into(),
            confidence: 0.4,
            reason: "request declares tools".into(),
        });
    }
    if obj
        .get("temperature")
        .and_then(Value::as_f64)
        .is_some_and(|t| t < 0.3)
    {
        alts.push(IntentAlternative {
            action: "analysis".into(),
            confidence: 0.3,
            reason: "low temperature suggests analytical output".into(),
        });
    }
    alts
}
