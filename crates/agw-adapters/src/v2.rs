// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for the second-generation vendor chat API.
//!
//! The V2 shape requires an explicit `max_tokens` and carries message
//! content as typed blocks; tool use is a `tool_use` content block.

use crate::traits::{
    NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings, decode,
    params_from, require_object,
};
use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{IntentAlternative, IntentCategory, NormalizedIntent, ProtocolTag};
use serde_json::Value;

/// Adapter for V2 chat payloads.
///
/// Mandatory fields: `model`, a non-empty `messages` array, and
/// `max_tokens`.
#[derive(Debug, Default)]
pub struct V2Adapter;

impl ProtocolAdapter for V2Adapter {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::V2
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
        if !obj.get("max_tokens").is_some_and(Value::is_number) {
            return Err(AdapterError::parse(
                "MISSING_MAX_TOKENS",
                "missing required \"max_tokens\" field",
            ));
        }

        Ok(ParsedMessage {
            meta: ParseMeta {
                protocol: ProtocolTag::V2,
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

        let intent = match find_tool_use(messages) {
            Some(block) => {
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("tool_call");
                let mut intent = NormalizedIntent::new(IntentCategory::ToolCall, name, 1.0);
                intent.target = "tool".into();
                intent.parameters = params_from(block.get("input"));
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

/// First `tool_use` content block in any message, if one exists.
fn find_tool_use(messages: &[Value]) -> Option<&Value> {
    messages
        .iter()
        .filter_map(|m| m.get("content").and_then(Value::as_array))
        .flatten()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
}

/// Alternatives seeded by declared tools and a system prompt.
fn seed_alternatives(obj: &serde_json::Map<String, Value>) -> Vec<IntentAlternative> {
    let mut alts = Vec::new();
    if obj.get("tools").is_some_and(|t| t.as_array().is_some_and(|a| !a.is_empty())) {
        alts.push(IntentAlternative {
            action: "tool_call".into(),
            confidence: 0.4,
            reason: "request declares tools".into(),
        });
    }
    if obj.get("system").is_some() {
        alts.push(IntentAlternative {
            action: "guided_conversation".into(),
            confidence: 0.3,
            reason: "system prompt constrains the exchange".into(),
        });
    }
    alts
}
