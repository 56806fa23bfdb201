// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for Agent-to-Agent envelopes.

use crate::traits::{
    NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings, decode,
    params_from, require_object,
};
use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{IntentAlternative, IntentCategory, NormalizedIntent, ProtocolTag};
use serde_json::Value;

/// Adapter for A2A payloads.
///
/// Mandatory fields: `id`, `sender`, `recipient`. The body is either a
/// `task`, a `message`, or bare (discovery).
#[derive(Debug, Default)]
pub struct A2aAdapter;

impl ProtocolAdapter for A2aAdapter {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::A2a
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, AdapterError> {
        let started = Stopwatch::start();
        let payload = decode(raw)?;
        let obj = require_object(&payload)?;

        for field in ["id", "sender", "recipient"] {
            if !obj.contains_key(field) {
                return Err(AdapterError::parse(
                    format!("MISSING_{}", field.to_uppercase()),
                    format!("missing required \"{field}\" field"),
                ));
            }
        }

        Ok(ParsedMessage {
            meta: ParseMeta {
                protocol: ProtocolTag::A2a,
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

        let recipient = obj
            .get("recipient")
            .and_then(Value::as_str)
            .unwrap_or("agent")
            .to_string();

        let intent = if let Some(task) = obj.get("task") {
            let action = task
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("execute_task");
            let mut intent = NormalizedIntent::new(IntentCategory::ActionExecution, action, 0.9);
            intent.target = recipient;
            intent.parameters = params_from(task.get("parameters").or(Some(task)));
            intent
        } else if let Some(message) = obj.get("message") {
            let is_request = message.get("type").and_then(Value::as_str) == Some("request");
            let (category, action, confidence) = if is_request {
                (IntentCategory::InformationRequest, "handle_request", 0.9)
            } else {
                (IntentCategory::Conversation, "converse", 0.7)
            };
            let mut intent = NormalizedIntent::new(category, action, confidence);
            intent.target = recipient;
            intent.parameters = params_from(Some(message));
            intent
        } else {
            let mut intent = NormalizedIntent::new(IntentCategory::Conversation, "converse", 0.7);
            intent.target = recipient;
            intent.alternatives = vec![IntentAlternative {
                action: "a2a_discovery".into(),
                confidence: 0.3,
                reason: "envelope carries neither task nor message".into(),
            }];
            intent
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
