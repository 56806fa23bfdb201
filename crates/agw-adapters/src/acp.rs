// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for Agent Communication Protocol (header/body framing).

use crate::traits::{
    NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings, decode,
    params_from, require_object,
};
use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{IntentCategory, NormalizedIntent, ProtocolTag};
use serde_json::Value;

/// Adapter for ACP payloads.
///
/// Mandatory fields: `header` and `body`, both objects.
#[derive(Debug, Default)]
pub struct AcpAdapter;

impl ProtocolAdapter for AcpAdapter {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Acp
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, AdapterError> {
        let started = Stopwatch::start();
        let payload = decode(raw)?;
        let obj = require_object(&payload)?;

        if !obj.get("header").is_some_and(Value::is_object) {
            return Err(AdapterError::parse(
                "MISSING_HEADER",
                "missing required \"header\" object",
            ));
        }
        if !obj.get("body").is_some_and(Value::is_object) {
            return Err(AdapterError::parse(
                "MISSING_BODY",
                "missing required \"body\" object",
            ));
        }

        Ok(ParsedMessage {
            meta: ParseMeta {
                protocol: ProtocolTag::Acp,
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

        let header = obj.get("header").and_then(Value::as_object).ok_or_else(|| {
            AdapterError::normalize("MISSING_HEADER", "header vanished after parse")
        })?;
        let body = obj.get("body").ok_or_else(|| {
            AdapterError::normalize("MISSING_BODY", "body vanished after parse")
        })?;

        let message_type = header
            .get("message_type")
            .and_then(Value::as_str)
            .unwrap_or("");

        let intent = match message_type {
            "command" => {
                let action = body
                    .get("command")
                    .and_then(Value::as_str)
                    .unwrap_or("execute");
                let mut intent =
                    NormalizedIntent::new(IntentCategory::ActionExecution, action, 0.9);
                intent.target = header
                    .get("recipient")
                    .and_then(Value::as_str)
                    .unwrap_or("system")
                    .to_string();
                intent.parameters = params_from(body.get("arguments").or(Some(body)));
                intent
            }
            "query" => {
                let mut intent =
                    NormalizedIntent::new(IntentCategory::InformationRequest, "query", 0.9);
                intent.target = body
                    .get("subject")
                    .and_then(Value::as_str)
                    .unwrap_or("system")
                    .to_string();
                intent.parameters = params_from(Some(body));
                intent
            }
            _ => {
                let mut intent =
                    NormalizedIntent::new(IntentCategory::Conversation, "converse", 0.7);
                intent.target = "conversation".into();
                intent.parameters = params_from(Some(body));
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
