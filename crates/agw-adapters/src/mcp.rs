// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter for the Model Context Protocol (JSON-RPC 2.0 framing).

use crate::traits::{
    NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings, decode,
    params_from, require_object,
};
use crate::AdapterError;
use agw_core::clock::Stopwatch;
use agw_core::{IntentAlternative, IntentCategory, NormalizedIntent, ProtocolTag};
use serde_json::Value;

/// Adapter for MCP payloads.
///
/// Mandatory fields: `jsonrpc` equal to `"2.0"` and `method`.
#[derive(Debug, Default)]
pub struct McpAdapter;

impl ProtocolAdapter for McpAdapter {
    fn tag(&self) -> ProtocolTag {
        ProtocolTag::Mcp
    }

    fn parse(&self, raw: &[u8]) -> Result<ParsedMessage, AdapterError> {
        let started = Stopwatch::start();
        let payload = decode(raw)?;
        let obj = require_object(&payload)?;

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some("2.0") => {}
            Some(other) => {
                return Err(AdapterError::parse(
                    "INVALID_JSONRPC",
                    format!("jsonrpc must be \"2.0\", got \"{other}\""),
                ));
            }
            None => {
                return Err(AdapterError::parse(
                    "INVALID_JSONRPC",
                    "missing required \"jsonrpc\" field",
                ));
            }
        }

        if obj.get("method").and_then(Value::as_str).is_none() {
            return Err(AdapterError::parse(
                "MISSING_METHOD",
                "missing required \"method\" field",
            ));
        }

        Ok(ParsedMessage {
            meta: ParseMeta {
                protocol: ProtocolTag::Mcp,
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

        let method = obj
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::normalize("MISSING_METHOD", "method vanished after parse"))?;
        let params = obj.get("params");

        let intent = match method {
            "tools/call" => {
                let name = params
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AdapterError::normalize(
                            "MISSING_TOOL_NAME",
                            "tools/call requires params.name",
                        )
                    })?;
                let mut intent = NormalizedIntent::new(IntentCategory::ToolCall, name, 1.0);
                intent.target = "tool".into();
                intent.parameters = params_from(params.and_then(|p| p.get("arguments")));
                intent
            }
            "resources/read" => {
                let mut intent =
                    NormalizedIntent::new(IntentCategory::DataRetrieval, "read_resource", 0.95);
                intent.target = params
                    .and_then(|p| p.get("uri"))
                    .and_then(Value::as_str)
                    .unwrap_or("resource")
                    .to_string();
                intent.parameters = params_from(params);
                intent
            }
            "prompts/get" => {
                let mut intent =
                    NormalizedIntent::new(IntentCategory::InformationRequest, "get_prompt", 0.95);
                intent.target = params
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("prompt")
                    .to_string();
                intent.parameters = params_from(params);
                intent
            }
            other => {
                let mut intent = NormalizedIntent::new(IntentCategory::Conversation, other, 0.7);
                intent.target = "conversation".into();
                intent.parameters = params_from(params);
                intent.alternatives = vec![IntentAlternative {
                    action: "help".into(),
                    confidence: 0.2,
                    reason: format!("unrecognized MCP method \"{other}\""),
                }];
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
