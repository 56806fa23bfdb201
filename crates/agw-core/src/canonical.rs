// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON rendering with recursively sorted object keys.
//!
//! Adapters preserve parameters as opaque dynamic data; whenever that data
//! is hashed (embedding cache keys) or diffed (audit change detection) it
//! must first be rendered deterministically.

use serde_json::Value;
use std::collections::BTreeMap;

/// Render a JSON value with every object's keys sorted, recursively.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    render(value)
}

/// Canonical rendering of a string-keyed map, as used for intent
/// parameters and audit snapshots.
#[must_use]
pub fn canonical_map(map: &BTreeMap<String, Value>) -> String {
    let mut out = String::from("{");
    let mut first = true;
    for (k, v) in map {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&serde_json::to_string(k).unwrap_or_default());
        out.push(':');
        out.push_str(&render(v));
    }
    out.push('}');
    out
}

fn render(value: &Value) -> String {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            let mut first = true;
            for k in keys {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&serde_json::to_string(k).unwrap_or_default());
                out.push(':');
                out.push_str(&render(&obj[k]));
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let mut out = String::from("[");
            let mut first = true;
            for item in items {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&render(item));
            }
            out.push(']');
            out
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
