// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifier generation.
//!
//! Requests, intents, sandboxes, and audit entries use UUIDv4; trace ids
//! are short prefixed strings so they read well in log lines and audit
//! views.

use uuid::Uuid;

/// Prefix for generated trace ids.
pub const TRACE_PREFIX: &str = "trc-";

/// A fresh UUIDv4 for requests, intents, sandboxes, and audit entries.
#[must_use]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// A fresh trace id: `trc-` followed by 12 hex characters.
#[must_use]
pub fn new_trace_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{TRACE_PREFIX}{}", &simple[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn trace_id_shape() {
        let t = new_trace_id();
        assert!(t.starts_with(TRACE_PREFIX));
        assert_eq!(t.len(), TRACE_PREFIX.len() + 12);
        assert!(t[TRACE_PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn trace_ids_are_unique() {
        assert_ne!(new_trace_id(), new_trace_id());
    }
}
