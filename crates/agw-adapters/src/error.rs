// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adapter error type with stable per-failure codes.

use thiserror::Error;

/// Errors produced by protocol adapters and the dispatcher.
///
/// Parse and normalize failures carry a stable `code` specific to the
/// violated rule (e.g. `"MISSING_METHOD"`, `"PAYLOAD_TOO_LARGE"`) alongside
/// the human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The supplied tag names no registered protocol.
    #[error("unsupported protocol: {tag}")]
    UnsupportedProtocol {
        /// The tag that failed to resolve.
        tag: String,
    },

    /// The raw payload violates the protocol's required shape.
    #[error("parse failed [{code}]: {message}")]
    Parse {
        /// Stable parse-failure code.
        code: String,
        /// Human-readable detail.
        message: String,
    },

    /// A successful parse could not be normalized into an intent.
    #[error("normalize failed [{code}]: {message}")]
    Normalize {
        /// Stable normalize-failure code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

impl AdapterError {
    /// Construct a parse failure.
    #[must_use]
    pub fn parse(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Construct a normalize failure.
    #[must_use]
    pub fn normalize(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Normalize {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> agw_error::ErrorCode {
        match self {
            Self::UnsupportedProtocol { .. } => agw_error::ErrorCode::UnsupportedProtocol,
            Self::Parse { .. } => agw_error::ErrorCode::ParseError,
            Self::Normalize { .. } => agw_error::ErrorCode::NormalizeError,
        }
    }

    /// Convert into the unified gateway taxonomy, preserving the local code
    /// as context.
    #[must_use]
    pub fn into_gateway_error(self) -> agw_error::GatewayError {
        let code = self.error_code();
        let detail = match &self {
            Self::UnsupportedProtocol { tag } => tag.clone(),
            Self::Parse { code, .. } | Self::Normalize { code, .. } => code.clone(),
        };
        agw_error::GatewayError::new(code, self.to_string()).with_context("detail_code", detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_carries_code() {
        let err = AdapterError::parse("MISSING_METHOD", "no method field");
        assert!(matches!(err, AdapterError::Parse { ref code, .. } if code == "MISSING_METHOD"));
        assert!(err.to_string().contains("MISSING_METHOD"));
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(
            AdapterError::UnsupportedProtocol { tag: "xyz".into() }.error_code(),
            agw_error::ErrorCode::UnsupportedProtocol
        );
        assert_eq!(
            AdapterError::parse("X", "y").error_code(),
            agw_error::ErrorCode::ParseError
        );
        assert_eq!(
            AdapterError::normalize("X", "y").error_code(),
            agw_error::ErrorCode::NormalizeError
        );
    }

    #[test]
    fn gateway_error_preserves_detail_code() {
        let err = AdapterError::parse("EMPTY_MESSAGES", "messages is empty").into_gateway_error();
        assert_eq!(err.code, agw_error::ErrorCode::ParseError);
        assert_eq!(
            err.context.get("detail_code").unwrap(),
            &serde_json::json!("EMPTY_MESSAGES")
        );
    }
}
