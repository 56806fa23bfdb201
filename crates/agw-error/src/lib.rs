// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Protocol detection and adapter parsing/normalization errors.
    Adapter,
    /// Embedding generation and similarity errors.
    Embedding,
    /// Tool selection errors.
    Routing,
    /// Sandbox pool and execution errors.
    Sandbox,
    /// Credential resolution errors.
    Credential,
    /// Audit stream errors (contained, never propagated).
    Audit,
    /// Configuration errors.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Adapter => "adapter",
            Self::Embedding => "embedding",
            Self::Routing => "routing",
            Self::Sandbox => "sandbox",
            Self::Credential => "credential",
            Self::Audit => "audit",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Adapter --
    /// The protocol tag is not one of the six supported protocols.
    UnsupportedProtocol,
    /// The raw payload violates the protocol's required shape.
    ParseError,
    /// A successful parse could not be normalized into an intent.
    NormalizeError,

    // -- Embedding --
    /// Two vectors of different dimensions were compared.
    DimensionMismatch,

    // -- Routing --
    /// No catalog tool cleared the similarity and confidence thresholds.
    NoMatch,
    /// A downstream embedding failure surfaced during routing.
    RoutingError,

    // -- Sandbox --
    /// Tool execution failed; the message carries the execution code.
    ExecutionError,
    /// Every sandbox slot is live and none are ready.
    PoolExhausted,

    // -- Credential --
    /// A required credential id did not resolve to a secret.
    CredentialMissing,

    // -- Audit --
    /// A subscriber handler failed; contained, never propagated.
    AuditHandlerError,

    // -- Cross-cutting --
    /// An operation exceeded its effective deadline.
    Timeout,
    /// Configuration value out of range or inconsistent.
    ConfigInvalid,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedProtocol | Self::ParseError | Self::NormalizeError => {
                ErrorCategory::Adapter
            }
            Self::DimensionMismatch => ErrorCategory::Embedding,
            Self::NoMatch | Self::RoutingError => ErrorCategory::Routing,
            Self::ExecutionError | Self::PoolExhausted => ErrorCategory::Sandbox,
            Self::CredentialMissing => ErrorCategory::Credential,
            Self::AuditHandlerError => ErrorCategory::Audit,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::Timeout | Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation (e.g. `"PARSE_ERROR"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedProtocol => "UNSUPPORTED_PROTOCOL",
            Self::ParseError => "PARSE_ERROR",
            Self::NormalizeError => "NORMALIZE_ERROR",
            Self::DimensionMismatch => "DIMENSION_MISMATCH",
            Self::NoMatch => "NO_MATCH",
            Self::RoutingError => "ROUTING_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::PoolExhausted => "POOL_EXHAUSTED",
            Self::CredentialMissing => "CREDENTIAL_MISSING",
            Self::AuditHandlerError => "AUDIT_HANDLER_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Unified gateway error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// suggestion for the caller, an optional source error for cause-chaining,
/// and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use agw_error::{ErrorCode, GatewayError};
///
/// let err = GatewayError::new(ErrorCode::NoMatch, "no tool cleared the threshold")
///     .with_suggestion("rephrase the request or widen the catalog")
///     .with_context("candidates", 3);
/// ```
pub struct GatewayError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional actionable next step for the caller.
    pub suggestion: Option<String>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl GatewayError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: None,
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a suggestion the caller can act on.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The broad category of this error's code.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("suggestion", &self.suggestion)
            .field("context", &self.context)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// Serializable projection of a [`GatewayError`] for API boundaries.
///
/// Drops the source chain so no stack traces cross the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code string.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional actionable suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Structured diagnostic context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            suggestion: err.suggestion.clone(),
            context: err.context.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::UnsupportedProtocol,
        ErrorCode::ParseError,
        ErrorCode::NormalizeError,
        ErrorCode::DimensionMismatch,
        ErrorCode::NoMatch,
        ErrorCode::RoutingError,
        ErrorCode::ExecutionError,
        ErrorCode::PoolExhausted,
        ErrorCode::CredentialMissing,
        ErrorCode::AuditHandlerError,
        ErrorCode::Timeout,
        ErrorCode::ConfigInvalid,
        ErrorCode::Internal,
    ];

    #[test]
    fn codes_serialize_to_screaming_snake_case() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn codes_roundtrip() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(&back, code);
        }
    }

    #[test]
    fn every_code_has_a_category() {
        for code in ALL_CODES {
            // Display must not panic and category must be consistent.
            let _ = format!("{} -> {}", code, code.category());
        }
    }

    #[test]
    fn builder_accumulates_context() {
        let err = GatewayError::new(ErrorCode::NoMatch, "nothing cleared the bar")
            .with_suggestion("widen the catalog")
            .with_context("threshold", 0.85)
            .with_context("candidates", 2);
        assert_eq!(err.code, ErrorCode::NoMatch);
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.suggestion.as_deref(), Some("widen the catalog"));
    }

    #[test]
    fn display_includes_code_and_suggestion() {
        let err = GatewayError::new(ErrorCode::Timeout, "deadline exceeded")
            .with_suggestion("raise max_latency_ms");
        let s = format!("{err}");
        assert!(s.contains("TIMEOUT"));
        assert!(s.contains("deadline exceeded"));
        assert!(s.contains("raise max_latency_ms"));
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::other("disk on fire");
        let err = GatewayError::new(ErrorCode::Internal, "persist failed").with_source(io);
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("disk on fire"));
    }

    #[test]
    fn error_body_drops_source() {
        let io = std::io::Error::other("secret path");
        let err = GatewayError::new(ErrorCode::ExecutionError, "tool crashed")
            .with_source(io)
            .with_context("tool", "t1");
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, "EXECUTION_ERROR");
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("secret path"));
    }

    #[test]
    fn category_display_is_lowercase() {
        assert_eq!(format!("{}", ErrorCategory::Adapter), "adapter");
        assert_eq!(format!("{}", ErrorCategory::Sandbox), "sandbox");
    }
}
