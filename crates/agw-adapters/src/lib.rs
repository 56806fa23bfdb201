// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Adapter for Agent-to-Agent envelopes.
pub mod a2a;
/// Adapter for ACP header/body messages.
pub mod acp;
/// Protocol detection diagnostics.
pub mod detect;
/// The adapter dispatcher.
pub mod dispatch;
/// Adapter error type.
pub mod error;
/// Adapter for MCP JSON-RPC payloads.
pub mod mcp;
/// The shared parse/normalize contract.
pub mod traits;
/// Adapter for Unified Context Protocol operations.
pub mod ucp;
/// Adapter for the first-generation vendor chat API.
pub mod v1;
/// Adapter for the second-generation vendor chat API.
pub mod v2;

pub use a2a::A2aAdapter;
pub use acp::AcpAdapter;
pub use detect::{DetectionResult, detect_all};
pub use dispatch::{AdapterDispatcher, OVERHEAD_BUDGET_MS};
pub use error::AdapterError;
pub use mcp::McpAdapter;
pub use traits::{
    MAX_PAYLOAD_BYTES, NormalizedOutcome, ParseMeta, ParsedMessage, ProtocolAdapter, StageTimings,
};
pub use ucp::UcpAdapter;
pub use v1::V1Adapter;
pub use v2::V2Adapter;
