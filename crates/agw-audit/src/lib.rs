// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Fluent builder for audit entries.
pub mod builder;
/// File-based JSONL sink with optional compression and retention.
pub mod sink;
/// The buffered multi-subscriber stream.
pub mod stream;
/// Comprehension telemetry.
pub mod telemetry;
/// Human-optimized views.
pub mod view;

pub use builder::AuditEntryBuilder;
pub use sink::JsonlSink;
pub use stream::{AuditFilter, AuditSink, AuditStream, FlusherHandle, MemorySink, SubscriberHandle};
pub use telemetry::ComprehensionStats;
pub use view::{
    AuditView, ChangeKind, ChangeRecord, Complexity, Impact, ViewAction, ViewContext, ViewDetails,
    ViewGenerator, ViewMetadata, ViewStatus, ViewSummary, COMPREHENSION_TARGET_SEC,
};
