// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The driver abstraction and the in-process reference driver.
pub mod driver;
/// Sandbox instances and the lifecycle state machine.
pub mod instance;
/// The bounded pool and its counters.
pub mod pool;
/// The runtime: execution, timeouts, maintenance.
pub mod runtime;

pub use driver::{InProcessDriver, RawExecution, SandboxDriver};
pub use instance::{
    InvalidTransition, NetworkPolicy, Sandbox, SandboxConfig, SandboxHandle, SandboxState,
};
pub use pool::{PoolStats, SandboxPool};
pub use runtime::{
    COLD_START_BUDGET_MS, DEFAULT_TIMEOUT_MS, MaintenanceHandle, MaintenanceReport, SandboxRuntime,
};

use thiserror::Error;

/// Errors from the sandbox runtime that are not execution outcomes.
///
/// Execution-level failures (timeouts, tool errors, construction failures)
/// are data inside [`agw_core::ExecutionResult`]; these errors mean no
/// execution was attempted at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// Every sandbox slot is live and none are ready.
    #[error("sandbox pool exhausted: all {max_instances} instances are live")]
    PoolExhausted {
        /// The configured ceiling.
        max_instances: usize,
    },
}

impl SandboxError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> agw_error::ErrorCode {
        match self {
            Self::PoolExhausted { .. } => agw_error::ErrorCode::PoolExhausted,
        }
    }
}
