// SPDX-License-Identifier: MIT OR Apache-2.0
//! The driver abstraction over container primitives, and the in-process
//! reference driver.

use crate::instance::{SandboxConfig, SandboxHandle};
use agw_core::{ExecutionFailure, ToolDefinition};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of one dispatch into a sandbox.
///
/// A tool-level failure (bad arguments, non-zero exit) is data in
/// `output`; a driver-level `Err` means the isolation primitive itself
/// broke.
#[derive(Debug, Clone)]
pub struct RawExecution {
    /// Tool output, or the tool-level failure.
    pub output: Result<Value, ExecutionFailure>,
    /// Peak memory in MiB, when the driver measures it.
    pub memory_peak_mib: Option<u64>,
    /// Mean CPU utilization percentage, when the driver measures it.
    pub cpu_percent: Option<f64>,
}

/// Abstracts the container orchestration primitives the runtime drives.
#[async_trait]
pub trait SandboxDriver: Send + Sync {
    /// Provision an isolation primitive for the given configuration.
    async fn create(&self, config: &SandboxConfig) -> Result<SandboxHandle>;

    /// Dispatch a tool with arguments into a live sandbox.
    ///
    /// `timeout` is advisory for the driver; the runtime enforces it
    /// regardless.
    async fn run(
        &self,
        handle: &SandboxHandle,
        tool: &ToolDefinition,
        args: &Value,
        timeout: Duration,
    ) -> Result<RawExecution>;

    /// Tear the sandbox down. Idempotent.
    async fn destroy(&self, handle: &SandboxHandle) -> Result<()>;
}

// ---------------------------------------------------------------------------
// InProcessDriver
// ---------------------------------------------------------------------------

type ToolHandler = Arc<dyn Fn(&Value) -> Result<Value, ExecutionFailure> + Send + Sync>;

struct ToolBehavior {
    handler: ToolHandler,
    delay: Duration,
}

/// In-process driver backing tests and the reference build.
///
/// Tools are registered closures; unregistered tools echo their arguments.
/// A per-tool artificial delay makes timeout paths testable, and an
/// optional creation delay makes cold starts measurable.
#[derive(Clone, Default)]
pub struct InProcessDriver {
    inner: Arc<DriverInner>,
}

#[derive(Default)]
struct DriverInner {
    behaviors: Mutex<HashMap<String, ToolBehavior>>,
    live: Mutex<HashSet<SandboxHandle>>,
    create_delay: Mutex<Duration>,
}

impl InProcessDriver {
    /// A driver with no registered tools (everything echoes).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a tool id.
    pub fn register<F>(&self, tool_id: impl Into<String>, handler: F)
    where
        F: Fn(&Value) -> Result<Value, ExecutionFailure> + Send + Sync + 'static,
    {
        self.register_with_delay(tool_id, Duration::ZERO, handler);
    }

    /// Register a handler that sleeps `delay` before responding.
    pub fn register_with_delay<F>(&self, tool_id: impl Into<String>, delay: Duration, handler: F)
    where
        F: Fn(&Value) -> Result<Value, ExecutionFailure> + Send + Sync + 'static,
    {
        self.inner
            .behaviors
            .lock()
            .expect("driver lock poisoned")
            .insert(
                tool_id.into(),
                ToolBehavior {
                    handler: Arc::new(handler),
                    delay,
                },
            );
    }

    /// Make every `create` call take at least `delay`.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.inner.create_delay.lock().expect("driver lock poisoned") = delay;
    }

    /// Number of live (created, not destroyed) handles.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().expect("driver lock poisoned").len()
    }

    fn behavior(&self, tool_id: &str) -> Option<(ToolHandler, Duration)> {
        self.inner
            .behaviors
            .lock()
            .expect("driver lock poisoned")
            .get(tool_id)
            .map(|b| (Arc::clone(&b.handler), b.delay))
    }
}

#[async_trait]
impl SandboxDriver for InProcessDriver {
    async fn create(&self, _config: &SandboxConfig) -> Result<SandboxHandle> {
        let delay = *self.inner.create_delay.lock().expect("driver lock poisoned");
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        let handle = SandboxHandle::new();
        self.inner
            .live
            .lock()
            .expect("driver lock poisoned")
            .insert(handle);
        Ok(handle)
    }

    async fn run(
        &self,
        handle: &SandboxHandle,
        tool: &ToolDefinition,
        args: &Value,
        _timeout: Duration,
    ) -> Result<RawExecution> {
        if !self
            .inner
            .live
            .lock()
            .expect("driver lock poisoned")
            .contains(handle)
        {
            anyhow::bail!("sandbox handle {:?} is not live", handle.0);
        }

        let output = match self.behavior(&tool.id) {
            Some((handler, delay)) => {
                if delay > Duration::ZERO {
                    tokio::time::sleep(delay).await;
                }
                handler(args)
            }
            None => Ok(serde_json::json!({ "tool": tool.id, "echo": args })),
        };

        Ok(RawExecution {
            output,
            memory_peak_mib: Some(16),
            cpu_percent: Some(1.0),
        })
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<()> {
        self.inner
            .live
            .lock()
            .expect("driver lock poisoned")
            .remove(handle);
        Ok(())
    }
}
