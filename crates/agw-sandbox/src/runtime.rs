// SPDX-License-Identifier: MIT OR Apache-2.0
//! The sandbox runtime: pooled execution with cold-start budgeting,
//! timeout enforcement, and periodic maintenance.

use crate::driver::{RawExecution, SandboxDriver};
use crate::instance::{NetworkPolicy, Sandbox, SandboxConfig, SandboxState};
use crate::pool::{PoolStats, SandboxPool};
use crate::SandboxError;
use agw_config::SandboxPoolConfig;
use agw_core::clock::Stopwatch;
use agw_core::{ExecutionFailure, ExecutionMetrics, ExecutionResult, ToolDefinition};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Cold starts above this budget are logged; they never fail the request.
pub const COLD_START_BUDGET_MS: u64 = 500;

/// Default execution timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Idle sandboxes reaped and destroyed.
    pub reaped: usize,
    /// Warm sandboxes created to restore the floor.
    pub warmed: usize,
}

struct RuntimeInner {
    driver: Arc<dyn SandboxDriver>,
    pool: SandboxPool,
    network: NetworkPolicy,
}

/// Executes tools in pooled sandboxes.
///
/// Cheap to clone; clones share the pool and driver.
#[derive(Clone)]
pub struct SandboxRuntime {
    inner: Arc<RuntimeInner>,
}

impl SandboxRuntime {
    /// A runtime over the given driver and pool configuration. Tool
    /// sandboxes get the supplied network policy.
    #[must_use]
    pub fn new(driver: Arc<dyn SandboxDriver>, config: SandboxPoolConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                driver,
                pool: SandboxPool::new(config),
                network: NetworkPolicy::Denied,
            }),
        }
    }

    /// A runtime whose tool sandboxes get `network` access.
    #[must_use]
    pub fn with_network(driver: Arc<dyn SandboxDriver>, config: SandboxPoolConfig, network: NetworkPolicy) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                driver,
                pool: SandboxPool::new(config),
                network,
            }),
        }
    }

    /// Pool counter snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Execute `tool` with `args` under the default 30 s timeout.
    ///
    /// # Errors
    ///
    /// See [`execute_with_timeout`](Self::execute_with_timeout).
    pub async fn execute(
        &self,
        tool: &ToolDefinition,
        args: &Value,
    ) -> Result<ExecutionResult, SandboxError> {
        self.execute_with_timeout(tool, args, Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .await
    }

    /// Execute `tool` with `args`, enforcing `timeout`.
    ///
    /// Pool hits report a zero cold start. On a miss a sandbox is
    /// constructed synchronously with the tool-specific configuration and
    /// its creation wall time is the reported cold start. Failed or timed
    /// out executions destroy the sandbox; only clean completions return
    /// it to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::PoolExhausted`] when every slot is live and
    /// none are ready. Execution-level failures (including `TIMEOUT` and
    /// construction failures) are reported inside the [`ExecutionResult`].
    pub async fn execute_with_timeout(
        &self,
        tool: &ToolDefinition,
        args: &Value,
        timeout: Duration,
    ) -> Result<ExecutionResult, SandboxError> {
        let total = Stopwatch::start();

        // Acquire, or construct on demand.
        let (sandbox, cold_start_ms) = match self.inner.pool.acquire() {
            Some(sandbox) => {
                debug!(sandbox_id = %sandbox.id, tool = %tool.id, "pool hit");
                (sandbox, 0)
            }
            None => {
                if !self.inner.pool.has_capacity() {
                    return Err(SandboxError::PoolExhausted {
                        max_instances: self.inner.pool.config().max_instances,
                    });
                }
                let config = SandboxConfig::for_tool(tool, self.inner.network.clone());
                let creation = Stopwatch::start();
                let handle = match self.inner.driver.create(&config).await {
                    Ok(handle) => handle,
                    Err(e) => {
                        // The cold-start metric reports only the elapsed
                        // creation time, even on the failure branch.
                        let cold_ms = creation.elapsed_ms();
                        return Ok(ExecutionResult::failure(
                            ExecutionFailure {
                                code: "SANDBOX_CREATE_FAILED".into(),
                                message: format!("sandbox construction failed: {e}"),
                                stdout: None,
                                stderr: None,
                                exit_code: None,
                            },
                            ExecutionMetrics {
                                cold_start_ms: cold_ms,
                                execution_ms: 0,
                                total_ms: total.elapsed_ms(),
                                memory_peak_mib: None,
                                cpu_percent: None,
                            },
                        ));
                    }
                };
                let cold_ms = creation.elapsed_ms();
                if cold_ms > COLD_START_BUDGET_MS {
                    warn!(tool = %tool.id, cold_ms, "cold start exceeded {COLD_START_BUDGET_MS} ms budget");
                }

                let mut sandbox = Sandbox::new(config, handle);
                sandbox
                    .transition(SandboxState::Ready)
                    .expect("fresh sandboxes become ready");
                sandbox
                    .transition(SandboxState::Running)
                    .expect("ready sandboxes become running");
                self.inner.pool.register_cold(cold_ms);
                (sandbox, cold_ms)
            }
        };

        // Dispatch outside the pool lock, under the caller's timeout.
        let exec = Stopwatch::start();
        let dispatched = tokio::time::timeout(
            timeout,
            self.inner.driver.run(&sandbox.handle, tool, args, timeout),
        )
        .await;
        let execution_ms = exec.elapsed_ms();

        let metrics = |raw: Option<&RawExecution>| ExecutionMetrics {
            cold_start_ms,
            execution_ms,
            total_ms: total.elapsed_ms(),
            memory_peak_mib: raw.and_then(|r| r.memory_peak_mib),
            cpu_percent: raw.and_then(|r| r.cpu_percent),
        };

        match dispatched {
            Err(_elapsed) => {
                warn!(sandbox_id = %sandbox.id, tool = %tool.id, timeout_ms = timeout.as_millis() as u64, "execution timed out");
                self.destroy(sandbox).await;
                Ok(ExecutionResult::failure(
                    ExecutionFailure {
                        code: "TIMEOUT".into(),
                        message: format!(
                            "tool \"{}\" exceeded its {} ms timeout",
                            tool.id,
                            timeout.as_millis()
                        ),
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                    },
                    metrics(None),
                ))
            }
            Ok(Err(driver_err)) => {
                self.destroy(sandbox).await;
                Ok(ExecutionResult::failure(
                    ExecutionFailure {
                        code: "SANDBOX_RUNTIME_FAILED".into(),
                        message: driver_err.to_string(),
                        stdout: None,
                        stderr: None,
                        exit_code: None,
                    },
                    metrics(None),
                ))
            }
            Ok(Ok(raw)) => {
                let m = metrics(Some(&raw));
                match raw.output {
                    Ok(output) => {
                        if let Some(evicted) = self.inner.pool.release(sandbox) {
                            debug!(sandbox_id = %evicted.id, "pool at capacity, destroying oldest");
                            let _ = self.inner.driver.destroy(&evicted.handle).await;
                        }
                        Ok(ExecutionResult::success(output, m))
                    }
                    Err(failure) => {
                        self.destroy(sandbox).await;
                        Ok(ExecutionResult::failure(failure, m))
                    }
                }
            }
        }
    }

    /// One synchronous maintenance pass: reap idle sandboxes, then warm the
    /// pool back to its floor. Tests call this directly for deterministic
    /// ticks.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        for sandbox in self.inner.pool.reap_idle() {
            debug!(sandbox_id = %sandbox.id, "reaping idle sandbox");
            let _ = self.inner.driver.destroy(&sandbox.handle).await;
            report.reaped += 1;
        }

        for _ in 0..self.inner.pool.warm_deficit() {
            let config = SandboxConfig::generic();
            match self.inner.driver.create(&config).await {
                Ok(handle) => {
                    let mut sandbox = Sandbox::new(config, handle);
                    sandbox
                        .transition(SandboxState::Ready)
                        .expect("fresh sandboxes become ready");
                    self.inner.pool.register_warm(sandbox);
                    report.warmed += 1;
                }
                Err(e) => {
                    warn!("warm-up creation failed: {e}");
                }
            }
        }

        if report != MaintenanceReport::default() {
            info!(reaped = report.reaped, warmed = report.warmed, "pool maintenance pass");
        }
        report
    }

    /// Spawn the periodic maintenance task, firing every
    /// `warmup_interval_ms`. The returned handle stops it deterministically.
    #[must_use]
    pub fn spawn_maintenance(&self) -> MaintenanceHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let runtime = self.clone();
        let period = Duration::from_millis(runtime.inner.pool.config().warmup_interval_ms);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so tests control
            // the first pass.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        runtime.run_maintenance().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        MaintenanceHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn destroy(&self, sandbox: Sandbox) {
        let discarded = self.inner.pool.discard_running(sandbox);
        let _ = self.inner.driver.destroy(&discarded.handle).await;
    }
}

/// Stop contract for the background maintenance task.
pub struct MaintenanceHandle {
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }

    /// Abort the task without waiting.
    pub fn abort(self) {
        self.task.abort();
    }
}
