// SPDX-License-Identifier: MIT OR Apache-2.0
//! The pool: a single critical section over the ready set and counters.
//!
//! Everything that touches pool state (acquire, return, evict, reap, warm
//! registration) happens under one mutex. Driver calls — creation, tool
//! dispatch, destruction — run outside it.

use crate::instance::{Sandbox, SandboxState};
use agw_config::SandboxPoolConfig;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

/// EMA smoothing factor for the pool-hit rate and cold-start averages.
const EMA_ALPHA: f64 = 0.1;

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    /// Sandboxes constructed over the pool's lifetime.
    pub total_created: u64,
    /// Sandboxes destroyed over the pool's lifetime.
    pub total_destroyed: u64,
    /// Sandboxes currently held by executors.
    pub active: u64,
    /// Sandboxes currently ready in the pool.
    pub ready: usize,
    /// Exponential moving average of cold-start time in milliseconds.
    pub cold_start_ema_ms: f64,
    /// Exponential moving average of the pool-hit rate, updated on every
    /// acquisition outcome.
    pub pool_hit_rate: f64,
    /// Executions served.
    pub executions: u64,
}

impl PoolStats {
    /// The pool invariant: `active = created − destroyed − ready`. Never
    /// negative.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let derived = self.total_created as i64 - self.total_destroyed as i64 - self.ready as i64;
        derived >= 0 && derived == self.active as i64
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Ready sandboxes ordered by last use: front is least recent.
    ready: VecDeque<Sandbox>,
    total_created: u64,
    total_destroyed: u64,
    active: u64,
    cold_start_ema_ms: f64,
    pool_hit_rate: f64,
    executions: u64,
}

/// The bounded sandbox pool.
pub struct SandboxPool {
    inner: Mutex<PoolInner>,
    config: SandboxPoolConfig,
}

impl SandboxPool {
    /// An empty pool under the given configuration.
    #[must_use]
    pub fn new(config: SandboxPoolConfig) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            config,
        }
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &SandboxPoolConfig {
        &self.config
    }

    /// Acquire the least-recently-used ready sandbox, atomically removing
    /// it from the pool and marking it running.
    ///
    /// Updates the hit-rate EMA with a hit. Returns `None` (and records a
    /// miss) when the pool is empty.
    pub fn acquire(&self) -> Option<Sandbox> {
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        match inner.ready.pop_front() {
            Some(mut sandbox) => {
                sandbox
                    .transition(SandboxState::Running)
                    .expect("ready sandboxes transition to running");
                inner.active += 1;
                inner.pool_hit_rate = ema(inner.pool_hit_rate, 1.0);
                Some(sandbox)
            }
            None => {
                inner.pool_hit_rate = ema(inner.pool_hit_rate, 0.0);
                None
            }
        }
    }

    /// Whether a new sandbox may be constructed without breaching
    /// `max_instances` (live = active + ready).
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        let inner = self.inner.lock().expect("pool lock poisoned");
        (inner.active as usize + inner.ready.len()) < self.config.max_instances
    }

    /// Record a cold-start construction whose sandbox goes straight to an
    /// executor.
    pub fn register_cold(&self, cold_start_ms: u64) {
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        inner.total_created += 1;
        inner.active += 1;
        inner.cold_start_ema_ms = ema(inner.cold_start_ema_ms, cold_start_ms as f64);
    }

    /// Insert a warm sandbox constructed by the maintenance loop.
    pub fn register_warm(&self, sandbox: Sandbox) {
        debug_assert_eq!(sandbox.state, SandboxState::Ready);
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        inner.total_created += 1;
        inner.ready.push_back(sandbox);
    }

    /// Return a running sandbox to the pool after a successful execution.
    ///
    /// Stamps `last_used_at`, increments the execution counters, and — when
    /// the ready set is already at `max_instances` — evicts the oldest
    /// ready sandbox, which the caller must destroy outside the lock.
    pub fn release(&self, mut sandbox: Sandbox) -> Option<Sandbox> {
        sandbox
            .transition(SandboxState::Ready)
            .expect("running sandboxes transition back to ready");
        sandbox.last_used_at = Utc::now();
        sandbox.execution_count += 1;

        let mut inner = self.inner.lock().expect("pool lock poisoned");
        inner.active -= 1;
        inner.executions += 1;

        let evicted = if inner.ready.len() >= self.config.max_instances {
            let mut oldest = inner
                .ready
                .pop_front()
                .expect("non-empty ready set at capacity");
            oldest
                .transition(SandboxState::Destroyed)
                .expect("ready sandboxes can be destroyed");
            inner.total_destroyed += 1;
            Some(oldest)
        } else {
            None
        };

        inner.ready.push_back(sandbox);
        evicted
    }

    /// Account for a running sandbox that is being destroyed instead of
    /// returned (failure, timeout, cancellation).
    pub fn discard_running(&self, mut sandbox: Sandbox) -> Sandbox {
        sandbox
            .transition(SandboxState::Destroyed)
            .expect("running sandboxes can be destroyed");
        let mut inner = self.inner.lock().expect("pool lock poisoned");
        inner.active -= 1;
        inner.total_destroyed += 1;
        inner.executions += 1;
        sandbox
    }

    /// Remove every ready sandbox idle past `idle_timeout_ms`, marking them
    /// destroyed. The caller tears them down outside the lock.
    pub fn reap_idle(&self) -> Vec<Sandbox> {
        let now = Utc::now();
        let timeout = chrono::Duration::milliseconds(self.config.idle_timeout_ms as i64);
        let mut inner = self.inner.lock().expect("pool lock poisoned");

        let mut kept = VecDeque::with_capacity(inner.ready.len());
        let mut reaped = Vec::new();
        while let Some(mut sandbox) = inner.ready.pop_front() {
            if sandbox.idle(now) > timeout {
                sandbox
                    .transition(SandboxState::Destroyed)
                    .expect("ready sandboxes can be destroyed");
                reaped.push(sandbox);
            } else {
                kept.push_back(sandbox);
            }
        }
        inner.ready = kept;
        inner.total_destroyed += reaped.len() as u64;
        reaped
    }

    /// How many warm sandboxes the maintenance loop should construct to
    /// reach the floor.
    #[must_use]
    pub fn warm_deficit(&self) -> usize {
        let inner = self.inner.lock().expect("pool lock poisoned");
        self.config.min_instances.saturating_sub(inner.ready.len())
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().expect("pool lock poisoned");
        PoolStats {
            total_created: inner.total_created,
            total_destroyed: inner.total_destroyed,
            active: inner.active,
            ready: inner.ready.len(),
            cold_start_ema_ms: inner.cold_start_ema_ms,
            pool_hit_rate: inner.pool_hit_rate,
            executions: inner.executions,
        }
    }
}

fn ema(current: f64, sample: f64) -> f64 {
    EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * current
}
