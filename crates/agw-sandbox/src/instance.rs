// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sandbox instances: configuration, lifecycle state, and the state machine.

use agw_core::ToolDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Network access granted to a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    /// No network access.
    Denied,
    /// Access limited to the listed hosts.
    Restricted(Vec<String>),
    /// Unrestricted access.
    Open,
}

/// Resource and isolation settings for one sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Container image identifier.
    pub image: String,
    /// CPU allocation in cores.
    pub cpu_cores: f64,
    /// Memory limit in MiB.
    pub memory_mib: u64,
    /// Disk limit in MiB.
    pub disk_mib: u64,
    /// Network access policy.
    pub network: NetworkPolicy,
    /// Tool ids allowed to run in this sandbox.
    pub allowed_tools: Vec<String>,
    /// Default execution timeout in milliseconds.
    pub timeout_ms: u64,
    /// Environment variables injected into the sandbox.
    pub env: BTreeMap<String, String>,
}

impl SandboxConfig {
    /// Tool-specific configuration used on the cold-start path.
    #[must_use]
    pub fn for_tool(tool: &ToolDefinition, network: NetworkPolicy) -> Self {
        Self {
            image: format!("tool-{}", tool.id),
            cpu_cores: 0.5,
            memory_mib: 256,
            disk_mib: 1024,
            network,
            allowed_tools: vec![tool.id.clone()],
            timeout_ms: 30_000,
            env: BTreeMap::new(),
        }
    }

    /// Generic low-resource configuration used by the pool warmer.
    #[must_use]
    pub fn generic() -> Self {
        Self {
            image: "generic-runtime".into(),
            cpu_cores: 0.1,
            memory_mib: 64,
            disk_mib: 256,
            network: NetworkPolicy::Denied,
            allowed_tools: Vec::new(),
            timeout_ms: 30_000,
            env: BTreeMap::new(),
        }
    }
}

/// Sandbox lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Being constructed by the driver.
    Creating,
    /// In the pool, available for acquisition.
    Ready,
    /// Held by exactly one executor.
    Running,
    /// Terminal; never reused.
    Destroyed,
}

/// Returned on an illegal lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal sandbox transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// State the sandbox was in.
    pub from: SandboxState,
    /// State that was requested.
    pub to: SandboxState,
}

/// Opaque driver-level handle to the underlying isolation primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxHandle(pub Uuid);

impl SandboxHandle {
    /// A fresh handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SandboxHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One isolated execution context.
///
/// The runtime exclusively owns every sandbox that is not destroyed; a
/// running sandbox is held by exactly one executor at a time.
#[derive(Debug, Clone)]
pub struct Sandbox {
    /// Unique sandbox identifier.
    pub id: Uuid,
    /// Resource and isolation settings.
    pub config: SandboxConfig,
    /// Lifecycle state.
    pub state: SandboxState,
    /// When the sandbox was created.
    pub created_at: DateTime<Utc>,
    /// When the sandbox last finished an execution (or was created).
    pub last_used_at: DateTime<Utc>,
    /// How many executions this sandbox has served. Only increases.
    pub execution_count: u64,
    /// Driver handle for dispatch and destruction.
    pub handle: SandboxHandle,
}

impl Sandbox {
    /// A sandbox in the `Creating` state with a fresh id.
    #[must_use]
    pub fn new(config: SandboxConfig, handle: SandboxHandle) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            config,
            state: SandboxState::Creating,
            created_at: now,
            last_used_at: now,
            execution_count: 0,
            handle,
        }
    }

    /// Transition to a new lifecycle state.
    ///
    /// Legal edges: creating→ready, ready→running, running→ready,
    /// ready→destroyed, running→destroyed. Destroyed is terminal.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for any other edge.
    pub fn transition(&mut self, to: SandboxState) -> Result<(), InvalidTransition> {
        use SandboxState::{Creating, Destroyed, Ready, Running};
        let legal = matches!(
            (self.state, to),
            (Creating, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Ready, Destroyed)
                | (Running, Destroyed)
        );
        if !legal {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Idle time since the last use, saturating at zero.
    #[must_use]
    pub fn idle(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.last_used_at).max(chrono::Duration::zero())
    }
}
