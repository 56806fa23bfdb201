// SPDX-License-Identifier: MIT OR Apache-2.0
//! The tool catalog: registered tools the router selects from.

use agw_core::ToolDefinition;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Registry of routable tools, keyed by tool id.
///
/// Registration replaces any previous definition under the same id. The
/// router works on snapshots, so catalog entries are immutable for the
/// lifetime of a routing call.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: Mutex<BTreeMap<String, ToolDefinition>>,
}

impl ToolCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous definition with the same id.
    pub fn register(&self, tool: ToolDefinition) {
        self.tools
            .lock()
            .expect("catalog lock poisoned")
            .insert(tool.id.clone(), tool);
    }

    /// Remove a tool. Returns whether it existed.
    pub fn remove(&self, tool_id: &str) -> bool {
        self.tools
            .lock()
            .expect("catalog lock poisoned")
            .remove(tool_id)
            .is_some()
    }

    /// Look up one tool.
    #[must_use]
    pub fn get(&self, tool_id: &str) -> Option<ToolDefinition> {
        self.tools
            .lock()
            .expect("catalog lock poisoned")
            .get(tool_id)
            .cloned()
    }

    /// Snapshot of every registered tool, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ToolDefinition> {
        self.tools
            .lock()
            .expect("catalog lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.lock().expect("catalog lock poisoned").len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
