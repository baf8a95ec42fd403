// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and lifecycle state machine.

use crate::id::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a task.
///
/// Transitions are monotone: `Pending → Scheduled → Running → Completed`
/// or `Failed`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted by the admission API, waiting for placement
    Pending,
    /// Assigned to a node, waiting for execution
    Scheduled,
    /// Started on the assigned node
    Running,
    /// Exited successfully
    Completed,
    /// Execution failed
    Failed,
}

impl TaskState {
    /// Check whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

crate::simple_display! {
    TaskState {
        Pending => "pending",
        Scheduled => "scheduled",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

/// A container task.
///
/// Created by the admission API, mutated only through events in the
/// replicated log, and retained indefinitely after a terminal
/// transition. The `name` doubles as the runtime container name, which
/// is what makes repeated execution attempts idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Image reference (e.g. "nginx:1.25")
    pub image: String,
    /// Command arguments passed to the container entrypoint
    #[serde(default)]
    pub command: Vec<String>,
    /// Container port spec → host port (e.g. "80/tcp" → "8080")
    #[serde(default)]
    pub port_bindings: HashMap<String, String>,
    /// Requested memory in bytes
    #[serde(default)]
    pub memory: u64,
    /// Requested fractional cpu cores
    #[serde(default)]
    pub cpu: f64,
    /// Requested disk in bytes
    #[serde(default)]
    pub disk: u64,
    /// Runtime restart policy tag (e.g. "on-failure")
    #[serde(default)]
    pub restart_policy: String,
    /// Key-value labels a node must carry for this task to be placed on it
    #[serde(default)]
    pub node_selectors: HashMap<String, String>,
    /// Assigned node; empty until scheduled
    #[serde(default)]
    pub node_id: String,
    pub state: TaskState,
    pub submit_time: DateTime<Utc>,
    #[serde(default)]
    pub finish_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Check if the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Check if the task has been assigned to a node.
    pub fn is_assigned(&self) -> bool {
        !self.node_id.is_empty()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
