// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log-replicated task events.

use crate::id::{EventId, TaskId};
use crate::task::{Task, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in the replicated log.
///
/// Carries a full snapshot of the task record at the time of the event,
/// so `apply` is self-contained: a late joiner can reconstruct any task
/// from one event without side state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: EventId,
    pub task_id: TaskId,
    /// Desired state for the target task
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
    /// Full task record as of this event
    pub task: Task,
}

impl TaskEvent {
    /// Build an event from a task record, stamping the desired state.
    pub fn new(id: EventId, state: TaskState, timestamp: DateTime<Utc>, task: Task) -> Self {
        Self { id, task_id: task.id.clone(), state, timestamp, task }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
