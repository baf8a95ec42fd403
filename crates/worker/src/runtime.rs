// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime adapter trait and error taxonomy.

use async_trait::async_trait;
use orion_core::Task;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The container name is already taken. Repeated execution attempts
    /// for the same task land here and are treated as already running.
    #[error("container name '{0}' already in use")]
    NameConflict(String),

    /// The runtime binary could not be spawned
    #[error("runtime unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The runtime rejected the operation
    #[error("{operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },
}

/// Interface to the local container runtime.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync + 'static {
    /// Pull the image, create a container named after the task with its
    /// resource limits, restart policy, and port bindings, and start
    /// it. Returns the runtime's container id.
    async fn run(&self, task: &Task) -> Result<String, RuntimeError>;

    /// Gracefully stop a container by runtime id.
    async fn stop(&self, runtime_id: &str) -> Result<(), RuntimeError>;

    /// Resource usage by task name. Reserved for capacity reporting;
    /// may be empty.
    async fn collect_stats(&self) -> HashMap<String, f64>;
}
