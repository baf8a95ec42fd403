// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI adapter.
//!
//! Pull → create → start, mirroring the runtime API sequence. All
//! subprocess output is captured; a create rejected because the name is
//! taken becomes [`RuntimeError::NameConflict`].

use crate::runtime::{RuntimeAdapter, RuntimeError};
use async_trait::async_trait;
use orion_core::Task;
use std::collections::HashMap;
use tokio::process::Command;
use tracing::{debug, info};

/// Executor backed by the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self { binary: "docker".to_string() }
    }

    /// Use an alternate binary (e.g. "podman").
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn exec(&self, operation: &str, args: &[String]) -> Result<String, RuntimeError> {
        debug!(operation, ?args, "invoking container runtime");
        let output = Command::new(&self.binary).args(args).output().await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(RuntimeError::CommandFailed { operation: operation.to_string(), stderr })
    }

    /// Arguments for `docker create` on this task.
    ///
    /// Port bindings publish on all interfaces; memory is passed in
    /// bytes and cpu as fractional cores, both of which the CLI accepts
    /// directly.
    fn create_args(task: &Task) -> Vec<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), task.name.clone()];

        if task.memory > 0 {
            args.push("--memory".to_string());
            args.push(format!("{}b", task.memory));
        }
        if task.cpu > 0.0 {
            args.push("--cpus".to_string());
            args.push(format!("{}", task.cpu));
        }
        if !task.restart_policy.is_empty() {
            args.push("--restart".to_string());
            args.push(task.restart_policy.clone());
        }

        let mut bindings: Vec<(&String, &String)> = task.port_bindings.iter().collect();
        bindings.sort();
        for (container_port, host_port) in bindings {
            args.push("--publish".to_string());
            args.push(format!("0.0.0.0:{host_port}:{container_port}"));
        }

        args.push(task.image.clone());
        args.extend(task.command.iter().cloned());
        args
    }
}

#[async_trait]
impl RuntimeAdapter for DockerCli {
    async fn run(&self, task: &Task) -> Result<String, RuntimeError> {
        self.exec("pull", &["pull".to_string(), task.image.clone()]).await?;

        let created = self.exec("create", &Self::create_args(task)).await;
        let runtime_id = match created {
            Ok(id) => id,
            Err(RuntimeError::CommandFailed { stderr, .. })
                if stderr.contains("already in use") || stderr.contains("Conflict") =>
            {
                return Err(RuntimeError::NameConflict(task.name.clone()));
            }
            Err(e) => return Err(e),
        };

        self.exec("start", &["start".to_string(), runtime_id.clone()]).await?;
        info!(task = %task.id, container = %runtime_id, "container started");
        Ok(runtime_id)
    }

    async fn stop(&self, runtime_id: &str) -> Result<(), RuntimeError> {
        self.exec("stop", &["stop".to_string(), runtime_id.to_string()]).await?;
        Ok(())
    }

    async fn collect_stats(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
