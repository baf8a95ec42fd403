// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable fake runtime for tests.

use crate::runtime::{RuntimeAdapter, RuntimeError};
use async_trait::async_trait;
use orion_core::Task;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Behavior of the next `run` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Succeed,
    Conflict,
    Fail,
}

/// In-memory runtime that records calls and returns scripted results.
///
/// By default every run succeeds; a name given to the fake twice
/// conflicts like the real runtime would.
pub struct FakeRuntime {
    mode: Mutex<Mode>,
    running: Mutex<HashMap<String, String>>,
    run_calls: Mutex<Vec<String>>,
    stop_calls: Mutex<Vec<String>>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(Mode::Succeed),
            running: Mutex::new(HashMap::new()),
            run_calls: Mutex::new(Vec::new()),
            stop_calls: Mutex::new(Vec::new()),
        }
    }

    /// Every subsequent run reports a name conflict.
    pub fn always_conflict(&self) {
        *self.mode.lock() = Mode::Conflict;
    }

    /// Every subsequent run fails.
    pub fn always_fail(&self) {
        *self.mode.lock() = Mode::Fail;
    }

    /// Task names passed to `run`, in order.
    pub fn run_calls(&self) -> Vec<String> {
        self.run_calls.lock().clone()
    }

    /// Runtime ids passed to `stop`, in order.
    pub fn stop_calls(&self) -> Vec<String> {
        self.stop_calls.lock().clone()
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntime {
    async fn run(&self, task: &Task) -> Result<String, RuntimeError> {
        self.run_calls.lock().push(task.name.clone());

        match *self.mode.lock() {
            Mode::Conflict => return Err(RuntimeError::NameConflict(task.name.clone())),
            Mode::Fail => {
                return Err(RuntimeError::CommandFailed {
                    operation: "create".to_string(),
                    stderr: "scripted failure".to_string(),
                })
            }
            Mode::Succeed => {}
        }

        let mut running = self.running.lock();
        if running.contains_key(&task.name) {
            return Err(RuntimeError::NameConflict(task.name.clone()));
        }
        let runtime_id = format!("fake-{}", task.name);
        running.insert(task.name.clone(), runtime_id.clone());
        Ok(runtime_id)
    }

    async fn stop(&self, runtime_id: &str) -> Result<(), RuntimeError> {
        self.stop_calls.lock().push(runtime_id.to_string());
        self.running.lock().retain(|_, id| id != runtime_id);
        Ok(())
    }

    async fn collect_stats(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
