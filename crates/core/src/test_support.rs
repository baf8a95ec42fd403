// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared by other crates' tests.

use crate::id::TaskId;
use crate::task::{Task, TaskState};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;

/// Builder for [`Task`] records with sensible test defaults.
pub struct TaskBuilder {
    id: String,
    name: String,
    image: String,
    command: Vec<String>,
    port_bindings: HashMap<String, String>,
    memory: u64,
    cpu: f64,
    disk: u64,
    restart_policy: String,
    node_selectors: HashMap<String, String>,
    node_id: String,
    state: TaskState,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self {
            id: "task-1".to_string(),
            name: "test-task".to_string(),
            image: "alpine".to_string(),
            command: Vec::new(),
            port_bindings: HashMap::new(),
            memory: 0,
            cpu: 0.0,
            disk: 0,
            restart_policy: String::new(),
            node_selectors: HashMap::new(),
            node_id: String::new(),
            state: TaskState::Pending,
        }
    }
}

impl TaskBuilder {
    pub fn id(mut self, v: impl Into<String>) -> Self {
        self.id = v.into();
        self
    }

    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = v.into();
        self
    }

    pub fn image(mut self, v: impl Into<String>) -> Self {
        self.image = v.into();
        self
    }

    pub fn command(mut self, v: Vec<String>) -> Self {
        self.command = v;
        self
    }

    pub fn port_binding(mut self, container: impl Into<String>, host: impl Into<String>) -> Self {
        self.port_bindings.insert(container.into(), host.into());
        self
    }

    pub fn memory(mut self, v: u64) -> Self {
        self.memory = v;
        self
    }

    pub fn cpu(mut self, v: f64) -> Self {
        self.cpu = v;
        self
    }

    pub fn disk(mut self, v: u64) -> Self {
        self.disk = v;
        self
    }

    pub fn restart_policy(mut self, v: impl Into<String>) -> Self {
        self.restart_policy = v.into();
        self
    }

    pub fn selector(mut self, k: impl Into<String>, v: impl Into<String>) -> Self {
        self.node_selectors.insert(k.into(), v.into());
        self
    }

    pub fn node_id(mut self, v: impl Into<String>) -> Self {
        self.node_id = v.into();
        self
    }

    pub fn state(mut self, v: TaskState) -> Self {
        self.state = v;
        self
    }

    pub fn build(self) -> Task {
        Task {
            id: TaskId::new(self.id),
            name: self.name,
            image: self.image,
            command: self.command,
            port_bindings: self.port_bindings,
            memory: self.memory,
            cpu: self.cpu,
            disk: self.disk,
            restart_policy: self.restart_policy,
            node_selectors: self.node_selectors,
            node_id: self.node_id,
            state: self.state,
            submit_time: Utc.timestamp_millis_opt(1_000_000).single().unwrap_or_default(),
            finish_time: None,
        }
    }
}

impl Task {
    /// Create a builder with test defaults.
    pub fn builder() -> TaskBuilder {
        TaskBuilder::default()
    }
}
