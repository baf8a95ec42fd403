// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconciler: drives tasks through their lifecycle each tick.
//!
//! Execution runs before scheduling within a tick, so in a single-node
//! cluster a task submitted between ticks is placed on one tick and
//! executed on the next without racing.

use orion_cluster::Cluster;
use orion_core::{Clock, EventId, IdGen, Task, TaskEvent, TaskState, UuidIdGen};
use orion_scheduler::{select_candidate, Node};
use orion_store::Store;
use orion_worker::{RuntimeAdapter, RuntimeError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default reconcile cadence.
pub const TICK_PERIOD: Duration = Duration::from_secs(5);

/// Disk inventory placeholder until stats collection reports real
/// usage. Memory and cpu come from gossip metadata.
const DISK_TOTAL: u64 = 100 * 1024 * 1024 * 1024;

/// Periodic reconciliation loop.
///
/// Every node executes tasks scheduled onto it; the leader additionally
/// places pending tasks. All state changes go through the log; nothing
/// is committed locally outside it.
pub struct Manager<R, C>
where
    R: RuntimeAdapter,
    C: Clock,
{
    store: Arc<Store>,
    cluster: Cluster,
    runtime: Arc<R>,
    clock: C,
    local_id: String,
    tick: Duration,
    id_gen: UuidIdGen,
}

impl<R, C> Manager<R, C>
where
    R: RuntimeAdapter,
    C: Clock,
{
    pub fn new(
        store: Arc<Store>,
        cluster: Cluster,
        runtime: Arc<R>,
        clock: C,
        local_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cluster,
            runtime,
            clock,
            local_id: local_id.into(),
            tick: TICK_PERIOD,
            id_gen: UuidIdGen,
        }
    }

    /// Override the tick period (tests use a short one).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run the loop until cancelled. In-flight executions are governed
    /// by the runtime's own timeouts, not drained here.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reconciler stopping");
                    break;
                }
                _ = interval.tick() => self.reconcile().await,
            }
        }
    }

    /// One tick: execute locally-assigned tasks, then (leader only)
    /// place pending ones. Works on a snapshot of the task list; the
    /// store lock is never held across an await point.
    pub async fn reconcile(&self) {
        let tasks = self.store.list_tasks();

        for task in &tasks {
            if task.state == TaskState::Scheduled && task.node_id == self.local_id {
                self.exec_task(task.clone()).await;
            }
        }

        if self.store.is_leader() {
            self.schedule_tasks(&tasks).await;
        }
    }

    /// Execute one task and record the outcome through the log.
    async fn exec_task(&self, mut task: Task) {
        match self.runtime.run(&task).await {
            Ok(runtime_id) => {
                info!(task = %task.id, runtime_id, "task started");
                task.state = TaskState::Running;
            }
            Err(RuntimeError::NameConflict(name)) => {
                // The container already exists from an earlier attempt.
                info!(task = %task.id, container = %name, "task already running");
                task.state = TaskState::Running;
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "task execution failed");
                task.state = TaskState::Failed;
                task.finish_time = Some(self.clock.utc_now());
            }
        }

        let event = TaskEvent::new(
            EventId::new(self.id_gen.next()),
            task.state,
            self.clock.utc_now(),
            task,
        );

        let result = if self.store.is_leader() {
            self.store.submit(&event).await
        } else {
            // Followers cannot write the log; route through the leader.
            self.store.forward_event(&event).await
        };
        if let Err(e) = result {
            warn!(task = %event.task_id, error = %e, "failed to record execution state");
        }
    }

    /// Place every pending task on the best candidate, if any.
    async fn schedule_tasks(&self, tasks: &[Task]) {
        let pending: Vec<&Task> =
            tasks.iter().filter(|t| t.state == TaskState::Pending).collect();
        if pending.is_empty() {
            return;
        }

        let nodes = self.candidate_nodes();
        for task in pending {
            let Some(candidate) = select_candidate(task, &nodes) else {
                debug!(task = %task.id, "no candidate node");
                continue;
            };

            let mut assigned = task.clone();
            assigned.node_id = candidate.id.clone();
            assigned.state = TaskState::Scheduled;
            info!(task = %assigned.id, node = %assigned.node_id, "task scheduled");

            let event = TaskEvent::new(
                EventId::new(self.id_gen.next()),
                TaskState::Scheduled,
                self.clock.utc_now(),
                assigned,
            );
            if let Err(e) = self.store.submit(&event).await {
                // Retried on the next tick; no local state to roll back.
                warn!(task = %event.task_id, error = %e, "failed to submit placement");
            }
        }
    }

    /// Candidate inventory from live gossip membership. Capacities come
    /// from each member's advertised metadata.
    fn candidate_nodes(&self) -> Vec<Node> {
        self.cluster
            .members()
            .into_iter()
            .map(|member| Node {
                id: member.id.clone(),
                memory_total: member.meta.mem_total,
                memory_used: member.meta.mem_used,
                disk_total: DISK_TOTAL,
                disk_used: 0,
                cpu_total: member.meta.cpu_total,
                tags: HashMap::new(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
