// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replicated store over the consensus engine.

use orion_consensus::{ConsensusError, Raft, RaftConfig, RaftStatus, StateMachine};
use orion_core::{Task, TaskEvent, TaskState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Log and stable stores could not be opened
    #[error("store init failed: {0}")]
    Init(String),

    /// Write attempted on a follower
    #[error("not the leader")]
    NotLeader,

    /// Consensus commit exceeded the bound
    #[error("consensus commit timed out")]
    Timeout,

    /// Underlying log or disk failure
    #[error("apply failed: {0}")]
    Apply(String),

    /// Event could not be encoded for the log
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Task not present in the store
    #[error("task not found")]
    NotFound,

    /// Operation requires an opened store
    #[error("store not opened")]
    NotOpen,
}

impl From<ConsensusError> for StoreError {
    fn from(err: ConsensusError) -> Self {
        match err {
            ConsensusError::NotLeader { .. } | ConsensusError::NoLeader => StoreError::NotLeader,
            ConsensusError::Timeout => StoreError::Timeout,
            other => StoreError::Apply(other.to_string()),
        }
    }
}

/// The replicated task store.
///
/// Holds the task map and, once opened, the consensus engine that
/// drives it. The map is written only on the apply path; readers take
/// the read lock and copy out.
pub struct Store {
    tasks: RwLock<HashMap<String, Task>>,
    raft: Mutex<Option<Raft>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create an unopened store. Apply, snapshot, and the read surface
    /// work immediately; everything touching consensus requires
    /// [`Store::open`].
    pub fn new() -> Self {
        Self { tasks: RwLock::new(HashMap::new()), raft: Mutex::new(None) }
    }

    /// Initialise the log, stable, and snapshot stores under
    /// `data_dir` and bind the consensus transport on `bind_addr`.
    /// When `bootstrap` is set, submit an initial configuration
    /// containing only this node.
    pub async fn open(
        store: &Arc<Store>,
        data_dir: &Path,
        local_id: &str,
        bind_addr: &str,
        bootstrap: bool,
    ) -> Result<(), StoreError> {
        let config = RaftConfig::new(local_id, bind_addr, data_dir);
        let sm: Arc<dyn StateMachine> = Arc::clone(store) as Arc<dyn StateMachine>;
        let raft = Raft::open(config, sm, bootstrap)
            .await
            .map_err(|e| StoreError::Init(e.to_string()))?;
        info!(id = local_id, addr = %raft.local_addr(), "store opened");
        *store.raft.lock() = Some(raft);
        Ok(())
    }

    fn raft(&self) -> Result<Raft, StoreError> {
        self.raft.lock().clone().ok_or(StoreError::NotOpen)
    }

    /// Cheap query of the underlying consensus state.
    pub fn is_leader(&self) -> bool {
        self.raft.lock().as_ref().map(Raft::is_leader).unwrap_or(false)
    }

    /// Address the consensus transport bound to.
    pub fn consensus_addr(&self) -> Option<SocketAddr> {
        self.raft.lock().as_ref().map(Raft::local_addr)
    }

    /// Point-in-time consensus status for the status API.
    pub fn raft_status(&self) -> Option<RaftStatus> {
        self.raft.lock().as_ref().map(Raft::status)
    }

    /// Look up one task by id.
    pub fn get_task(&self, id: &str) -> Result<Task, StoreError> {
        self.tasks.read().get(id).cloned().ok_or(StoreError::NotFound)
    }

    /// All task records, unordered.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.read().values().cloned().collect()
    }

    /// Encode the event and append it to the log. Returns after the
    /// event is committed and applied locally, bounded by the engine's
    /// apply timeout.
    pub async fn submit(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let data = serde_json::to_vec(event)?;
        self.raft()?.propose(data).await?;
        Ok(())
    }

    /// Route an event to the leader: submit locally when leading,
    /// otherwise forward over the consensus transport. Lets follower
    /// nodes record execution-state transitions without waiting for the
    /// leader to notice the discrepancy.
    pub async fn forward_event(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let data = serde_json::to_vec(event)?;
        self.raft()?.forward(data).await?;
        Ok(())
    }

    /// Add a consensus voter. Legal only on the leader.
    pub async fn join_peer(&self, id: &str, addr: &str) -> Result<(), StoreError> {
        self.raft()?.add_voter(id, addr).await?;
        Ok(())
    }

    /// Remove a consensus server. Legal only on the leader.
    pub async fn remove_peer(&self, id: &str) -> Result<(), StoreError> {
        self.raft()?.remove_server(id).await?;
        Ok(())
    }

    /// Stop the consensus engine's background tasks.
    pub fn shutdown(&self) {
        if let Some(raft) = self.raft.lock().as_ref() {
            raft.shutdown();
        }
    }

    fn apply_event(&self, event: TaskEvent) {
        let mut tasks = self.tasks.write();
        let key = event.task_id.as_str().to_string();
        match event.state {
            TaskState::Completed | TaskState::Failed => {
                match tasks.get_mut(&key) {
                    Some(task) => {
                        task.state = event.state;
                        task.finish_time = Some(event.timestamp);
                    }
                    None => {
                        // Terminal events can arrive before any earlier
                        // state for the same id during snapshot-gap
                        // catch-up; the embedded record is complete.
                        tasks.insert(key, event.task);
                    }
                }
            }
            TaskState::Pending | TaskState::Scheduled | TaskState::Running => {
                tasks.insert(key, event.task);
            }
        }
    }
}

impl StateMachine for Store {
    /// Deterministic transition. A malformed committed entry means the
    /// log itself is corrupt; continuing would fork this node's state
    /// from the rest of the cluster, so crash instead.
    #[allow(clippy::panic)]
    fn apply(&self, data: &[u8]) {
        let event: TaskEvent = match serde_json::from_slice(data) {
            Ok(event) => event,
            Err(e) => panic!("malformed log entry: {e}"),
        };
        self.apply_event(event);
    }

    /// Consistent copy of the map as one self-describing blob. Task
    /// records always serialise; a failure here is treated like a
    /// decode failure.
    #[allow(clippy::panic)]
    fn snapshot(&self) -> Vec<u8> {
        let tasks = self.tasks.read();
        match serde_json::to_vec(&*tasks) {
            Ok(blob) => blob,
            Err(e) => panic!("failed to serialise snapshot: {e}"),
        }
    }

    /// Replace the live map atomically with the decoded blob. Called by
    /// the consensus engine on catch-up, never concurrently with apply.
    #[allow(clippy::panic)]
    fn restore(&self, data: &[u8]) {
        let decoded: HashMap<String, Task> = match serde_json::from_slice(data) {
            Ok(map) => map,
            Err(e) => panic!("malformed snapshot: {e}"),
        };
        let count = decoded.len();
        *self.tasks.write() = decoded;
        warn!(tasks = count, "restored task map from snapshot");
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
