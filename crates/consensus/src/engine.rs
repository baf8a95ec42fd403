// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The consensus engine: election, replication, commit, and apply.
//!
//! All mutable state lives in [`RaftCore`] behind one lock. Handlers
//! compute under the lock and return outbound messages; network sends
//! always happen after the lock is released. Three tasks drive a node:
//! the transport listener, the 50 ms ticker (heartbeats + election
//! timeouts), and per-request sender tasks.

use crate::error::ConsensusError;
use crate::message::{Configuration, EntryPayload, LogEntry, Message, NodeId};
use crate::storage::{self, HardState, LogStore, SnapshotFile, SnapshotMeta, SnapshotStore, StableStore};
use crate::transport;
use crate::StateMachine;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum entries shipped in one append message.
const MAX_APPEND_BATCH: usize = 256;

/// Configuration for one consensus node.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// Stable node id, set at startup
    pub id: NodeId,
    /// TCP bind address for the consensus transport
    pub bind_addr: String,
    /// Directory for the log, hard state, and snapshots
    pub data_dir: PathBuf,
    pub heartbeat_interval: Duration,
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    /// Per-request bound on peer RPCs
    pub rpc_timeout: Duration,
    /// Bound on proposals from submit to commit + local apply
    pub apply_timeout: Duration,
    /// Applied entries beyond the snapshot base before compaction
    pub snapshot_threshold: u64,
}

impl RaftConfig {
    pub fn new(id: impl Into<NodeId>, bind_addr: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            bind_addr: bind_addr.into(),
            data_dir: data_dir.into(),
            heartbeat_interval: Duration::from_millis(150),
            election_timeout_min: Duration::from_millis(500),
            election_timeout_max: Duration::from_millis(900),
            rpc_timeout: Duration::from_secs(2),
            apply_timeout: Duration::from_secs(10),
            snapshot_threshold: 1024,
        }
    }
}

/// Role of a consensus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RaftRole::Follower => "Follower",
            RaftRole::Candidate => "Candidate",
            RaftRole::Leader => "Leader",
        })
    }
}

/// Point-in-time view of the engine for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct RaftStatus {
    pub id: NodeId,
    pub role: RaftRole,
    pub term: u64,
    pub leader_id: Option<NodeId>,
    pub last_index: u64,
    pub commit_index: u64,
    pub last_applied: u64,
    pub voters: Vec<NodeId>,
}

type Outbound = (NodeId, String, Message);
type Pending = oneshot::Sender<Result<(), ConsensusError>>;

struct RaftCore {
    config: RaftConfig,
    role: RaftRole,
    term: u64,
    voted_for: Option<NodeId>,
    leader_id: Option<NodeId>,
    membership: Configuration,
    /// Entries after the snapshot base
    log: Vec<LogEntry>,
    snapshot_index: u64,
    snapshot_term: u64,
    commit_index: u64,
    last_applied: u64,
    next_index: HashMap<NodeId, u64>,
    match_index: HashMap<NodeId, u64>,
    votes: HashSet<NodeId>,
    election_deadline: Instant,
    last_heartbeat: Instant,
    pending: HashMap<u64, Pending>,
    log_store: LogStore,
    stable: StableStore,
    snapshots: SnapshotStore,
    sm: Arc<dyn StateMachine>,
}

impl RaftCore {
    fn last_index(&self) -> u64 {
        self.snapshot_index + self.log.len() as u64
    }

    fn last_term(&self) -> u64 {
        self.log.last().map(|e| e.term).unwrap_or(self.snapshot_term)
    }

    /// Term of the entry at `index`. Zero for the empty prefix; the
    /// snapshot base term at the base index. Callers never ask below
    /// the base.
    fn term_at(&self, index: u64) -> u64 {
        if index == 0 {
            0
        } else if index == self.snapshot_index {
            self.snapshot_term
        } else if index > self.snapshot_index && index <= self.last_index() {
            self.log[(index - self.snapshot_index - 1) as usize].term
        } else {
            0
        }
    }

    fn entries_from(&self, index: u64) -> Vec<LogEntry> {
        if index > self.last_index() {
            return Vec::new();
        }
        let start = (index.saturating_sub(self.snapshot_index + 1)) as usize;
        self.log.iter().skip(start).take(MAX_APPEND_BATCH).cloned().collect()
    }

    fn peers(&self) -> Vec<(NodeId, String)> {
        self.membership
            .voters
            .iter()
            .filter(|(id, _)| **id != self.config.id)
            .map(|(id, addr)| (id.clone(), addr.clone()))
            .collect()
    }

    fn leader_addr(&self) -> Option<String> {
        let leader = self.leader_id.as_deref()?;
        self.membership.addr_of(leader).map(str::to_string)
    }

    fn persist_hard_state(&self) {
        let state = HardState {
            term: self.term,
            voted_for: self.voted_for.clone(),
            config: self.membership.clone(),
        };
        if let Err(e) = self.stable.save(&state) {
            error!(error = %e, "failed to persist hard state");
        }
    }

    fn next_election_deadline(&self) -> Instant {
        let min = self.config.election_timeout_min.as_millis() as u64;
        let max = self.config.election_timeout_max.as_millis() as u64;
        let jitter = if max > min { min + rand::random::<u64>() % (max - min) } else { min };
        Instant::now() + Duration::from_millis(jitter)
    }

    fn step_down(&mut self, term: u64) {
        if self.role == RaftRole::Leader {
            self.fail_pending();
        }
        if term > self.term {
            self.term = term;
            self.voted_for = None;
        }
        self.role = RaftRole::Follower;
        self.votes.clear();
        self.election_deadline = self.next_election_deadline();
        self.persist_hard_state();
    }

    fn fail_pending(&mut self) {
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(ConsensusError::NotLeader { leader: None }));
        }
    }

    /// Periodic driver: leader heartbeats, follower/candidate election
    /// timeouts, snapshot threshold.
    fn tick(&mut self) -> Vec<Outbound> {
        match self.role {
            RaftRole::Leader => {
                if self.last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                    self.last_heartbeat = Instant::now();
                    return self.broadcast_appends();
                }
                Vec::new()
            }
            RaftRole::Follower | RaftRole::Candidate => {
                if Instant::now() >= self.election_deadline {
                    return self.start_election();
                }
                Vec::new()
            }
        }
    }

    fn start_election(&mut self) -> Vec<Outbound> {
        // A node outside the voting configuration waits to be contacted.
        if !self.membership.contains(&self.config.id) {
            self.election_deadline = self.next_election_deadline();
            return Vec::new();
        }

        self.term += 1;
        self.role = RaftRole::Candidate;
        self.voted_for = Some(self.config.id.clone());
        self.leader_id = None;
        self.votes.clear();
        self.votes.insert(self.config.id.clone());
        self.election_deadline = self.next_election_deadline();
        self.persist_hard_state();

        info!(term = self.term, id = %self.config.id, "starting election");

        if self.votes.len() >= self.membership.quorum() {
            return self.become_leader();
        }

        let msg = Message::RequestVote {
            term: self.term,
            candidate_id: self.config.id.clone(),
            last_log_index: self.last_index(),
            last_log_term: self.last_term(),
        };
        self.peers().into_iter().map(|(id, addr)| (id, addr, msg.clone())).collect()
    }

    fn become_leader(&mut self) -> Vec<Outbound> {
        info!(term = self.term, id = %self.config.id, "became leader");
        self.role = RaftRole::Leader;
        self.leader_id = Some(self.config.id.clone());
        self.last_heartbeat = Instant::now();

        let next = self.last_index() + 1;
        self.next_index.clear();
        self.match_index.clear();
        for (id, _) in self.peers() {
            self.next_index.insert(id.clone(), next);
            self.match_index.insert(id, 0);
        }

        // Committing a fresh entry is the only way to commit entries
        // from earlier terms.
        if let Err(e) = self.append_local(EntryPayload::Noop) {
            error!(error = %e, "failed to append noop on election");
        }
        self.advance_commit();
        self.apply_committed();
        self.broadcast_appends()
    }

    /// Leader-side append of one entry, with membership changes taking
    /// effect immediately.
    fn append_local(&mut self, payload: EntryPayload) -> Result<u64, ConsensusError> {
        let index = self.last_index() + 1;
        let entry = LogEntry { index, term: self.term, payload };

        if let EntryPayload::Config(config) = &entry.payload {
            self.apply_config(config.clone());
        }

        self.log_store.append(std::slice::from_ref(&entry))?;
        self.log.push(entry);
        Ok(index)
    }

    fn apply_config(&mut self, config: Configuration) {
        let next = self.last_index() + 1;
        for id in config.voters.keys() {
            if *id != self.config.id && !self.next_index.contains_key(id) {
                self.next_index.insert(id.clone(), next);
                self.match_index.insert(id.clone(), 0);
            }
        }
        self.next_index.retain(|id, _| config.contains(id));
        self.match_index.retain(|id, _| config.contains(id));
        self.membership = config;
        self.persist_hard_state();
    }

    fn broadcast_appends(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        for (id, addr) in self.peers() {
            if let Some(msg) = self.build_append_for(&id) {
                out.push((id, addr, msg));
            }
        }
        out
    }

    fn build_append_for(&mut self, peer: &str) -> Option<Message> {
        let next = self.next_index.get(peer).copied().unwrap_or(self.last_index() + 1);

        if next <= self.snapshot_index {
            // The entries this follower needs are compacted away.
            match self.snapshots.load_latest() {
                Ok(Some(snap)) => {
                    return Some(Message::InstallSnapshot {
                        term: self.term,
                        leader_id: self.config.id.clone(),
                        last_index: snap.meta.index,
                        last_term: snap.meta.term,
                        config: snap.meta.config,
                        data: snap.data,
                    });
                }
                Ok(None) => {
                    warn!(peer, "follower behind snapshot base but no snapshot on disk");
                    return None;
                }
                Err(e) => {
                    error!(peer, error = %e, "failed to load snapshot for follower");
                    return None;
                }
            }
        }

        let prev_log_index = next - 1;
        Some(Message::AppendEntries {
            term: self.term,
            leader_id: self.config.id.clone(),
            prev_log_index,
            prev_log_term: self.term_at(prev_log_index),
            entries: self.entries_from(next),
            leader_commit: self.commit_index,
        })
    }

    /// Advance the commit index to the highest current-term entry
    /// replicated on a quorum, then apply.
    fn advance_commit(&mut self) {
        let mut n = self.last_index();
        while n > self.commit_index {
            if self.term_at(n) == self.term {
                let replicated = self
                    .membership
                    .voters
                    .keys()
                    .filter(|id| {
                        **id == self.config.id
                            || self.match_index.get(*id).copied().unwrap_or(0) >= n
                    })
                    .count();
                if replicated >= self.membership.quorum() {
                    self.commit_index = n;
                    break;
                }
            }
            n -= 1;
        }
    }

    /// Apply committed entries to the state machine in strict order and
    /// resolve any local proposals waiting on them.
    fn apply_committed(&mut self) {
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let offset = (index - self.snapshot_index - 1) as usize;
            let Some(entry) = self.log.get(offset) else {
                error!(index, "committed entry missing from log");
                return;
            };
            if let EntryPayload::Command(data) = &entry.payload {
                self.sm.apply(data);
            }
            self.last_applied = index;
            if let Some(tx) = self.pending.remove(&index) {
                let _ = tx.send(Ok(()));
            }
        }
        self.maybe_snapshot();
    }

    fn maybe_snapshot(&mut self) {
        if self.config.snapshot_threshold == 0 {
            return;
        }
        if self.last_applied - self.snapshot_index < self.config.snapshot_threshold {
            return;
        }

        let meta = SnapshotMeta {
            index: self.last_applied,
            term: self.term_at(self.last_applied),
            config: self.membership.clone(),
        };
        let snapshot = SnapshotFile { meta, data: self.sm.snapshot() };
        if let Err(e) = self.snapshots.save(&snapshot) {
            error!(error = %e, "failed to persist snapshot");
            return;
        }

        let keep: Vec<LogEntry> =
            self.log.iter().filter(|e| e.index > self.last_applied).cloned().collect();
        if let Err(e) = self.log_store.rewrite(&keep) {
            error!(error = %e, "failed to compact log after snapshot");
            return;
        }
        self.snapshot_term = self.term_at(self.last_applied);
        self.snapshot_index = self.last_applied;
        self.log = keep;
        info!(index = self.snapshot_index, "compacted log into snapshot");
    }

    /// Handle one inbound peer message, producing the reply.
    fn handle_message(&mut self, msg: Message) -> Message {
        match msg {
            Message::RequestVote { term, candidate_id, last_log_index, last_log_term } => {
                self.handle_request_vote(term, candidate_id, last_log_index, last_log_term)
            }
            Message::AppendEntries {
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => self.handle_append_entries(
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            ),
            Message::InstallSnapshot { term, leader_id, last_index, last_term, config, data } => {
                self.handle_install_snapshot(term, leader_id, last_index, last_term, config, &data)
            }
            other => {
                warn!(?other, "unexpected inbound message");
                Message::ForwardReply { ok: false, error: Some("unexpected message".to_string()) }
            }
        }
    }

    fn handle_request_vote(
        &mut self,
        term: u64,
        candidate_id: NodeId,
        last_log_index: u64,
        last_log_term: u64,
    ) -> Message {
        if term > self.term {
            self.step_down(term);
        }

        let log_ok = last_log_term > self.last_term()
            || (last_log_term == self.last_term() && last_log_index >= self.last_index());
        let grant = term == self.term
            && log_ok
            && self.voted_for.as_deref().map(|v| v == candidate_id).unwrap_or(true);

        if grant {
            self.voted_for = Some(candidate_id.clone());
            self.election_deadline = self.next_election_deadline();
            self.persist_hard_state();
            debug!(term, candidate = %candidate_id, "granted vote");
        }

        Message::RequestVoteReply { term: self.term, vote_granted: grant }
    }

    fn handle_append_entries(
        &mut self,
        term: u64,
        leader_id: NodeId,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    ) -> Message {
        if term < self.term {
            return Message::AppendEntriesReply {
                term: self.term,
                success: false,
                match_index: self.last_index(),
            };
        }

        if term > self.term || self.role != RaftRole::Follower {
            self.step_down(term);
        }
        self.leader_id = Some(leader_id);
        self.election_deadline = self.next_election_deadline();

        // Everything up to the snapshot base is known replicated.
        if prev_log_index < self.snapshot_index {
            return Message::AppendEntriesReply {
                term: self.term,
                success: true,
                match_index: self.snapshot_index,
            };
        }

        if prev_log_index > self.last_index() || self.term_at(prev_log_index) != prev_log_term {
            return Message::AppendEntriesReply {
                term: self.term,
                success: false,
                match_index: self.last_index().min(prev_log_index.saturating_sub(1)),
            };
        }

        let match_index = prev_log_index + entries.len() as u64;
        let mut config_changed = false;
        let mut truncated = false;
        let mut first_new: Option<u64> = None;
        for entry in entries {
            if entry.index <= self.last_index() {
                if self.term_at(entry.index) == entry.term {
                    continue;
                }
                // Conflict: drop our divergent suffix.
                self.log.truncate((entry.index - self.snapshot_index - 1) as usize);
                truncated = true;
            }
            if let EntryPayload::Config(config) = &entry.payload {
                self.membership = config.clone();
                config_changed = true;
            }
            first_new.get_or_insert(entry.index);
            self.log.push(entry);
        }

        let persisted = if truncated {
            let log = self.log.clone();
            self.log_store.rewrite(&log)
        } else if let Some(from) = first_new {
            let appended: Vec<LogEntry> =
                self.log.iter().filter(|e| e.index >= from).cloned().collect();
            self.log_store.append(&appended)
        } else {
            Ok(())
        };
        if let Err(e) = persisted {
            error!(error = %e, "failed to persist appended entries");
            return Message::AppendEntriesReply {
                term: self.term,
                success: false,
                match_index: self.last_index(),
            };
        }

        if config_changed {
            self.persist_hard_state();
        }

        if leader_commit > self.commit_index {
            self.commit_index = leader_commit.min(self.last_index());
            self.apply_committed();
        }

        Message::AppendEntriesReply { term: self.term, success: true, match_index }
    }

    fn handle_install_snapshot(
        &mut self,
        term: u64,
        leader_id: NodeId,
        last_index: u64,
        last_term: u64,
        config: Configuration,
        data: &[u8],
    ) -> Message {
        if term < self.term {
            return Message::InstallSnapshotReply { term: self.term };
        }
        if term > self.term || self.role != RaftRole::Follower {
            self.step_down(term);
        }
        self.leader_id = Some(leader_id);
        self.election_deadline = self.next_election_deadline();

        if last_index <= self.snapshot_index {
            return Message::InstallSnapshotReply { term: self.term };
        }

        info!(last_index, "installing snapshot from leader");
        self.sm.restore(data);
        self.snapshot_index = last_index;
        self.snapshot_term = last_term;
        self.commit_index = self.commit_index.max(last_index);
        self.last_applied = last_index;
        self.log.clear();
        if let Err(e) = self.log_store.rewrite(&[]) {
            error!(error = %e, "failed to reset log after snapshot install");
        }
        self.membership = config.clone();
        self.persist_hard_state();

        let snapshot = SnapshotFile {
            meta: SnapshotMeta { index: last_index, term: last_term, config },
            data: data.to_vec(),
        };
        if let Err(e) = self.snapshots.save(&snapshot) {
            error!(error = %e, "failed to persist installed snapshot");
        }

        Message::InstallSnapshotReply { term: self.term }
    }

    /// Handle the reply to a message we sent to `peer`.
    fn handle_reply(&mut self, peer: &str, request: &Message, reply: Message) -> Vec<Outbound> {
        match reply {
            Message::RequestVoteReply { term, vote_granted } => {
                if term > self.term {
                    self.step_down(term);
                    return Vec::new();
                }
                if self.role != RaftRole::Candidate || term != self.term || !vote_granted {
                    return Vec::new();
                }
                self.votes.insert(peer.to_string());
                if self.votes.len() >= self.membership.quorum() {
                    return self.become_leader();
                }
                Vec::new()
            }
            Message::AppendEntriesReply { term, success, match_index } => {
                if term > self.term {
                    self.step_down(term);
                    return Vec::new();
                }
                if self.role != RaftRole::Leader {
                    return Vec::new();
                }
                if success {
                    let known = {
                        let known = self.match_index.entry(peer.to_string()).or_insert(0);
                        *known = (*known).max(match_index);
                        *known
                    };
                    // Replies can arrive out of order; never regress.
                    self.next_index.insert(peer.to_string(), known + 1);
                    self.advance_commit();
                    self.apply_committed();
                    // Keep shipping if the follower is still behind.
                    if known < self.last_index() {
                        if let Some((id, addr)) = self.peer_addr(peer) {
                            if let Some(msg) = self.build_append_for(&id) {
                                return vec![(id, addr, msg)];
                            }
                        }
                    }
                    Vec::new()
                } else {
                    // Backtrack using the follower's hint.
                    let next = self.next_index.entry(peer.to_string()).or_insert(1);
                    *next = (*next - 1).clamp(1, match_index + 1);
                    if let Some((id, addr)) = self.peer_addr(peer) {
                        if let Some(msg) = self.build_append_for(&id) {
                            return vec![(id, addr, msg)];
                        }
                    }
                    Vec::new()
                }
            }
            Message::InstallSnapshotReply { term } => {
                if term > self.term {
                    self.step_down(term);
                    return Vec::new();
                }
                if self.role != RaftRole::Leader {
                    return Vec::new();
                }
                if let Message::InstallSnapshot { last_index, .. } = request {
                    self.match_index.insert(peer.to_string(), *last_index);
                    self.next_index.insert(peer.to_string(), *last_index + 1);
                }
                Vec::new()
            }
            other => {
                debug!(?other, "ignoring unexpected reply");
                Vec::new()
            }
        }
    }

    fn peer_addr(&self, peer: &str) -> Option<(NodeId, String)> {
        self.membership.addr_of(peer).map(|addr| (peer.to_string(), addr.to_string()))
    }

    fn status(&self) -> RaftStatus {
        RaftStatus {
            id: self.config.id.clone(),
            role: self.role,
            term: self.term,
            leader_id: self.leader_id.clone(),
            last_index: self.last_index(),
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            voters: self.membership.voters.keys().cloned().collect(),
        }
    }
}

struct Shared {
    core: Mutex<RaftCore>,
    cancel: CancellationToken,
    local_addr: SocketAddr,
    rpc_timeout: Duration,
    apply_timeout: Duration,
}

/// Cloneable handle to a running consensus node.
#[derive(Clone)]
pub struct Raft {
    shared: Arc<Shared>,
}

impl Raft {
    /// Open the stores under `data_dir`, bind the transport, and start
    /// the engine. With `bootstrap`, a fresh node starts from a
    /// single-voter configuration containing only itself.
    pub async fn open(
        config: RaftConfig,
        sm: Arc<dyn StateMachine>,
        bootstrap: bool,
    ) -> Result<Raft, ConsensusError> {
        storage::ensure_dir(&config.data_dir)?;

        let stable = StableStore::open(config.data_dir.join("stable.json"));
        let mut hard = stable.load()?;

        let snapshots = SnapshotStore::open(config.data_dir.join("snapshots"))?;
        let mut snapshot_index = 0;
        let mut snapshot_term = 0;
        if let Some(snap) = snapshots.load_latest()? {
            info!(index = snap.meta.index, "restoring from snapshot");
            sm.restore(&snap.data);
            snapshot_index = snap.meta.index;
            snapshot_term = snap.meta.term;
            if hard.config.is_empty() {
                hard.config = snap.meta.config.clone();
            }
        }

        let (log_store, mut entries) = LogStore::open(config.data_dir.join("log.jsonl"))?;
        entries.retain(|e| e.index > snapshot_index);
        for entry in &entries {
            if let EntryPayload::Config(c) = &entry.payload {
                hard.config = c.clone();
            }
        }

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|e| ConsensusError::Transport(format!("bind {}: {e}", config.bind_addr)))?;
        let local_addr = listener.local_addr()?;

        if bootstrap && hard.config.is_empty() {
            // The configuration address must be routable for future
            // followers, which a wildcard bind address is not.
            let advertise = if local_addr.ip().is_unspecified() {
                match detect_advertise_ip().await {
                    Some(ip) => SocketAddr::new(ip, local_addr.port()),
                    None => local_addr,
                }
            } else {
                local_addr
            };
            info!(id = %config.id, addr = %advertise, "bootstrapping single-voter cluster");
            hard.config = Configuration::bootstrap(&config.id, advertise.to_string());
        }
        stable.save(&hard)?;

        let rpc_timeout = config.rpc_timeout;
        let apply_timeout = config.apply_timeout;
        let mut core = RaftCore {
            role: RaftRole::Follower,
            term: hard.term,
            voted_for: hard.voted_for,
            leader_id: None,
            membership: hard.config,
            log: entries,
            snapshot_index,
            snapshot_term,
            commit_index: 0,
            last_applied: snapshot_index,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            votes: HashSet::new(),
            election_deadline: Instant::now(),
            last_heartbeat: Instant::now(),
            pending: HashMap::new(),
            log_store,
            stable,
            snapshots,
            sm,
            config,
        };
        core.election_deadline = core.next_election_deadline();

        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            cancel: CancellationToken::new(),
            local_addr,
            rpc_timeout,
            apply_timeout,
        });

        tokio::spawn(serve(Arc::clone(&shared), listener));
        tokio::spawn(run_ticker(Arc::clone(&shared)));

        Ok(Raft { shared })
    }

    /// Address the transport actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Cheap leadership query.
    pub fn is_leader(&self) -> bool {
        self.shared.core.lock().role == RaftRole::Leader
    }

    pub fn role(&self) -> RaftRole {
        self.shared.core.lock().role
    }

    /// Transport address of the current leader, when known.
    pub fn leader_addr(&self) -> Option<String> {
        self.shared.core.lock().leader_addr()
    }

    pub fn configuration(&self) -> Configuration {
        self.shared.core.lock().membership.clone()
    }

    pub fn status(&self) -> RaftStatus {
        self.shared.core.lock().status()
    }

    /// Append a command to the log; resolves after the entry is
    /// committed and applied locally, bounded by the apply timeout.
    pub async fn propose(&self, data: Vec<u8>) -> Result<(), ConsensusError> {
        let (tx, rx) = oneshot::channel();
        let outbound = {
            let mut core = self.shared.core.lock();
            if core.role != RaftRole::Leader {
                return Err(ConsensusError::NotLeader { leader: core.leader_addr() });
            }
            let index = core.append_local(EntryPayload::Command(data))?;
            core.pending.insert(index, tx);
            core.advance_commit();
            core.apply_committed();
            core.last_heartbeat = Instant::now();
            core.broadcast_appends()
        };
        dispatch(&self.shared, outbound);
        self.await_pending(rx).await
    }

    /// Route a command to the leader: propose locally when leading,
    /// otherwise forward over the transport.
    pub async fn forward(&self, data: Vec<u8>) -> Result<(), ConsensusError> {
        let leader = {
            let core = self.shared.core.lock();
            if core.role == RaftRole::Leader {
                None
            } else {
                Some(core.leader_addr().ok_or(ConsensusError::NoLeader)?)
            }
        };

        match leader {
            None => self.propose(data).await,
            Some(addr) => {
                let reply = transport::request(
                    &addr,
                    &Message::Forward { data },
                    self.shared.apply_timeout,
                )
                .await?;
                match reply {
                    Message::ForwardReply { ok: true, .. } => Ok(()),
                    Message::ForwardReply { ok: false, error } => Err(ConsensusError::Forward(
                        error.unwrap_or_else(|| "unknown".to_string()),
                    )),
                    other => {
                        Err(ConsensusError::Transport(format!("unexpected reply: {other:?}")))
                    }
                }
            }
        }
    }

    /// Add a voter to the configuration. Idempotent: re-adding a known
    /// voter at the same address is a no-op.
    pub async fn add_voter(&self, id: &str, addr: &str) -> Result<(), ConsensusError> {
        let (tx, rx) = oneshot::channel();
        let outbound = {
            let mut core = self.shared.core.lock();
            if core.role != RaftRole::Leader {
                return Err(ConsensusError::NotLeader { leader: core.leader_addr() });
            }
            if core.membership.addr_of(id) == Some(addr) {
                return Ok(());
            }
            let mut config = core.membership.clone();
            config.voters.insert(id.to_string(), addr.to_string());
            info!(peer = id, addr, "adding voter");
            let index = core.append_local(EntryPayload::Config(config))?;
            core.pending.insert(index, tx);
            core.advance_commit();
            core.apply_committed();
            core.broadcast_appends()
        };
        dispatch(&self.shared, outbound);
        self.await_pending(rx).await
    }

    /// Remove a server from the configuration. Idempotent: removing an
    /// unknown server is a no-op.
    pub async fn remove_server(&self, id: &str) -> Result<(), ConsensusError> {
        let (tx, rx) = oneshot::channel();
        let outbound = {
            let mut core = self.shared.core.lock();
            if core.role != RaftRole::Leader {
                return Err(ConsensusError::NotLeader { leader: core.leader_addr() });
            }
            if !core.membership.contains(id) {
                return Ok(());
            }
            let mut config = core.membership.clone();
            config.voters.remove(id);
            info!(peer = id, "removing server");
            let index = core.append_local(EntryPayload::Config(config))?;
            core.pending.insert(index, tx);
            core.advance_commit();
            core.apply_committed();
            core.broadcast_appends()
        };
        dispatch(&self.shared, outbound);
        self.await_pending(rx).await
    }

    async fn await_pending(
        &self,
        rx: oneshot::Receiver<Result<(), ConsensusError>>,
    ) -> Result<(), ConsensusError> {
        match tokio::time::timeout(self.shared.apply_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConsensusError::Shutdown),
            Err(_) => Err(ConsensusError::Timeout),
        }
    }

    /// Stop the engine's background tasks.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }
}

/// Routable local address, discovered by the routing table without
/// sending any packets.
async fn detect_advertise_ip() -> Option<std::net::IpAddr> {
    let probe = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    probe.connect("8.8.8.8:80").await.ok()?;
    probe.local_addr().ok().map(|addr| addr.ip())
}

/// Send each outbound message in its own task, feeding replies (and any
/// follow-up messages they produce) back into the core.
fn dispatch(shared: &Arc<Shared>, outbound: Vec<Outbound>) {
    for (peer, addr, msg) in outbound {
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let mut chain = vec![(peer, addr, msg)];
            while let Some((peer, addr, msg)) = chain.pop() {
                match transport::request(&addr, &msg, shared.rpc_timeout).await {
                    Ok(reply) => {
                        let follow_up = shared.core.lock().handle_reply(&peer, &msg, reply);
                        chain.extend(follow_up);
                    }
                    Err(e) => {
                        debug!(peer = %peer, error = %e, "peer rpc failed");
                        break;
                    }
                }
            }
        });
    }
}

async fn run_ticker(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = interval.tick() => {
                let outbound = shared.core.lock().tick();
                dispatch(&shared, outbound);
            }
        }
    }
}

async fn serve(shared: Arc<Shared>, listener: TcpListener) {
    loop {
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    tokio::spawn(handle_conn(Arc::clone(&shared), stream));
                }
                Err(e) => error!(error = %e, "transport accept error"),
            }
        }
    }
}

async fn handle_conn(shared: Arc<Shared>, mut stream: TcpStream) {
    loop {
        let msg = match transport::read_frame(&mut stream).await {
            Ok(msg) => msg,
            Err(_) => break,
        };

        let reply = match msg {
            Message::Forward { data } => {
                let raft = Raft { shared: Arc::clone(&shared) };
                match raft.propose(data).await {
                    Ok(()) => Message::ForwardReply { ok: true, error: None },
                    Err(e) => Message::ForwardReply { ok: false, error: Some(e.to_string()) },
                }
            }
            other => shared.core.lock().handle_message(other),
        };

        if transport::write_frame(&mut stream, &reply).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
