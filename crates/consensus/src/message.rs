// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log entries, membership configuration, and peer-to-peer messages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable node identifier, set at startup.
pub type NodeId = String;

/// Voting membership of the cluster: node id → transport address.
///
/// Ordered map so that serialised configurations are byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub voters: BTreeMap<NodeId, String>,
}

impl Configuration {
    /// Single-voter configuration used when bootstrapping a new cluster.
    pub fn bootstrap(id: impl Into<NodeId>, addr: impl Into<String>) -> Self {
        let mut voters = BTreeMap::new();
        voters.insert(id.into(), addr.into());
        Self { voters }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.voters.contains_key(id)
    }

    pub fn addr_of(&self, id: &str) -> Option<&str> {
        self.voters.get(id).map(String::as_str)
    }

    /// Number of votes needed to win an election or commit an entry.
    pub fn quorum(&self) -> usize {
        self.voters.len() / 2 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }
}

/// Payload of one log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// Opaque command bytes for the state machine
    Command(Vec<u8>),
    /// Membership change; takes effect as soon as the entry is appended
    Config(Configuration),
    /// Appended by a fresh leader to commit entries from earlier terms
    Noop,
}

/// One replicated log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub payload: EntryPayload,
}

/// Peer-to-peer consensus messages, JSON-encoded on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    RequestVote {
        term: u64,
        candidate_id: NodeId,
        last_log_index: u64,
        last_log_term: u64,
    },
    RequestVoteReply {
        term: u64,
        vote_granted: bool,
    },
    AppendEntries {
        term: u64,
        leader_id: NodeId,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    },
    AppendEntriesReply {
        term: u64,
        success: bool,
        /// Highest index known replicated on the follower. On failure,
        /// a backtracking hint (the follower's last index).
        match_index: u64,
    },
    InstallSnapshot {
        term: u64,
        leader_id: NodeId,
        last_index: u64,
        last_term: u64,
        config: Configuration,
        data: Vec<u8>,
    },
    InstallSnapshotReply {
        term: u64,
    },
    /// A proposal forwarded from a follower; accepted only by the leader.
    Forward {
        data: Vec<u8>,
    },
    ForwardReply {
        ok: bool,
        error: Option<String>,
    },
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
