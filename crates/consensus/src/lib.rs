// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orion-consensus: A compact raft-style consensus engine.
//!
//! Leader election, log replication, snapshot/restore, and single-server
//! membership changes over a JSON-framed TCP transport. The engine is
//! generic over a [`StateMachine`]; committed command entries are applied
//! to it in strict log order on every voter.

mod engine;
mod error;
mod message;
mod storage;
mod transport;

pub use engine::{Raft, RaftConfig, RaftRole, RaftStatus};
pub use error::ConsensusError;
pub use message::{Configuration, EntryPayload, LogEntry, Message, NodeId};
pub use storage::{HardState, LogStore, SnapshotFile, SnapshotMeta, SnapshotStore, StableStore};

/// Deterministic state machine driven by the replicated log.
///
/// `apply` must be deterministic and must not fail on well-formed input;
/// a malformed entry is an implementation bug and implementations are
/// expected to crash rather than diverge. `restore` replaces the whole
/// state and is never called concurrently with `apply`.
pub trait StateMachine: Send + Sync + 'static {
    fn apply(&self, data: &[u8]);
    fn snapshot(&self) -> Vec<u8>;
    fn restore(&self, data: &[u8]);
}
