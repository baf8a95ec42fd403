// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consensus error taxonomy.

use thiserror::Error;

/// Errors surfaced by the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Write attempted on a node that is not the leader. Carries the
    /// transport address of the current leader when known.
    #[error("not the leader{}", .leader.as_deref().map(|a| format!(" (leader at {a})")).unwrap_or_default())]
    NotLeader { leader: Option<String> },

    /// No leader is currently known to this node.
    #[error("no known leader")]
    NoLeader,

    /// The proposal did not commit within the configured bound.
    #[error("proposal timed out")]
    Timeout,

    /// Log, stable store, or snapshot store failure.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of a message or stored record failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Transport-level failure talking to a peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// A forwarded proposal was rejected by the leader.
    #[error("forward rejected: {0}")]
    Forward(String),

    /// The engine is shutting down.
    #[error("engine shut down")]
    Shutdown,
}
