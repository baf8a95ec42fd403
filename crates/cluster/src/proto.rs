// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gossip datagram types and member records.

use orion_core::NodeMeta;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Failure-detector state of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberState {
    Alive,
    Suspect,
    Dead,
    /// Departed gracefully
    Left,
}

orion_core::simple_display! {
    MemberState {
        Alive => "alive",
        Suspect => "suspect",
        Dead => "dead",
        Left => "left",
    }
}

/// One member as known to the local node.
///
/// The address is the member's gossip endpoint as observed by whoever
/// first heard from it; incarnation numbers order conflicting reports
/// about the same member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub addr: SocketAddr,
    pub meta: NodeMeta,
    pub incarnation: u64,
    pub state: MemberState,
}

impl Member {
    /// Consensus transport address derived from the gossip ip and the
    /// advertised consensus port.
    pub fn consensus_addr(&self) -> String {
        format!("{}:{}", self.addr.ip(), self.meta.consensus_port)
    }
}

/// Gossip protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Gossip {
    Ping { seq: u64, from: String },
    Ack { seq: u64, from: String },
    /// Ask a witness to probe `target` on our behalf
    PingReq { seq: u64, from: String, target: Member },
    Join { from: Member },
    JoinReply { members: Vec<Member> },
    Leave { id: String, incarnation: u64 },
}

/// One UDP datagram: a message plus piggybacked membership updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datagram {
    pub msg: Gossip,
    #[serde(default)]
    pub updates: Vec<Member>,
}

impl Datagram {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
#[path = "proto_tests.rs"]
mod tests;
