// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node metadata advertised over the gossip layer.

use serde::{Deserialize, Serialize};

/// Declared role of a cluster member.
///
/// Advertised in metadata but not consulted by placement; every member
/// is treated as a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Worker,
}

impl Default for Role {
    fn default() -> Self {
        Role::Worker
    }
}

crate::simple_display! {
    Role {
        Manager => "manager",
        Worker => "worker",
    }
}

/// Per-node metadata distributed on the gossip meta channel.
///
/// This is the only way consensus endpoints are discovered: a member's
/// consensus address is its gossip ip joined with `consensus_port`.
/// Membership records are ephemeral and never replicated themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub id: String,
    #[serde(default)]
    pub role: Role,
    /// Total memory in bytes
    #[serde(default)]
    pub mem_total: u64,
    /// Memory in use in bytes
    #[serde(default)]
    pub mem_used: u64,
    /// Total cpu cores
    #[serde(default)]
    pub cpu_total: f64,
    /// TCP port of the consensus transport on this node
    pub consensus_port: u16,
}

impl NodeMeta {
    /// Encode for the gossip meta channel.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from gossip meta bytes.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
