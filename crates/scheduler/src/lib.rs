// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orion-scheduler: Resource-gated bin-packing placement.
//!
//! A pure function from a task plus a node inventory to a candidate
//! node. Deterministic given an ordered node list, which lets the
//! reconciler reason about placement stability across ticks.

use orion_core::Task;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inventory record for one schedulable node.
///
/// Built by the reconciler from live gossip membership; capacities come
/// from the member's advertised metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub memory_total: u64,
    pub memory_used: u64,
    pub disk_total: u64,
    pub disk_used: u64,
    #[serde(default)]
    pub cpu_total: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Node {
    /// Unreserved memory in bytes.
    pub fn free_memory(&self) -> u64 {
        self.memory_total.saturating_sub(self.memory_used)
    }

    /// Unreserved disk in bytes.
    pub fn free_disk(&self) -> u64 {
        self.disk_total.saturating_sub(self.disk_used)
    }

    fn matches_selectors(&self, selectors: &HashMap<String, String>) -> bool {
        selectors.iter().all(|(k, v)| self.tags.get(k) == Some(v))
    }
}

/// Pick the best node for a task, or `None` if nothing fits.
///
/// Nodes without enough free memory or disk are filtered out, then
/// nodes missing any of the task's selector labels. Among survivors the
/// one with the most free memory wins; ties go to the earlier node in
/// input order. Spreading onto the most-free node balances load;
/// operators override with selectors.
pub fn select_candidate<'a>(task: &Task, nodes: &'a [Node]) -> Option<&'a Node> {
    let mut best: Option<&Node> = None;

    for node in nodes {
        if node.free_disk() < task.disk {
            continue;
        }
        if node.free_memory() < task.memory {
            continue;
        }
        if !node.matches_selectors(&task.node_selectors) {
            continue;
        }

        match best {
            Some(b) if node.free_memory() <= b.free_memory() => {}
            _ => best = Some(node),
        }
    }

    best
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
