// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gossip tuning parameters.

use std::time::Duration;

/// Configuration for the gossip layer.
///
/// The LAN defaults trade bandwidth for convergence latency: updates
/// are rebroadcast more times, more witnesses are consulted before
/// declaring failure, and suspects get extra time on noisy networks.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// UDP bind address (e.g. "0.0.0.0:7946")
    pub bind_addr: String,
    /// Cadence of the probe loop
    pub probe_interval: Duration,
    /// Wait for a direct ack before trying witnesses
    pub probe_timeout: Duration,
    /// Ceiling on the local-health probe timeout multiplier. Probe
    /// cadence backs off further when our own probes go unanswered.
    pub awareness_max_multiplier: u32,
    /// Scales how long a suspect gets to refute before being declared
    /// dead
    pub suspicion_mult: u32,
    /// Scales how many times each membership update is gossiped
    pub retransmit_mult: u32,
    /// Witnesses asked to probe indirectly before suspecting a member
    pub indirect_checks: usize,
    /// Wait for a seed's reply during join
    pub join_timeout: Duration,
    /// Membership updates piggybacked per datagram
    pub piggyback_limit: usize,
}

impl ClusterConfig {
    /// LAN-tuned defaults.
    pub fn lan(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            probe_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(500),
            awareness_max_multiplier: 8,
            suspicion_mult: 4,
            retransmit_mult: 4,
            indirect_checks: 3,
            join_timeout: Duration::from_secs(2),
            piggyback_limit: 8,
        }
    }

    /// Times each update is rebroadcast: `retransmit_mult * ceil(log2(n + 1))`,
    /// at least once.
    pub fn retransmit_limit(&self, cluster_size: usize) -> u32 {
        self.retransmit_mult * log2_ceil(cluster_size + 1).max(1)
    }

    /// How long a suspect has to refute:
    /// `suspicion_mult * ceil(log2(n + 1)) * probe_interval`.
    pub fn suspicion_timeout(&self, cluster_size: usize) -> Duration {
        self.probe_interval * self.suspicion_mult * log2_ceil(cluster_size + 1).max(1)
    }
}

fn log2_ceil(n: usize) -> u32 {
    let n = n.max(1) as u64;
    64 - (n - 1).leading_zeros() as u32
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
