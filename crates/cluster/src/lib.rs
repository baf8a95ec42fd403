// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orion-cluster: Gossip-based failure-detected membership.
//!
//! SWIM-style probing over UDP: periodic direct pings, indirect probes
//! through witnesses, suspicion with incarnation-numbered refutation,
//! and piggybacked dissemination of membership updates. Node metadata
//! rides along with every member record; it is the only channel through
//! which consensus endpoints are discovered.

mod bridge;
mod cluster;
mod config;
mod proto;

pub use bridge::{MembershipHandler, NoopHandler, StoreBridge};
pub use cluster::{Cluster, ClusterError};
pub use config::ClusterConfig;
pub use proto::{Member, MemberState};
