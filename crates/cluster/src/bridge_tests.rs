// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::proto::{Member, MemberState};
use orion_core::{NodeMeta, Role};
use std::time::Duration;

fn member(id: &str, consensus_port: u16) -> Member {
    Member {
        id: id.to_string(),
        addr: "127.0.0.1:7946".parse().unwrap(),
        meta: NodeMeta {
            id: id.to_string(),
            role: Role::Worker,
            mem_total: 0,
            mem_used: 0,
            cpu_total: 0.0,
            consensus_port,
        },
        incarnation: 1,
        state: MemberState::Alive,
    }
}

#[tokio::test]
async fn self_join_is_ignored() {
    let store = Arc::new(Store::new());
    let bridge = StoreBridge::new(Arc::clone(&store), "node-a");
    // Would fail loudly if it touched the unopened store.
    bridge.on_join(&member("node-a", 9000)).await;
}

#[tokio::test]
async fn follower_ignores_join_and_leave() {
    let store = Arc::new(Store::new());
    let bridge = StoreBridge::new(Arc::clone(&store), "node-a");
    bridge.on_join(&member("node-b", 9000)).await;
    bridge.on_leave(&member("node-b", 9000)).await;
}

#[tokio::test]
async fn leader_adds_and_removes_voters() {
    let dir = tempfile::tempdir().unwrap();

    let a = Arc::new(Store::new());
    Store::open(&a, &dir.path().join("a"), "node-a", "127.0.0.1:0", true).await.unwrap();
    let start = std::time::Instant::now();
    while !a.is_leader() {
        assert!(start.elapsed() < Duration::from_secs(3));
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let b = Arc::new(Store::new());
    Store::open(&b, &dir.path().join("b"), "node-b", "127.0.0.1:0", false).await.unwrap();
    let b_port = b.consensus_addr().unwrap().port();

    let bridge = StoreBridge::new(Arc::clone(&a), "node-a");
    bridge.on_join(&member("node-b", b_port)).await;

    let voters = a.raft_status().unwrap().voters;
    assert!(voters.contains(&"node-b".to_string()), "voters: {voters:?}");

    // Duplicate join is a no-op (idempotent add).
    bridge.on_join(&member("node-b", b_port)).await;
    assert_eq!(a.raft_status().unwrap().voters.len(), 2);

    bridge.on_leave(&member("node-b", b_port)).await;
    let voters = a.raft_status().unwrap().voters;
    assert_eq!(voters, vec!["node-a".to_string()]);

    a.shutdown();
    b.shutdown();
}
