// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenarios: the trio wired together the way a real
//! node wires it, minus the container runtime.

use orion_cluster::{Cluster, ClusterConfig, NoopHandler, StoreBridge};
use orion_core::{Clock, EventId, NodeMeta, Role, SystemClock, Task, TaskEvent, TaskState};
use orion_daemon::api::{self, ApiCtx};
use orion_daemon::Manager;
use orion_scheduler::{select_candidate, Node};
use orion_store::Store;
use orion_worker::FakeRuntime;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

fn meta(id: &str, consensus_port: u16) -> NodeMeta {
    NodeMeta {
        id: id.to_string(),
        role: Role::Worker,
        mem_total: 4 * 1024 * 1024 * 1024,
        mem_used: 0,
        cpu_total: 2.0,
        consensus_port,
    }
}

fn fast_gossip() -> ClusterConfig {
    let mut config = ClusterConfig::lan("127.0.0.1:0");
    config.probe_interval = Duration::from_millis(200);
    config.probe_timeout = Duration::from_millis(100);
    config
}

async fn wait_for<F: Fn() -> bool>(what: &str, deadline: Duration, check: F) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn open_store(dir: &std::path::Path, id: &str, bootstrap: bool) -> Arc<Store> {
    let store = Arc::new(Store::new());
    Store::open(&store, &dir.join(id), id, "127.0.0.1:0", bootstrap).await.unwrap();
    store
}

/// Scenario: one node, bootstrap. Leadership within 3 s; a submitted
/// task reaches Running on the local node within two tick periods.
#[tokio::test]
async fn bootstrap_and_single_submission() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path(), "node-1", true).await;
    wait_for("leadership", Duration::from_secs(3), || store.is_leader()).await;

    let cluster = Cluster::new(fast_gossip(), meta("node-1", 1), Arc::new(NoopHandler))
        .await
        .unwrap();
    let runtime = Arc::new(FakeRuntime::new());
    let tick = Duration::from_millis(100);
    let manager = Manager::new(
        Arc::clone(&store),
        cluster.clone(),
        Arc::clone(&runtime),
        SystemClock,
        "node-1",
    )
    .with_tick(tick);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move { manager.run(cancel).await });
    }

    // Admission: POST through the HTTP API.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_addr = listener.local_addr().unwrap();
    let ctx = Arc::new(ApiCtx { store: Arc::clone(&store), cluster: cluster.clone() });
    tokio::spawn(api::serve(ctx, listener, cancel.clone()));

    let (status, payload) = http_request(
        api_addr.to_string(),
        "POST",
        "/tasks",
        Some(r#"{"name":"t1","image":"alpine","memory":134217728,"cpu":0.5}"#),
    )
    .await;
    assert_eq!(status, 201, "payload: {payload}");

    wait_for("task running", tick * 4, || {
        store.list_tasks().iter().any(|t| {
            t.name == "t1" && t.state == TaskState::Running && t.node_id == "node-1"
        })
    })
    .await;
    assert_eq!(runtime.run_calls(), ["t1".to_string()]);

    cancel.cancel();
    let _ = cluster.leave(Duration::from_millis(50)).await;
    store.shutdown();
}

/// Scenario: node B joins via gossip; both member lists converge and
/// the consensus configuration reports two voters within 5 s.
#[tokio::test]
async fn two_node_join_reaches_consensus_config() {
    let dir = tempfile::tempdir().unwrap();

    let store_a = open_store(dir.path(), "node-a", true).await;
    wait_for("leadership", Duration::from_secs(3), || store_a.is_leader()).await;
    let store_b = open_store(dir.path(), "node-b", false).await;

    let raft_port_a = store_a.consensus_addr().unwrap().port();
    let raft_port_b = store_b.consensus_addr().unwrap().port();

    let bridge_a = Arc::new(StoreBridge::new(Arc::clone(&store_a), "node-a"));
    let cluster_a = Cluster::new(fast_gossip(), meta("node-a", raft_port_a), bridge_a)
        .await
        .unwrap();

    let bridge_b = Arc::new(StoreBridge::new(Arc::clone(&store_b), "node-b"));
    let cluster_b = Cluster::new(fast_gossip(), meta("node-b", raft_port_b), bridge_b)
        .await
        .unwrap();

    cluster_b.join(&[cluster_a.local_addr().to_string()]).await.unwrap();

    wait_for("membership convergence", Duration::from_secs(5), || {
        cluster_a.members().len() == 2 && cluster_b.members().len() == 2
    })
    .await;

    wait_for("consensus config", Duration::from_secs(5), || {
        store_a.raft_status().map(|s| s.voters.len() == 2).unwrap_or(false)
    })
    .await;

    // The new voter catches up on replicated state.
    let task = Task::builder().id("t-1").name("replicated").build();
    let event = TaskEvent::new(
        EventId::new("e-1"),
        TaskState::Pending,
        SystemClock.utc_now(),
        task,
    );
    store_a.submit(&event).await.unwrap();

    wait_for("replication to b", Duration::from_secs(5), || {
        store_b.get_task("t-1").is_ok()
    })
    .await;

    let _ = cluster_b.leave(Duration::from_millis(50)).await;
    let _ = cluster_a.leave(Duration::from_millis(50)).await;
    store_a.shutdown();
    store_b.shutdown();
}

/// Invariant: identical event sequences produce set-equal task lists on
/// independent stores.
#[test]
fn fsm_determinism_across_stores() {
    use orion_consensus::StateMachine as _;

    let clock = SystemClock;
    let events: Vec<TaskEvent> = (0..20)
        .map(|i| {
            let task = Task::builder()
                .id(format!("t-{}", i % 5))
                .name(format!("task-{}", i % 5))
                .memory(i)
                .build();
            let state = match i % 5 {
                0 => TaskState::Pending,
                1 => TaskState::Scheduled,
                2 => TaskState::Running,
                3 => TaskState::Completed,
                _ => TaskState::Failed,
            };
            TaskEvent::new(EventId::new(format!("e-{i}")), state, clock.utc_now(), {
                let mut t = task;
                t.state = state;
                t
            })
        })
        .collect();

    let a = Store::new();
    let b = Store::new();
    for event in &events {
        let blob = serde_json::to_vec(event).unwrap();
        a.apply(&blob);
        b.apply(&blob);
    }

    let sort = |mut tasks: Vec<Task>| {
        tasks.sort_by(|x, y| x.id.as_str().cmp(y.id.as_str()));
        tasks
    };
    assert_eq!(sort(a.list_tasks()), sort(b.list_tasks()));
}

/// Placement corner cases exercised through the public surface.
#[test]
fn placement_scenarios() {
    let node = |id: &str, total: u64, used: u64| Node {
        id: id.to_string(),
        memory_total: total,
        memory_used: used,
        disk_total: 1000,
        disk_used: 0,
        cpu_total: 1.0,
        tags: HashMap::new(),
    };

    // Bin-packing: most free memory wins.
    let task = Task::builder().memory(100).build();
    let nodes = vec![node("small", 1000, 800), node("big", 1000, 100)];
    assert_eq!(select_candidate(&task, &nodes).map(|n| n.id.as_str()), Some("big"));

    // Selector mismatch yields no candidate.
    let task = Task::builder().selector("gpu", "true").build();
    let mut tagged = node("only", 1000, 0);
    tagged.tags.insert("gpu".to_string(), "false".to_string());
    assert!(select_candidate(&task, &[tagged]).is_none());

    // Insufficient free memory yields no candidate.
    let task = Task::builder().memory(500).build();
    assert!(select_candidate(&task, &[node("only", 1000, 600)]).is_none());
}

async fn http_request(
    addr: String,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.unwrap_or("");
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response).to_string();

    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let payload = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, payload)
}
