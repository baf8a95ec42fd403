// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orion_cluster::{ClusterConfig, NoopHandler};
use orion_core::{NodeMeta, Role};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn serve_api(store: Arc<Store>) -> (SocketAddr, CancellationToken) {
    let meta = NodeMeta {
        id: "node-1".to_string(),
        role: Role::Manager,
        mem_total: 2048,
        mem_used: 0,
        cpu_total: 1.0,
        consensus_port: 1,
    };
    let cluster =
        Cluster::new(ClusterConfig::lan("127.0.0.1:0"), meta, Arc::new(NoopHandler)).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let ctx = Arc::new(ApiCtx { store, cluster });
    tokio::spawn(serve(ctx, listener, cancel.clone()));
    (addr, cancel)
}

async fn leader_store(dir: &std::path::Path) -> Arc<Store> {
    let store = Arc::new(Store::new());
    Store::open(&store, dir, "node-1", "127.0.0.1:0", true).await.unwrap();
    let start = std::time::Instant::now();
    while !store.is_leader() {
        assert!(start.elapsed() < Duration::from_secs(3), "no leader");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    store
}

/// Minimal HTTP/1.1 request over a raw socket.
async fn http(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
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

#[tokio::test]
async fn post_task_creates_pending_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = leader_store(dir.path()).await;
    let (addr, cancel) = serve_api(Arc::clone(&store)).await;

    let (status, payload) = http(
        addr,
        "POST",
        "/tasks",
        Some(r#"{"name":"t1","image":"alpine","memory":134217728,"cpu":0.5}"#),
    )
    .await;
    assert_eq!(status, 201, "payload: {payload}");

    let created: Task = serde_json::from_str(&payload).unwrap();
    assert_eq!(created.name, "t1");
    assert_eq!(created.state, TaskState::Pending);
    assert!(!created.id.is_empty());

    let stored = store.get_task(created.id.as_str()).unwrap();
    assert_eq!(stored.state, TaskState::Pending);

    cancel.cancel();
    store.shutdown();
}

#[tokio::test]
async fn post_invalid_body_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let store = leader_store(dir.path()).await;
    let (addr, cancel) = serve_api(Arc::clone(&store)).await;

    let (status, _) = http(addr, "POST", "/tasks", Some("{not json")).await;
    assert_eq!(status, 400);

    cancel.cancel();
    store.shutdown();
}

#[tokio::test]
async fn post_on_follower_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new());
    Store::open(&store, dir.path(), "node-2", "127.0.0.1:0", false).await.unwrap();
    let (addr, cancel) = serve_api(Arc::clone(&store)).await;

    let (status, _) = http(addr, "POST", "/tasks", Some(r#"{"name":"t1","image":"alpine"}"#)).await;
    assert_eq!(status, 500);

    cancel.cancel();
    store.shutdown();
}

#[tokio::test]
async fn get_nodes_lists_members() {
    let dir = tempfile::tempdir().unwrap();
    let store = leader_store(dir.path()).await;
    let (addr, cancel) = serve_api(Arc::clone(&store)).await;

    let (status, payload) = http(addr, "GET", "/nodes", None).await;
    assert_eq!(status, 200);

    let nodes: Vec<NodeEntry> = serde_json::from_str(&payload).unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, "node-1");
    assert_eq!(nodes[0].role, "manager");
    assert_eq!(nodes[0].status, "alive");

    cancel.cancel();
    store.shutdown();
}

#[tokio::test]
async fn get_raft_reports_state_and_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let store = leader_store(dir.path()).await;
    let (addr, cancel) = serve_api(Arc::clone(&store)).await;

    let (_, _) = http(
        addr,
        "POST",
        "/tasks",
        Some(r#"{"name":"t1","image":"alpine"}"#),
    )
    .await;

    let (status, payload) = http(addr, "GET", "/raft", None).await;
    assert_eq!(status, 200);

    let view: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(view["state"], "Leader");
    assert_eq!(view["taskCount"], 1);
    assert_eq!(view["tasks"].as_array().unwrap().len(), 1);

    cancel.cancel();
    store.shutdown();
}
