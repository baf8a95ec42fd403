// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission HTTP API.
//!
//! `POST /tasks` writes a pending event through the log (500 on a
//! follower; no forwarding here), `GET /nodes` lists gossip members,
//! `GET /raft` reports consensus state and the task map.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use orion_cluster::Cluster;
use orion_core::{
    Clock, EventId, IdGen, SystemClock, Task, TaskEvent, TaskState, UuidIdGen,
};
use orion_store::Store;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared context for all handlers.
pub struct ApiCtx {
    pub store: Arc<Store>,
    pub cluster: Cluster,
}

/// Task fields accepted at admission. Id and state are always assigned
/// by the server.
#[derive(Debug, Deserialize)]
struct TaskSubmission {
    name: String,
    image: String,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    port_bindings: HashMap<String, String>,
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    cpu: f64,
    #[serde(default)]
    disk: u64,
    #[serde(default)]
    restart_policy: String,
    #[serde(default)]
    node_selectors: HashMap<String, String>,
}

/// One row of `GET /nodes`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeEntry {
    pub name: String,
    pub ip: String,
    pub role: String,
    pub status: String,
    pub cpu: f64,
    pub ram: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RaftView {
    state: String,
    task_count: usize,
    tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

/// Build the admission router.
pub fn router(ctx: Arc<ApiCtx>) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/nodes", get(list_nodes))
        .route("/raft", get(raft_view))
        .with_state(ctx)
}

/// Serve the admission API until cancelled.
pub async fn serve(
    ctx: Arc<ApiCtx>,
    listener: TcpListener,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "admission api listening");
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn create_task(State(ctx): State<Arc<ApiCtx>>, body: Bytes) -> Response {
    let submission: TaskSubmission = match serde_json::from_slice(&body) {
        Ok(submission) => submission,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid task: {e}")),
    };

    let clock = SystemClock;
    let task = Task {
        id: UuidIdGen.next().into(),
        name: submission.name,
        image: submission.image,
        command: submission.command,
        port_bindings: submission.port_bindings,
        memory: submission.memory,
        cpu: submission.cpu,
        disk: submission.disk,
        restart_policy: submission.restart_policy,
        node_selectors: submission.node_selectors,
        node_id: String::new(),
        state: TaskState::Pending,
        submit_time: clock.utc_now(),
        finish_time: None,
    };

    let event = TaskEvent::new(
        EventId::new(UuidIdGen.next()),
        TaskState::Pending,
        task.submit_time,
        task.clone(),
    );
    if let Err(e) = ctx.store.submit(&event).await {
        warn!(task = %task.id, error = %e, "admission failed");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    info!(task = %task.id, name = %task.name, "task admitted");
    (StatusCode::CREATED, Json(task)).into_response()
}

async fn list_nodes(State(ctx): State<Arc<ApiCtx>>) -> Json<Vec<NodeEntry>> {
    let entries = ctx
        .cluster
        .members()
        .into_iter()
        .map(|member| NodeEntry {
            name: member.id.clone(),
            ip: member.addr.ip().to_string(),
            role: member.meta.role.to_string(),
            status: member.state.to_string(),
            cpu: member.meta.cpu_total,
            ram: member.meta.mem_total,
        })
        .collect();
    Json(entries)
}

async fn raft_view(State(ctx): State<Arc<ApiCtx>>) -> Response {
    let state = match ctx.store.raft_status() {
        Some(status) => status.role.to_string(),
        None => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "store not opened"),
    };
    let tasks = ctx.store.list_tasks();
    Json(RaftView { state, task_count: tasks.len(), tasks }).into_response()
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
