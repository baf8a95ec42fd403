// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node assembly and lifecycle.
//!
//! Owns the store/cluster/reconciler trio for the lifetime of the
//! process; teardown is cancellation of the root token plus a gossip
//! leave.

use crate::api::{self, ApiCtx};
use crate::manager::Manager;
use orion_cluster::{Cluster, ClusterConfig, ClusterError, StoreBridge};
use orion_core::{NodeMeta, Role, SystemClock};
use orion_store::{Store, StoreError};
use orion_worker::DockerCli;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Memory advertised until stats collection reports real figures.
const DEFAULT_MEM_TOTAL: u64 = 4 * 1024 * 1024 * 1024;

/// Node configuration assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Stable node id (default `<hostname>-<gossip-port>`)
    pub node_id: String,
    /// Admission HTTP port
    pub api_port: u16,
    /// Gossip UDP port
    pub gossip_port: u16,
    /// Consensus TCP port
    pub raft_port: u16,
    /// Optional seed to join
    pub join: Option<String>,
    /// Form a new cluster with this node as the only voter. Exactly one
    /// node in a new cluster starts with this.
    pub bootstrap: bool,
    /// Consensus state directory (default `data-<node-id>`)
    pub data_dir: PathBuf,
}

impl Config {
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let data_dir = PathBuf::from(format!("data-{node_id}"));
        Self {
            node_id,
            api_port: 8080,
            gossip_port: 7946,
            raft_port: 9000,
            join: None,
            bootstrap: false,
            data_dir,
        }
    }
}

/// Errors during node startup.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("cluster: {0}")]
    Cluster(#[from] ClusterError),

    #[error("api bind: {0}")]
    Api(#[from] std::io::Error),
}

/// A running orchestrator node.
pub struct Node {
    pub store: Arc<Store>,
    pub cluster: Cluster,
    cancel: CancellationToken,
}

impl Node {
    /// Bring up the full trio plus the admission API.
    pub async fn start(config: Config) -> Result<Node, NodeError> {
        let store = Arc::new(Store::new());
        Store::open(
            &store,
            &config.data_dir,
            &config.node_id,
            &format!("0.0.0.0:{}", config.raft_port),
            config.bootstrap,
        )
        .await?;

        let meta = NodeMeta {
            id: config.node_id.clone(),
            role: if config.bootstrap { Role::Manager } else { Role::Worker },
            mem_total: DEFAULT_MEM_TOTAL,
            mem_used: 0,
            cpu_total: available_cores(),
            consensus_port: config.raft_port,
        };

        let bridge = Arc::new(StoreBridge::new(Arc::clone(&store), &config.node_id));
        let cluster = Cluster::new(
            ClusterConfig::lan(format!("0.0.0.0:{}", config.gossip_port)),
            meta,
            bridge,
        )
        .await?;

        if let Some(seed) = &config.join {
            match cluster.join(&[seed.clone()]).await {
                Ok(count) => info!(seed = %seed, count, "joined cluster"),
                // The node still starts; the operator can retry.
                Err(e) => warn!(seed = %seed, error = %e, "failed to join cluster"),
            }
        }

        let cancel = CancellationToken::new();

        let manager = Manager::new(
            Arc::clone(&store),
            cluster.clone(),
            Arc::new(DockerCli::new()),
            SystemClock,
            &config.node_id,
        );
        let manager_cancel = cancel.child_token();
        tokio::spawn(async move { manager.run(manager_cancel).await });

        let api_listener =
            TcpListener::bind(format!("0.0.0.0:{}", config.api_port)).await?;
        let ctx = Arc::new(ApiCtx { store: Arc::clone(&store), cluster: cluster.clone() });
        let api_cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = api::serve(ctx, api_listener, api_cancel).await {
                error!(error = %e, "admission api exited");
            }
        });

        info!(id = %config.node_id, "node started");
        Ok(Node { store, cluster, cancel })
    }

    /// Stop background loops, announce departure, and shut the engine
    /// down.
    pub async fn shutdown(&self, grace: Duration) {
        info!("node shutting down");
        self.cancel.cancel();
        if let Err(e) = self.cluster.leave(grace).await {
            warn!(error = %e, "gossip leave failed");
        }
        self.store.shutdown();
    }
}

fn available_cores() -> f64 {
    std::thread::available_parallelism().map(|n| n.get() as f64).unwrap_or(1.0)
}
