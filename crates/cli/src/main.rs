// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The orion binary: start a node, or query a running one.

mod members;

use anyhow::Context;
use clap::{Parser, Subcommand};
use orion_daemon::{Config, Node};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orion", about = "Orion is a distributed task orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Admission API port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Gossip UDP port
    #[arg(long = "gossip-port", default_value_t = 7946)]
    gossip_port: u16,

    /// Consensus TCP port
    #[arg(long = "raft-port", default_value_t = 9000)]
    raft_port: u16,

    /// Node id (default: <hostname>-<gossip-port>)
    #[arg(long)]
    id: Option<String>,

    /// Gossip address of a member to join
    #[arg(long)]
    join: Option<String>,

    /// Form a new cluster with this node as the first voter
    #[arg(long)]
    bootstrap: bool,

    /// Consensus state directory (default: data-<node-id>)
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List cluster members from a running node
    Members {
        /// Admission API port of the node to query
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Members { port }) => members::run(port).await,
        None => run_node(cli).await,
    }
}

async fn run_node(cli: Cli) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let node_id =
        cli.id.unwrap_or_else(|| format!("{}-{}", hostname(), cli.gossip_port));

    let mut config = Config::new(node_id);
    config.api_port = cli.port;
    config.gossip_port = cli.gossip_port;
    config.raft_port = cli.raft_port;
    config.join = cli.join;
    config.bootstrap = cli.bootstrap;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let node = Node::start(config).await.context("failed to start node")?;

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("interrupt received");
    node.shutdown(Duration::from_secs(5)).await;
    Ok(())
}

/// Best-effort hostname for the default node id.
fn hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "node".to_string())
}
