// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `orion members`: fetch and print the member table.
//!
//! Talks plain HTTP/1.1 over a TCP stream; the payload is small enough
//! that a full client library would be overkill.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Deserialize)]
struct NodeRow {
    name: String,
    ip: String,
    role: String,
    status: String,
    cpu: f64,
    ram: u64,
}

pub async fn run(port: u16) -> anyhow::Result<()> {
    let body = http_get(&format!("127.0.0.1:{port}"), "/nodes")
        .await
        .context("error connecting to API")?;
    let nodes: Vec<NodeRow> = serde_json::from_str(&body).context("error decoding response")?;
    print_table(&nodes);
    Ok(())
}

async fn http_get(addr: &str, path: &str) -> anyhow::Result<String> {
    let response = tokio::time::timeout(Duration::from_secs(5), async {
        let mut stream = TcpStream::connect(addr).await.context("TCP connect failed")?;
        let request = format!(
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.context("write failed")?;

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.context("read failed")?;
        Ok::<_, anyhow::Error>(String::from_utf8_lossy(&response).to_string())
    })
    .await
    .context("request timed out")??;

    let status = response.split_whitespace().nth(1).unwrap_or("");
    if status != "200" {
        bail!("API returned status {status}");
    }

    match response.split_once("\r\n\r\n") {
        Some((_, body)) => Ok(body.to_string()),
        None => bail!("malformed HTTP response"),
    }
}

fn print_table(nodes: &[NodeRow]) {
    let mut rows = vec![[
        "Name".to_string(),
        "IP".to_string(),
        "Role".to_string(),
        "Status".to_string(),
        "CPU".to_string(),
        "RAM".to_string(),
    ]];
    for node in nodes {
        rows.push([
            node.name.clone(),
            node.ip.clone(),
            node.role.clone(),
            node.status.clone(),
            format!("{:.2}", node.cpu),
            node.ram.to_string(),
        ]);
    }

    let mut widths = [0usize; 6];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    for row in &rows {
        let line = row
            .iter()
            .zip(widths.iter().copied())
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("   ");
        println!("{}", line.trim_end());
    }
}

#[cfg(test)]
#[path = "members_tests.rs"]
mod tests;
