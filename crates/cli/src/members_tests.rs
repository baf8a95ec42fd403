// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn node_rows_decode() {
    let body = r#"[
        {"name":"host-7946","ip":"127.0.0.1","role":"manager","status":"alive","cpu":4.0,"ram":4294967296}
    ]"#;
    let rows: Vec<NodeRow> = serde_json::from_str(body).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "host-7946");
    assert_eq!(rows[0].status, "alive");
}

#[tokio::test]
async fn get_against_closed_port_errors() {
    // Port 1 refuses connections.
    assert!(http_get("127.0.0.1:1", "/nodes").await.is_err());
}

#[tokio::test]
async fn non_200_status_is_an_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    });

    let err = http_get(&addr.to_string(), "/nodes").await.unwrap_err();
    assert!(err.to_string().contains("500"));
}
