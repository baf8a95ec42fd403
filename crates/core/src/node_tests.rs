// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn meta_encode_decode() {
    let meta = NodeMeta {
        id: "node-a".to_string(),
        role: Role::Manager,
        mem_total: 8 * 1024 * 1024 * 1024,
        mem_used: 1024 * 1024 * 1024,
        cpu_total: 4.0,
        consensus_port: 9000,
    };

    let bytes = meta.encode().unwrap();
    let decoded = NodeMeta::decode(&bytes).unwrap();
    assert_eq!(decoded, meta);
}

#[test]
fn meta_decode_defaults() {
    // Older members may advertise only id and consensus port.
    let decoded = NodeMeta::decode(br#"{"id":"n1","consensus_port":9000}"#).unwrap();
    assert_eq!(decoded.role, Role::Worker);
    assert_eq!(decoded.mem_total, 0);
    assert_eq!(decoded.cpu_total, 0.0);
}

#[test]
fn role_display() {
    assert_eq!(Role::Manager.to_string(), "manager");
    assert_eq!(Role::Worker.to_string(), "worker");
}
