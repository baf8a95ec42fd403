// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn bootstrap_config_has_single_voter() {
    let config = Configuration::bootstrap("node-1", "127.0.0.1:9000");
    assert!(config.contains("node-1"));
    assert_eq!(config.addr_of("node-1"), Some("127.0.0.1:9000"));
    assert_eq!(config.quorum(), 1);
}

#[test]
fn quorum_sizes() {
    let mut config = Configuration::default();
    for i in 0..5 {
        config.voters.insert(format!("n{i}"), format!("127.0.0.1:{}", 9000 + i));
    }
    assert_eq!(config.quorum(), 3);

    config.voters.remove("n4");
    assert_eq!(config.quorum(), 3);

    config.voters.remove("n3");
    assert_eq!(config.quorum(), 2);
}

#[test]
fn entry_serde_round_trip() {
    let entry = LogEntry {
        index: 7,
        term: 2,
        payload: EntryPayload::Command(b"hello".to_vec()),
    };
    let json = serde_json::to_string(&entry).unwrap();
    let parsed: LogEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, entry);
}

#[test]
fn config_entry_round_trip() {
    let entry = LogEntry {
        index: 1,
        term: 1,
        payload: EntryPayload::Config(Configuration::bootstrap("a", "127.0.0.1:1")),
    };
    let json = serde_json::to_string(&entry).unwrap();
    let parsed: LogEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, entry);
}
