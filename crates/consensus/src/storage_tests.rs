// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::message::EntryPayload;
use std::io::Write as _;

fn entry(index: u64, term: u64) -> LogEntry {
    LogEntry { index, term, payload: EntryPayload::Command(vec![index as u8]) }
}

#[test]
fn log_append_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    let (mut store, loaded) = LogStore::open(&path).unwrap();
    assert!(loaded.is_empty());
    store.append(&[entry(1, 1), entry(2, 1)]).unwrap();
    store.append(&[entry(3, 2)]).unwrap();
    drop(store);

    let (_, loaded) = LogStore::open(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[2].index, 3);
    assert_eq!(loaded[2].term, 2);
}

#[test]
fn log_drops_torn_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    let (mut store, _) = LogStore::open(&path).unwrap();
    store.append(&[entry(1, 1), entry(2, 1)]).unwrap();
    drop(store);

    // Simulate a crash mid-append.
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"index\":3,\"ter").unwrap();
    drop(file);

    let (_, loaded) = LogStore::open(&path).unwrap();
    assert_eq!(loaded.len(), 2);
}

#[test]
fn log_rewrite_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    let (mut store, _) = LogStore::open(&path).unwrap();
    store.append(&[entry(1, 1), entry(2, 1), entry(3, 1)]).unwrap();
    store.rewrite(&[entry(3, 1)]).unwrap();
    store.append(&[entry(4, 2)]).unwrap();
    drop(store);

    let (_, loaded) = LogStore::open(&path).unwrap();
    let indexes: Vec<u64> = loaded.iter().map(|e| e.index).collect();
    assert_eq!(indexes, vec![3, 4]);
}

#[test]
fn stable_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = StableStore::open(dir.path().join("stable.json"));

    assert_eq!(store.load().unwrap().term, 0);

    let state = HardState {
        term: 5,
        voted_for: Some("node-2".to_string()),
        config: Configuration::bootstrap("node-1", "127.0.0.1:9000"),
    };
    store.save(&state).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.term, 5);
    assert_eq!(loaded.voted_for.as_deref(), Some("node-2"));
    assert!(loaded.config.contains("node-1"));
}

#[test]
fn snapshot_save_load_latest() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path().join("snapshots")).unwrap();

    assert!(store.load_latest().unwrap().is_none());

    let snap = |index: u64| SnapshotFile {
        meta: SnapshotMeta {
            index,
            term: 1,
            config: Configuration::bootstrap("a", "127.0.0.1:1"),
        },
        data: format!("state-{index}").into_bytes(),
    };

    store.save(&snap(10)).unwrap();
    store.save(&snap(20)).unwrap();

    let latest = store.load_latest().unwrap().unwrap();
    assert_eq!(latest.meta.index, 20);
    assert_eq!(latest.data, b"state-20");
}

#[test]
fn snapshot_retention_rotates() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path().join("snapshots")).unwrap();

    for index in [1u64, 2, 3, 4] {
        store.save(&SnapshotFile {
            meta: SnapshotMeta {
                index,
                term: 1,
                config: Configuration::default(),
            },
            data: vec![],
        })
        .unwrap();
    }

    let files: Vec<_> = fs::read_dir(dir.path().join("snapshots"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
        .collect();
    assert_eq!(files.len(), 2);

    let latest = store.load_latest().unwrap().unwrap();
    assert_eq!(latest.meta.index, 4);
}
