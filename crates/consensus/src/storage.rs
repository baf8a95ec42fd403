// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable state: the entry log, the hard state, and snapshot files.
//!
//! The log is an append-only file of JSON lines. The hard state (term,
//! vote, membership) is a single JSON document rewritten atomically via
//! a temp file. Snapshots live in their own subdirectory with the two
//! most recent retained.

use crate::message::{Configuration, LogEntry, NodeId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of snapshot files kept on disk.
const SNAPSHOT_RETAIN: usize = 2;

/// Term, vote, and membership that must survive restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub voted_for: Option<NodeId>,
    #[serde(default)]
    pub config: Configuration,
}

/// File-backed hard state with atomic rewrite.
pub struct StableStore {
    path: PathBuf,
}

impl StableStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> io::Result<HardState> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HardState::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, state: &HardState) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        fs::rename(&tmp, &self.path)
    }
}

/// Append-only entry log: one JSON line per entry.
pub struct LogStore {
    path: PathBuf,
    file: File,
}

impl LogStore {
    /// Open the log, returning the entries currently on disk.
    ///
    /// A torn trailing line (crash mid-append) is dropped with a warning;
    /// everything before it is kept.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<(Self, Vec<LogEntry>)> {
        let path = path.into();
        let mut entries = Vec::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogEntry>(&line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        warn!(error = %e, path = %path.display(), "dropping torn log tail");
                        break;
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((Self { path, file }, entries))
    }

    /// Append entries to the end of the log.
    pub fn append(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            buf.push(b'\n');
        }
        self.file.write_all(&buf)?;
        self.file.sync_data()
    }

    /// Replace the whole log with the given entries.
    ///
    /// Used after truncation on conflict and after snapshot compaction.
    pub fn rewrite(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            let mut buf = Vec::new();
            for entry in entries {
                serde_json::to_writer(&mut buf, entry)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                buf.push(b'\n');
            }
            file.write_all(&buf)?;
            file.sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }
}

/// Index, term, and membership covered by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub index: u64,
    pub term: u64,
    pub config: Configuration,
}

/// A snapshot blob plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}

/// Directory of snapshot files, newest-first retention.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_path(&self, index: u64, term: u64) -> PathBuf {
        self.dir.join(format!("snapshot-{index:020}-{term:020}.json"))
    }

    /// Persist a snapshot and rotate out anything beyond the retention
    /// limit. Partial writes are cleaned up before surfacing the error
    /// (the engine's cancel hook).
    pub fn save(&self, snapshot: &SnapshotFile) -> io::Result<()> {
        let path = self.file_path(snapshot.meta.index, snapshot.meta.term);
        let tmp = path.with_extension("tmp");

        let result = (|| {
            let bytes = serde_json::to_vec(snapshot)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_data()?;
            fs::rename(&tmp, &path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
            return result;
        }

        self.rotate()
    }

    /// Load the most recent snapshot, if any.
    pub fn load_latest(&self) -> io::Result<Option<SnapshotFile>> {
        match self.sorted_paths()?.first() {
            Some(path) => {
                let bytes = fs::read(path)?;
                let snapshot = serde_json::from_slice(&bytes)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Snapshot file paths, newest first.
    fn sorted_paths(&self) -> io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(p.file_name().and_then(|n| n.to_str()),
                    Some(name) if name.starts_with("snapshot-") && name.ends_with(".json"))
            })
            .collect();
        paths.sort();
        paths.reverse();
        Ok(paths)
    }

    fn rotate(&self) -> io::Result<()> {
        for stale in self.sorted_paths()?.into_iter().skip(SNAPSHOT_RETAIN) {
            let _ = fs::remove_file(stale);
        }
        Ok(())
    }
}

/// Helper for `Path`-based callers.
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
