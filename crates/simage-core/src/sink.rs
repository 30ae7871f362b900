//! Record sinks: where finished hash records and bad-file markers go.
//!
//! The engine only needs append-style writes. Sinks own their failures:
//! an I/O error is logged here and never reaches the job that produced the
//! records.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::output::JsonlWriter;
use crate::types::{BadFileMarker, HashRecord, StoredEntry};

/// Persists hash records.
///
/// Called concurrently from several hashing workers, so implementations
/// must serialize writes themselves.
pub trait RecordSink: Send + Sync {
    /// Store a finished batch. May be empty.
    fn add(&self, records: Vec<HashRecord>);

    /// Remember a path that could not be hashed.
    fn mark_bad(&self, marker: BadFileMarker);

    /// Flush and stop accepting writes.
    fn shutdown(&self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct MemoryState {
    records: HashMap<PathBuf, u64>,
    bad_files: Vec<PathBuf>,
    add_calls: Vec<usize>,
    shut_down: bool,
}

/// In-process sink keeping everything in memory.
///
/// Like the relational store it stands in for, the first record for a path
/// wins; later records for the same path are ignored.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, sorted by path.
    pub fn records(&self) -> Vec<HashRecord> {
        let state = lock(&self.state);
        let mut records: Vec<HashRecord> = state
            .records
            .iter()
            .map(|(path, fingerprint)| HashRecord::new(path.clone(), *fingerprint))
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    pub fn fingerprint(&self, path: &Path) -> Option<u64> {
        lock(&self.state).records.get(path).copied()
    }

    /// Bad files in the order they were reported.
    pub fn bad_files(&self) -> Vec<PathBuf> {
        lock(&self.state).bad_files.clone()
    }

    /// Size of every `add` call, in call order.
    pub fn add_calls(&self) -> Vec<usize> {
        lock(&self.state).add_calls.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.state).shut_down
    }
}

impl RecordSink for MemorySink {
    fn add(&self, records: Vec<HashRecord>) {
        let mut state = lock(&self.state);
        state.add_calls.push(records.len());
        for record in records {
            state
                .records
                .entry(record.path)
                .or_insert(record.fingerprint);
        }
    }

    fn mark_bad(&self, marker: BadFileMarker) {
        lock(&self.state).bad_files.push(marker.path);
    }

    fn shutdown(&self) {
        lock(&self.state).shut_down = true;
    }
}

/// Appends records to a JSON Lines file.
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<Option<JsonlWriter<BufWriter<File>>>>,
}

impl JsonlSink {
    /// Open (or create) the store for appending, creating parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!("Opened record store {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Some(JsonlWriter::new(BufWriter::new(file)))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entries: &[StoredEntry]) {
        let mut guard = lock(&self.writer);
        let Some(writer) = guard.as_mut() else {
            tracing::warn!(
                "Record store {:?} is shut down, dropping {} entries",
                self.path,
                entries.len()
            );
            return;
        };
        match writer.write_all(entries).and_then(|written| {
            writer.flush()?;
            Ok(written)
        }) {
            Ok(written) if written < entries.len() => tracing::warn!(
                "{} entries could not be serialized into {:?} and will be hashed again",
                entries.len() - written,
                self.path
            ),
            Ok(_) => {}
            Err(e) => tracing::error!("Failed to write to record store {:?}: {}", self.path, e),
        }
    }
}

impl RecordSink for JsonlSink {
    fn add(&self, records: Vec<HashRecord>) {
        if records.is_empty() {
            return;
        }
        let entries: Vec<StoredEntry> = records.into_iter().map(StoredEntry::Record).collect();
        self.append(&entries);
        tracing::debug!("{} records added to {:?}", entries.len(), self.path);
    }

    fn mark_bad(&self, marker: BadFileMarker) {
        self.append(&[StoredEntry::BadFile(marker)]);
    }

    fn shutdown(&self) {
        if let Some(mut writer) = lock(&self.writer).take() {
            if let Err(e) = writer.flush() {
                tracing::error!("Failed to flush record store {:?}: {}", self.path, e);
            }
            tracing::info!(
                "Record store {:?} closed after {} entries",
                self.path,
                writer.items_written()
            );
        }
    }
}

/// Read every entry of a JSONL store.
///
/// Unparseable lines are skipped and counted in the second tuple element.
/// A missing file reads as empty.
pub fn read_entries(path: &Path) -> io::Result<(Vec<StoredEntry>, usize)> {
    if !path.exists() {
        return Ok((Vec::new(), 0));
    }

    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut skipped = 0;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => skipped += 1,
        }
    }
    Ok((entries, skipped))
}

/// Paths already hashed or marked bad in a store, so rescans can skip them.
pub fn load_known_paths(path: &Path) -> io::Result<HashSet<PathBuf>> {
    let (entries, skipped) = read_entries(path)?;
    if skipped > 0 {
        tracing::warn!(
            "{skipped} lines in {:?} could not be parsed; those images will be hashed again",
            path
        );
    }
    Ok(entries
        .into_iter()
        .map(|entry| entry.path().to_path_buf())
        .collect())
}
