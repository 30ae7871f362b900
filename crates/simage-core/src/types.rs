//! Core data types produced and consumed by the hashing engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A perceptual fingerprint for one image.
///
/// Produced by both the local pool and the distributed path, and identified
/// by `path`. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashRecord {
    /// Path of the hashed image
    pub path: PathBuf,

    /// 64-bit perceptual hash
    pub fingerprint: u64,
}

impl HashRecord {
    pub fn new(path: impl Into<PathBuf>, fingerprint: u64) -> Self {
        Self {
            path: path.into(),
            fingerprint,
        }
    }
}

/// Marks a path that failed to decode or hash, so later scans skip it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BadFileMarker {
    /// Path of the unreadable image
    pub path: PathBuf,
}

impl BadFileMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// An ordered list of image paths submitted to the pool together.
///
/// The batch, not the image, is the unit of admission control: one job
/// ticket covers every path in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashJobBatch {
    paths: Vec<PathBuf>,
}

impl HashJobBatch {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

impl From<Vec<PathBuf>> for HashJobBatch {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self::new(paths)
    }
}

impl FromIterator<PathBuf> for HashJobBatch {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// One line of the JSONL record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoredEntry {
    /// A successfully hashed image
    Record(HashRecord),
    /// An image that could not be hashed
    BadFile(BadFileMarker),
}

impl StoredEntry {
    pub fn path(&self) -> &Path {
        match self {
            StoredEntry::Record(record) => &record.path,
            StoredEntry::BadFile(marker) => &marker.path,
        }
    }
}
