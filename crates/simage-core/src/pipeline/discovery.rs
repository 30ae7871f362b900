//! Finding images to hash and cutting them into batches.
//!
//! The engine only consumes paths; this walker is the producer the CLI uses.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::types::HashJobBatch;

/// A candidate image found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// Walks files and directories for images with a supported extension.
pub struct FileDiscovery {
    extensions: HashSet<String>,
}

impl FileDiscovery {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            extensions: config
                .supported_formats
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        }
    }

    /// Every supported image at `root`, sorted by path.
    ///
    /// A file root yields itself if supported. Directories are walked
    /// recursively, following symlinks; unreadable entries are skipped.
    pub fn discover(&self, root: &Path) -> Vec<DiscoveredFile> {
        let mut files: Vec<DiscoveredFile> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: entry.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Discovered {} images under {:?}", files.len(), root);
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    pub fn total_size(files: &[DiscoveredFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}

/// Drop files whose path is already in the record store.
pub fn exclude_known(files: Vec<DiscoveredFile>, known: &HashSet<PathBuf>) -> Vec<DiscoveredFile> {
    if known.is_empty() {
        return files;
    }
    let before = files.len();
    let remaining: Vec<DiscoveredFile> = files
        .into_iter()
        .filter(|file| !known.contains(&file.path))
        .collect();
    tracing::info!("Skipping {} already hashed images", before - remaining.len());
    remaining
}

/// Split paths into batches of at most `batch_size`, keeping their order.
pub fn into_batches(paths: Vec<PathBuf>, batch_size: usize) -> Vec<HashJobBatch> {
    paths
        .chunks(batch_size.max(1))
        .map(|chunk| HashJobBatch::new(chunk.to_vec()))
        .collect()
}
