//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Local worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of batches in flight (queued or running)
    pub max_queue_size: usize,

    /// Number of hashing workers; 0 picks `max(1, cores - 1)`
    pub workers: usize,

    /// Paths per batch when the CLI feeds the pool
    pub batch_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 200,
            workers: 0,
            batch_size: 20,
        }
    }
}

impl PoolConfig {
    /// Resolve the worker count, leaving one core free for the submitting side.
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.saturating_sub(1).max(1)
    }
}

/// Perceptual hash settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Hash algorithm: "mean", "gradient" or "vert_gradient"
    pub algorithm: String,

    /// Apply a DCT before hashing (classic pHash when combined with "mean")
    pub dct: bool,

    /// Hash edge length; 8x8 yields the 64-bit fingerprint
    pub hash_size: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            algorithm: "mean".to_string(),
            dct: true,
            hash_size: 8,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
        }
    }
}

/// Directory scanning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// File extensions treated as images
    pub supported_formats: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            supported_formats: ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Distributed hashing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Address hash requests are published to
    pub request_address: String,

    /// Address hash results are published to
    pub result_address: String,

    /// Number of consumers draining the request address
    pub consumers: usize,

    /// Messages a single consumer handles at once
    pub consumer_concurrency: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            request_address: "hash_request".to_string(),
            result_address: "hash_result".to_string(),
            consumers: 2,
            consumer_concurrency: 4,
        }
    }
}

/// Record store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSONL file hash records and bad files are appended to
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.simage/hashes.jsonl"),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
