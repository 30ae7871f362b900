//! Error types for the simage hashing engine.
//!
//! Errors are grouped by the component that raises them so callers can tell a
//! per-image failure (recoverable) apart from a closed pool (caller error) or a
//! malformed message.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for simage operations.
#[derive(Error, Debug)]
pub enum SimageError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-image hashing errors
    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    /// Worker pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// Message protocol and transport errors
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Failure to turn one image into a fingerprint.
///
/// Every variant is scoped to a single image: it is logged and recorded as a
/// bad file, never allowed to abort the surrounding batch or message.
#[derive(Error, Debug)]
pub enum HashError {
    /// The file could not be read
    #[error("Could not load file {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// The bytes could not be decoded as an image
    #[error("Unable to decode image {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Neither content sniffing nor the extension identified a format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// The perceptual hasher rejected the decoded image
    #[error("Failed to hash image {path}: {message}")]
    Hash { path: PathBuf, message: String },
}

impl HashError {
    /// Path of the image that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            HashError::Io { path, .. }
            | HashError::Decode { path, .. }
            | HashError::UnsupportedFormat { path, .. }
            | HashError::FileTooLarge { path, .. }
            | HashError::ImageTooLarge { path, .. }
            | HashError::Hash { path, .. } => path,
        }
    }
}

/// Errors reported synchronously by the local worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool has been shut down and accepts no more batches
    #[error("Cannot add jobs to a pool that has been shut down")]
    Closed,
}

/// Errors raised while building, reading, or moving correlated messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// A required message property is absent
    #[error("Message is missing property '{name}'")]
    MissingProperty { name: String },

    /// A message property holds a value of the wrong type
    #[error("Message property '{name}' is not of type {expected}")]
    PropertyType { name: String, expected: String },

    /// The address has no live queue behind it
    #[error("Transport closed for address '{address}'")]
    TransportClosed { address: String },
}

/// Convenience type alias for simage results.
pub type Result<T> = std::result::Result<T, SimageError>;

/// Convenience type alias for per-image hashing results.
pub type HashResult<T> = std::result::Result<T, HashError>;
