//! simage core - perceptual hash computation engine.
//!
//! Turns image files into 64-bit perceptual fingerprints, either on a local
//! bounded worker pool or by offloading to remote consumers over a message
//! transport. Finished fingerprints go to a [`RecordSink`].
//!
//! # Architecture
//!
//! ```text
//! paths → HashJobBatch → HashWorkerPool (job tickets) → HashJob → RecordSink
//!
//! path → HashRequestProducer → [request address] → HashRequestConsumer
//!                 ↑                                        │
//!                 └──────────── [result address] ←─────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use simage_core::{Config, HashJobBatch, HashWorkerPool, MemorySink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> simage_core::Result<()> {
//!     let config = Config::load()?;
//!     let sink = Arc::new(MemorySink::new());
//!     let pool = HashWorkerPool::new(&config, sink.clone());
//!
//!     pool.submit(HashJobBatch::new(vec!["./cat.jpg".into()])).await?;
//!     pool.wait_idle().await;
//!     pool.shutdown().await;
//!     println!("{:?}", sink.records());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod messaging;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod sink;
pub mod types;

pub use config::Config;
pub use error::{
    ConfigError, HashError, HashResult, MessagingError, PoolError, Result, SimageError,
};
pub use messaging::{
    HashOutcome, HashRequest, HashRequestConsumer, HashRequestProducer, HashResponse, InMemoryBus,
    Message, MessageTransport, TrackingId,
};
pub use output::JsonlWriter;
pub use pipeline::{FileDiscovery, Fingerprinter, ImageLoader, PerceptualHasher};
pub use pool::{BufferLevelObserver, HashWorkerPool, ObserverId, PoolSummary};
pub use sink::{load_known_paths, JsonlSink, MemorySink, RecordSink};
pub use types::{BadFileMarker, HashJobBatch, HashRecord, StoredEntry};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
