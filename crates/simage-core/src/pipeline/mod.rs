//! Per-image stages of the hashing engine.
//!
//! - **discovery**: find candidate image files and batch them
//! - **decode**: read and decode images under size limits
//! - **hash**: turn a decoded image into a 64-bit perceptual fingerprint

pub mod decode;
pub mod discovery;
pub mod hash;

pub use decode::ImageLoader;
pub use discovery::{exclude_known, into_batches, DiscoveredFile, FileDiscovery};
pub use hash::{
    fingerprint_image, hamming_distance, hash_bytes, hash_file, FingerprintError, Fingerprinter,
    HashAlgorithm, PerceptualHasher,
};
