//! Perceptual hashing of decoded images into 64-bit fingerprints.

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;

use crate::config::HashingConfig;
use crate::error::{HashError, HashResult};
use crate::pipeline::decode::ImageLoader;

/// The hasher rejected an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FingerprintError(pub String);

/// Maps a decoded image to a fixed-width fingerprint.
///
/// Implementations must be safe to call from several worker threads at once,
/// either by being stateless or by synchronizing internally.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, image: &DynamicImage) -> Result<u64, FingerprintError>;
}

/// Supported hash algorithms, all producing 64 bits on an 8x8 grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Mean,
    Gradient,
    VertGradient,
}

impl HashAlgorithm {
    /// Parse from the config string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mean" | "phash" => Some(Self::Mean),
            "gradient" => Some(Self::Gradient),
            "vert_gradient" | "vertical_gradient" => Some(Self::VertGradient),
            _ => None,
        }
    }

    fn to_alg(self) -> HashAlg {
        match self {
            Self::Mean => HashAlg::Mean,
            Self::Gradient => HashAlg::Gradient,
            Self::VertGradient => HashAlg::VertGradient,
        }
    }
}

/// Pre-configured `image_hasher` perceptual hasher.
///
/// The hasher is built once and shared, so the DCT context is not rebuilt
/// for every image.
pub struct PerceptualHasher {
    inner: image_hasher::Hasher,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(&HashingConfig::default())
    }
}

impl PerceptualHasher {
    /// Build a hasher from config. Unknown algorithms fall back to mean,
    /// which config validation already rules out.
    pub fn new(config: &HashingConfig) -> Self {
        let alg = HashAlgorithm::parse(&config.algorithm).unwrap_or(HashAlgorithm::Mean);
        let mut builder = HasherConfig::new()
            .hash_alg(alg.to_alg())
            .hash_size(config.hash_size, config.hash_size);
        if config.dct {
            builder = builder.preproc_dct();
        }
        Self {
            inner: builder.to_hasher(),
        }
    }
}

impl Fingerprinter for PerceptualHasher {
    fn fingerprint(&self, image: &DynamicImage) -> Result<u64, FingerprintError> {
        let hash = self.inner.hash_image(image);
        let bytes = hash.as_bytes();
        let word: [u8; 8] = bytes.try_into().map_err(|_| {
            FingerprintError(format!("expected 8 hash bytes, got {}", bytes.len()))
        })?;
        Ok(u64::from_be_bytes(word))
    }
}

/// Fingerprint an image, turning hasher errors and panics into a
/// [`HashError::Hash`] for `origin`.
pub fn fingerprint_image(
    hasher: &dyn Fingerprinter,
    image: &DynamicImage,
    origin: &Path,
) -> HashResult<u64> {
    match catch_unwind(AssertUnwindSafe(|| hasher.fingerprint(image))) {
        Ok(Ok(fingerprint)) => Ok(fingerprint),
        Ok(Err(e)) => Err(HashError::Hash {
            path: origin.to_path_buf(),
            message: e.to_string(),
        }),
        Err(_) => Err(HashError::Hash {
            path: origin.to_path_buf(),
            message: "hasher panicked".to_string(),
        }),
    }
}

/// Load and fingerprint a file on disk.
pub fn hash_file(loader: &ImageLoader, hasher: &dyn Fingerprinter, path: &Path) -> HashResult<u64> {
    let image = loader.load(path)?;
    fingerprint_image(hasher, &image, path)
}

/// Decode and fingerprint an in-memory image.
pub fn hash_bytes(
    loader: &ImageLoader,
    hasher: &dyn Fingerprinter,
    bytes: Vec<u8>,
    origin: &Path,
) -> HashResult<u64> {
    let image = loader.decode_bytes(bytes, origin)?;
    fingerprint_image(hasher, &image, origin)
}

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
