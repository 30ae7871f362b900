//! Image loading with format detection and size limits.
//!
//! Everything here is synchronous: callers run it on a blocking thread, never
//! on an async worker.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::{HashError, HashResult};

/// Reads and decodes images under configurable limits.
#[derive(Debug, Clone, Default)]
pub struct ImageLoader {
    limits: LimitsConfig,
}

impl ImageLoader {
    /// Create a new loader with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read an image file and decode it.
    pub fn load(&self, path: &Path) -> HashResult<DynamicImage> {
        let bytes = self.read(path)?;
        self.decode_bytes(bytes, path)
    }

    /// Read raw file bytes after checking the size limit.
    pub fn read(&self, path: &Path) -> HashResult<Vec<u8>> {
        let metadata = std::fs::metadata(path).map_err(|e| HashError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(HashError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        std::fs::read(path).map_err(|e| HashError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Decode an in-memory image.
    ///
    /// `origin` labels errors; for remote requests it is a synthetic path
    /// naming the tracking id. The format is sniffed from content first and
    /// only then guessed from the extension.
    pub fn decode_bytes(&self, bytes: Vec<u8>, origin: &Path) -> HashResult<DynamicImage> {
        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| HashError::Decode {
                path: origin.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;

        if reader.format().is_none() {
            let format =
                ImageFormat::from_path(origin).map_err(|_| HashError::UnsupportedFormat {
                    path: origin.to_path_buf(),
                    format: origin
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or("unknown")
                        .to_string(),
                })?;
            reader.set_format(format);
        }

        let image = reader.decode().map_err(|e| HashError::Decode {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(HashError::ImageTooLarge {
                path: origin.to_path_buf(),
                width,
                height,
                max_dim: self.limits.max_image_dimension,
            });
        }

        Ok(image)
    }
}
