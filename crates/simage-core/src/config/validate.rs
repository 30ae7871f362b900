//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::pipeline::hash::HashAlgorithm;

use super::Config;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_queue_size == 0 {
            return Err(ConfigError::ValidationError(
                "pool.max_queue_size must be > 0".into(),
            ));
        }
        if self.pool.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "pool.batch_size must be > 0".into(),
            ));
        }
        if HashAlgorithm::parse(&self.hashing.algorithm).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "hashing.algorithm '{}' is not one of mean, gradient, vert_gradient",
                self.hashing.algorithm
            )));
        }
        // Fingerprints are stored as u64, so the hash grid must be exactly 8x8.
        if self.hashing.hash_size != 8 {
            return Err(ConfigError::ValidationError(
                "hashing.hash_size must be 8 (64-bit fingerprints)".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.messaging.request_address.is_empty() || self.messaging.result_address.is_empty() {
            return Err(ConfigError::ValidationError(
                "messaging addresses must not be empty".into(),
            ));
        }
        if self.messaging.request_address == self.messaging.result_address {
            return Err(ConfigError::ValidationError(
                "messaging.request_address and messaging.result_address must differ".into(),
            ));
        }
        if self.messaging.consumers == 0 || self.messaging.consumer_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "messaging.consumers and messaging.consumer_concurrency must be > 0".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_queue_size() {
        let mut config = Config::default();
        config.pool.max_queue_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_queue_size"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.pool.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_rejects_unknown_algorithm() {
        let mut config = Config::default();
        config.hashing.algorithm = "wavelet".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("wavelet"));
    }

    #[test]
    fn test_validate_rejects_non_64_bit_hash() {
        let mut config = Config::default();
        config.hashing.hash_size = 16;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hash_size"));
    }

    #[test]
    fn test_validate_rejects_shared_address() {
        let mut config = Config::default();
        config.messaging.result_address = config.messaging.request_address.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.level = "WARN".into();
        assert!(config.validate().is_ok());

        config.logging.level = "loud".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_validate_rejects_zero_consumers() {
        let mut config = Config::default();
        config.messaging.consumers = 0;
        assert!(config.validate().is_err());
    }
}
