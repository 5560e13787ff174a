//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::{Config, MAX_CHUNKS};

/// Largest meaningful background threshold: three saturated 8-bit channels.
const MAX_CHANNEL_SUM: u16 = 3 * 255;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    ///
    /// Out-of-range intensity is not an error: it falls back to the default
    /// with a warning when the intensity is resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.workers must be > 0".into(),
            ));
        }
        if self.processing.chunks == Some(0) {
            return Err(ConfigError::ValidationError(
                "processing.chunks must be > 0".into(),
            ));
        }
        if self.processing.effective_chunks() > MAX_CHUNKS {
            return Err(ConfigError::ValidationError(format!(
                "processing.chunks must be between 1 and {MAX_CHUNKS}"
            )));
        }
        if self.processing.background_threshold > MAX_CHANNEL_SUM {
            return Err(ConfigError::ValidationError(format!(
                "processing.background_threshold must be between 0 and {MAX_CHANNEL_SUM}"
            )));
        }
        if self.processing.supported_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.supported_formats must not be empty".into(),
            ));
        }
        if self.output.subdir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output.subdir must not be empty".into(),
            ));
        }
        Ok(())
    }
}
