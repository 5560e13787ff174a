//! Error types for the Filigree watermarking pipeline.
//!
//! Errors are organized by stage so a failure on one image can be reported
//! with its path and recovered locally, while configuration problems stop the
//! run before any worker is spawned.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Filigree operations.
#[derive(Error, Debug)]
pub enum FiligreeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking engine thread panicked or was aborted
    #[error("Engine task failed: {0}")]
    Join(String),
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

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image (or watermark) decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Persisting a watermarked image failed
    #[error("Encode error for {path}: {message}")]
    Encode { path: PathBuf, message: String },

    /// At least one chunk of the image was dropped before it was marked
    #[error("Image {path} was abandoned with {missing} unmarked chunk(s)")]
    Incomplete { path: PathBuf, missing: usize },

    /// Unsupported image layout (e.g. zero-sized buffer)
    #[error("Unsupported image for {path}: {message}")]
    Unsupported { path: PathBuf, message: String },
}

impl PipelineError {
    /// Path of the image the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            PipelineError::Decode { path, .. }
            | PipelineError::Encode { path, .. }
            | PipelineError::Incomplete { path, .. }
            | PipelineError::Unsupported { path, .. } => path,
        }
    }
}

/// Convenience type alias for Filigree results.
pub type Result<T> = std::result::Result<T, FiligreeError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
