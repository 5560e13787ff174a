//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::pipeline::blend::{BlendParams, Intensity};

/// Intensity used when the configured percentage is outside `0..=100`.
pub const DEFAULT_INTENSITY: f32 = 0.3;

/// Default watermark background threshold (sum of the three RGB channels).
pub const DEFAULT_BACKGROUND_THRESHOLD: u16 = 500;

/// Upper bound on chunks per image. Each chunk costs a task and a tracker
/// slot per image, so larger counts only add overhead.
pub const MAX_CHUNKS: usize = 1 << 16;

/// Worker arrangement used to connect the load, mark and save stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// One thread, one image at a time.
    Sequential,
    /// One shared queue per stage boundary, a thread pool per stage.
    StagedPool,
    /// Each worker owns a private load → mark → save pipe.
    FarmOfPipes,
    /// Load, mark and save farms chained into one pipeline.
    #[default]
    PipeOfFarms,
}

impl Topology {
    /// All topologies, in the order they are documented.
    pub const ALL: [Topology; 4] = [
        Topology::Sequential,
        Topology::StagedPool,
        Topology::FarmOfPipes,
        Topology::PipeOfFarms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Sequential => "sequential",
            Topology::StagedPool => "staged-pool",
            Topology::FarmOfPipes => "farm-of-pipes",
            Topology::PipeOfFarms => "pipe-of-farms",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topology::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown topology '{s}'"))
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Worker topology
    pub topology: Topology,

    /// Number of worker threads per stage (or pipes, for farm-of-pipes)
    pub workers: usize,

    /// Chunks per image; defaults to the worker count when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,

    /// Watermark intensity in percent, 0 (transparent) to 100 (opaque)
    pub intensity: i64,

    /// RGB channel sum at or above which a watermark pixel counts as
    /// background and is skipped; 0 disables the rule
    pub background_threshold: u16,

    /// Supported input extensions
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            workers: 4,
            chunks: None,
            intensity: 30,
            background_threshold: DEFAULT_BACKGROUND_THRESHOLD,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "bmp".to_string(),
                "tif".to_string(),
                "tiff".to_string(),
                "webp".to_string(),
            ],
        }
    }
}

impl ProcessingConfig {
    /// Chunks per image after applying the worker-count default.
    pub fn effective_chunks(&self) -> usize {
        self.chunks.unwrap_or(self.workers)
    }

    /// Blend parameters for this run. An out-of-range intensity falls back
    /// to [`DEFAULT_INTENSITY`] with a warning.
    pub fn blend_params(&self) -> BlendParams {
        BlendParams {
            intensity: Intensity::from_percent(self.intensity),
            background_threshold: self.background_threshold(),
        }
    }

    /// Background threshold, `None` when the rule is disabled.
    pub fn background_threshold(&self) -> Option<u16> {
        (self.background_threshold > 0).then_some(self.background_threshold)
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Subdirectory of the source directory receiving watermarked copies
    pub subdir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            subdir: "watermarked".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,

    /// Log format (pretty, json)
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
