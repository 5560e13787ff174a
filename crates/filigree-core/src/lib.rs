//! Filigree Core - concurrent chunked watermarking engine.
//!
//! Filigree applies a watermark to every image in a directory. Each image is
//! split into contiguous pixel chunks that are blended independently, possibly
//! on different threads, then reassembled and saved exactly once.
//!
//! # Architecture
//!
//! ```text
//! Discover → Load + Chunk → Mark (per chunk) → Reassemble → Save
//! ```
//!
//! The stages are wired into one of several worker topologies (see
//! [`Topology`]); all of them produce identical files.
//!
//! # Usage
//!
//! ```rust,ignore
//! use filigree_core::{Config, Filigree};
//!
//! #[tokio::main]
//! async fn main() -> filigree_core::Result<()> {
//!     let filigree = Filigree::new(Config::load()?)?;
//!     let report = filigree.run("./photos".as_ref(), "./logo.png".as_ref()).await?;
//!     println!("Marked {} image(s)", report.processed);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

// Re-exports for convenient access
pub use config::{Config, Topology};
pub use error::{ConfigError, FiligreeError, PipelineError, PipelineResult, Result};
pub use pipeline::{
    CancelToken, FileCodec, ImageCodec, LoadRequest, Orchestrator, ProgressFn, RunSettings,
};
pub use types::{Channels, PixelBuffer, RunReport, StageStats, StageTimings};

use pipeline::FileDiscovery;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Images discovered for one run, with the directory their results go to.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub requests: Vec<LoadRequest>,
    /// Combined size of the inputs in bytes
    pub total_bytes: u64,
}

impl BatchPlan {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Filigree engine - the main entry point for watermarking a directory.
#[derive(Clone)]
pub struct Filigree {
    config: Config,
    settings: RunSettings,
    codec: Arc<dyn ImageCodec>,
}

impl Filigree {
    /// Create an engine from a configuration. Invalid settings are rejected
    /// here, before any worker thread exists.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let settings = RunSettings::from_config(&config.processing)?;
        tracing::debug!("Initializing Filigree v{}", VERSION);
        Ok(Self {
            config,
            settings,
            codec: Arc::new(FileCodec::new()),
        })
    }

    /// Replace the file codec, e.g. with an in-memory one.
    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Decode the watermark. Unlike input images, a watermark that cannot be
    /// decoded stops the run.
    pub fn load_watermark(&self, path: &Path) -> Result<Arc<PixelBuffer>> {
        let watermark = self.codec.decode(&config::expand_path(path))?;
        tracing::debug!(
            "Watermark {:?}: {}x{}, {} channel(s)",
            path,
            watermark.width(),
            watermark.height(),
            watermark.channels().count()
        );
        Ok(Arc::new(watermark))
    }

    /// Discover the images in `source_dir` and create the output directory.
    pub fn plan(&self, source_dir: &Path) -> Result<BatchPlan> {
        let source_dir = config::expand_path(source_dir);
        if !source_dir.is_dir() {
            return Err(FiligreeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source directory not found: {}", source_dir.display()),
            )));
        }

        let output_dir = self.config.output_dir(&source_dir);
        std::fs::create_dir_all(&output_dir)?;

        let files = FileDiscovery::new(&self.config.processing.supported_formats)
            .discover(&source_dir);
        let total_bytes = FileDiscovery::total_size(&files);
        let requests = files
            .into_iter()
            .filter_map(|file| {
                let name = file.path.file_name()?.to_owned();
                Some(LoadRequest {
                    output: output_dir.join(name),
                    source: file.path,
                })
            })
            .collect::<Vec<_>>();

        tracing::info!(
            "Found {} image(s) ({:.1} MB) in {:?}",
            requests.len(),
            total_bytes as f64 / 1_048_576.0,
            source_dir
        );
        Ok(BatchPlan {
            source_dir,
            output_dir,
            requests,
            total_bytes,
        })
    }

    /// Run a planned batch on the calling thread. Blocks until every image has
    /// settled or the token is cancelled.
    pub fn execute(
        &self,
        plan: BatchPlan,
        watermark: Arc<PixelBuffer>,
        cancel: CancelToken,
        progress: Option<ProgressFn>,
    ) -> RunReport {
        let mut orchestrator = Orchestrator::new(self.settings, Arc::clone(&self.codec), watermark)
            .with_cancel(cancel);
        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }
        orchestrator.run(plan.requests)
    }

    /// Watermark every image in `source_dir`.
    ///
    /// The engine runs on the blocking thread pool so callers on an async
    /// runtime are not stalled.
    pub async fn run(&self, source_dir: &Path, watermark: &Path) -> Result<RunReport> {
        self.run_with(source_dir, watermark, CancelToken::new(), None)
            .await
    }

    /// Like [`Filigree::run`], with cancellation and progress reporting.
    pub async fn run_with(
        &self,
        source_dir: &Path,
        watermark: &Path,
        cancel: CancelToken,
        progress: Option<ProgressFn>,
    ) -> Result<RunReport> {
        let watermark = self.load_watermark(watermark)?;
        let plan = self.plan(source_dir)?;

        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.execute(plan, watermark, cancel, progress))
            .await
            .map_err(|e| FiligreeError::Join(e.to_string()))
    }
}
