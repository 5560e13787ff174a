//! The load, mark and save stages and the counters they share.
//!
//! Stages are plain structs built once per run with their collaborators
//! injected (codec, watermark, counters). Every topology drives the same three
//! stages; only the threading around them differs.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{PixelBuffer, StageStats, StageTimings};

use super::blend::{blend_segment, BlendParams};
use super::codec::ImageCodec;
use super::tracker::{ChunkTask, ImageJob, MarkedImage};

/// Callback invoked with the number of settled images each time one settles.
pub type ProgressFn = Arc<dyn Fn(usize) + Send + Sync>;

/// Run-wide counters, shared by every worker.
#[derive(Default)]
pub struct RunCounters {
    pub processed: AtomicUsize,
    pub decode_failures: AtomicUsize,
    pub encode_failures: AtomicUsize,
    pub incomplete: AtomicUsize,
    pub chunks_marked: AtomicUsize,
    settled: AtomicUsize,
    progress: Option<ProgressFn>,
}

impl RunCounters {
    pub fn with_progress(progress: ProgressFn) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    fn settle(&self) {
        let settled = self.settled.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &self.progress {
            progress(settled);
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.settle();
    }

    pub fn record_incomplete(&self) {
        self.incomplete.fetch_add(1, Ordering::SeqCst);
        self.settle();
    }

    /// Log a per-image failure and count it under its stage.
    pub fn record_failure(&self, err: &PipelineError) {
        tracing::error!("Failed: {}", err);
        match err {
            PipelineError::Decode { .. } | PipelineError::Unsupported { .. } => {
                self.decode_failures.fetch_add(1, Ordering::SeqCst);
            }
            PipelineError::Encode { .. } => {
                self.encode_failures.fetch_add(1, Ordering::SeqCst);
            }
            PipelineError::Incomplete { .. } => {
                self.incomplete.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.settle();
    }

    /// Images that reached a final state (saved or failed).
    pub fn settled(&self) -> usize {
        self.settled.load(Ordering::SeqCst)
    }
}

/// An input image and where its watermarked copy goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Decodes an image and cuts it into chunk tasks.
pub struct Loader {
    codec: Arc<dyn ImageCodec>,
    chunks: NonZeroUsize,
    counters: Arc<RunCounters>,
}

impl Loader {
    pub fn new(codec: Arc<dyn ImageCodec>, chunks: NonZeroUsize, counters: Arc<RunCounters>) -> Self {
        Self {
            codec,
            chunks,
            counters,
        }
    }

    /// Decode `request.source` and return one task per chunk. On failure no
    /// task exists for the image, so no tracker is left waiting.
    pub fn load(&self, request: LoadRequest) -> PipelineResult<Vec<ChunkTask>> {
        let image = self.codec.decode(&request.source)?;
        tracing::trace!(
            "Loaded {:?} ({}x{}, {} channel(s))",
            request.source,
            image.width(),
            image.height(),
            image.channels().count()
        );
        Ok(ImageJob::dispatch(
            request.source,
            request.output,
            image,
            self.chunks,
            Arc::clone(&self.counters),
        ))
    }
}

/// Blends the watermark into chunk tasks.
pub struct Marker {
    watermark: Arc<PixelBuffer>,
    params: BlendParams,
    counters: Arc<RunCounters>,
}

impl Marker {
    pub fn new(watermark: Arc<PixelBuffer>, params: BlendParams, counters: Arc<RunCounters>) -> Self {
        Self {
            watermark,
            params,
            counters,
        }
    }

    /// Mark one chunk. Returns the whole image only when this chunk was the
    /// last one of its image to finish.
    pub fn mark(&self, mut task: ChunkTask) -> Option<MarkedImage> {
        let chunk = *task.chunk();
        let channels = task.job().channels();
        blend_segment(
            task.segment_mut(),
            &chunk,
            channels,
            &self.watermark,
            &self.params,
        );
        self.counters.chunks_marked.fetch_add(1, Ordering::SeqCst);
        task.finish()
    }
}

/// Persists marked images.
pub struct Saver {
    codec: Arc<dyn ImageCodec>,
    counters: Arc<RunCounters>,
}

impl Saver {
    pub fn new(codec: Arc<dyn ImageCodec>, counters: Arc<RunCounters>) -> Self {
        Self { codec, counters }
    }

    /// Encode the image to its output path. The buffer is released either way;
    /// on error the caller records the failure.
    pub fn save(&self, mut image: MarkedImage) -> PipelineResult<()> {
        image.claim();
        self.codec.encode(&image.pixels, &image.output)?;
        tracing::debug!("Saved {:?}", image.output);
        self.counters.record_processed();
        Ok(())
    }
}

/// The three stages of a run plus their shared counters.
pub struct Stages {
    pub loader: Loader,
    pub marker: Marker,
    pub saver: Saver,
    pub counters: Arc<RunCounters>,
}

impl Stages {
    pub fn new(
        codec: Arc<dyn ImageCodec>,
        watermark: Arc<PixelBuffer>,
        chunks: NonZeroUsize,
        params: BlendParams,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self {
            loader: Loader::new(Arc::clone(&codec), chunks, Arc::clone(&counters)),
            marker: Marker::new(watermark, params, Arc::clone(&counters)),
            saver: Saver::new(codec, Arc::clone(&counters)),
            counters,
        }
    }

    /// Timed load; failures are counted and yield no tasks.
    pub fn load(&self, request: LoadRequest, stats: &mut StageStats) -> Vec<ChunkTask> {
        match timed(stats, || self.loader.load(request)) {
            Ok(tasks) => tasks,
            Err(e) => {
                self.counters.record_failure(&e);
                Vec::new()
            }
        }
    }

    /// Timed mark.
    pub fn mark(&self, task: ChunkTask, stats: &mut StageStats) -> Option<MarkedImage> {
        timed(stats, || self.marker.mark(task))
    }

    /// Timed save; failures are counted.
    pub fn save(&self, image: MarkedImage, stats: &mut StageStats) {
        if let Err(e) = timed(stats, || self.saver.save(image)) {
            self.counters.record_failure(&e);
        }
    }

    /// Run one image through load, mark and save on the calling thread.
    pub fn run_pipe(&self, request: LoadRequest, timings: &mut StageTimings) {
        let mut marked = None;
        for task in self.load(request, &mut timings.load) {
            if let Some(image) = self.mark(task, &mut timings.mark) {
                marked = Some(image);
            }
        }
        if let Some(image) = marked {
            self.save(image, &mut timings.save);
        }
    }
}

fn timed<R>(stats: &mut StageStats, f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let result = f();
    stats.record(start.elapsed());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::MemoryCodec;
    use crate::types::Channels;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn stages(codec: Arc<MemoryCodec>, chunks: usize) -> Stages {
        let params = BlendParams {
            intensity: crate::pipeline::blend::Intensity::new(0.5).unwrap(),
            background_threshold: Some(500),
        };
        Stages::new(
            codec,
            Arc::new(PixelBuffer::filled(2, 2, Channels::Gray, 100)),
            nz(chunks),
            params,
            Arc::new(RunCounters::default()),
        )
    }

    fn request(name: &str) -> LoadRequest {
        LoadRequest {
            source: PathBuf::from(name),
            output: PathBuf::from(format!("out/{name}")),
        }
    }

    #[test]
    fn test_run_pipe_marks_and_saves() {
        let codec = Arc::new(MemoryCodec::new());
        codec.insert("a.png", PixelBuffer::filled(4, 4, Channels::Gray, 0));
        let stages = stages(Arc::clone(&codec), 4);

        let mut timings = StageTimings::default();
        stages.run_pipe(request("a.png"), &mut timings);

        let saved = codec.saved("out/a.png").unwrap();
        assert!(saved.as_bytes().iter().all(|&v| v == 50));
        assert_eq!(stages.counters.processed.load(Ordering::SeqCst), 1);
        assert_eq!(stages.counters.chunks_marked.load(Ordering::SeqCst), 4);
        assert_eq!(stages.counters.incomplete.load(Ordering::SeqCst), 0);
        assert_eq!(stages.counters.settled(), 1);
        assert_eq!(timings.load.count, 1);
        assert_eq!(timings.mark.count, 4);
        assert_eq!(timings.save.count, 1);
    }

    #[test]
    fn test_decode_failure_is_counted_not_fatal() {
        let codec = Arc::new(MemoryCodec::new());
        let stages = stages(Arc::clone(&codec), 2);

        let mut timings = StageTimings::default();
        stages.run_pipe(request("missing.png"), &mut timings);

        assert_eq!(stages.counters.decode_failures.load(Ordering::SeqCst), 1);
        assert_eq!(stages.counters.processed.load(Ordering::SeqCst), 0);
        assert_eq!(stages.counters.settled(), 1);
        assert_eq!(timings.mark.count, 0);
    }

    #[test]
    fn test_encode_failure_is_counted() {
        let codec = Arc::new(MemoryCodec::new());
        codec.insert("a.png", PixelBuffer::filled(3, 3, Channels::Rgb, 7));
        codec.fail_encode("out/a.png");
        let stages = stages(Arc::clone(&codec), 3);

        stages.run_pipe(request("a.png"), &mut StageTimings::default());

        assert_eq!(stages.counters.encode_failures.load(Ordering::SeqCst), 1);
        assert_eq!(stages.counters.processed.load(Ordering::SeqCst), 0);
        assert_eq!(stages.counters.incomplete.load(Ordering::SeqCst), 0);
        assert_eq!(stages.counters.settled(), 1);
        assert!(codec.saved("out/a.png").is_none());
    }

    #[test]
    fn test_progress_reports_each_settled_image() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counters = {
            let seen = Arc::clone(&seen);
            RunCounters::with_progress(Arc::new(move |n| {
                seen.store(n, Ordering::SeqCst);
            }))
        };
        counters.record_processed();
        counters.record_failure(&PipelineError::Encode {
            path: PathBuf::from("x.png"),
            message: "disk full".into(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(counters.encode_failures.load(Ordering::SeqCst), 1);
    }
}
