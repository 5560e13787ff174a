//! Run orchestration: wires the stages into one of the worker topologies.
//!
//! ```text
//! sequential      load → mark* → save                      (calling thread)
//! staged-pool     [loads] → W loaders → [marks] → W markers → [saves] → W savers
//! farm-of-pipes   emitter ⇒ W × (load → mark* → save)
//! pipe-of-farms   emitter ⇒ W loaders ⇒ W markers ⇒ W savers
//! ```
//!
//! `[q]` is a queue shared by a stage pool, `⇒` a round-robin hand-off into
//! per-worker lanes. Every topology produces the same output files.

mod farm;
mod sequential;
mod staged;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crate::config::{ProcessingConfig, Topology, MAX_CHUNKS};
use crate::error::ConfigError;
use crate::types::{PixelBuffer, RunReport, StageTimings};

use super::blend::BlendParams;
use super::cancel::CancelToken;
use super::codec::ImageCodec;
use super::queue::{Cancellable, WorkQueue};
use super::stages::{LoadRequest, ProgressFn, RunCounters, Stages};

/// How often the cancellation watcher re-checks whether the run has finished.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Resolved, validated settings for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub topology: Topology,
    pub workers: NonZeroUsize,
    pub chunks: NonZeroUsize,
    pub blend: BlendParams,
}

impl RunSettings {
    /// Resolve settings from the processing config. Zero workers, or a chunk
    /// count outside `1..=MAX_CHUNKS`, is rejected here before any thread exists.
    pub fn from_config(config: &ProcessingConfig) -> Result<Self, ConfigError> {
        let workers = NonZeroUsize::new(config.workers).ok_or_else(|| {
            ConfigError::ValidationError("processing.workers must be > 0".into())
        })?;
        let chunks = NonZeroUsize::new(config.effective_chunks())
            .filter(|n| n.get() <= MAX_CHUNKS)
            .ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "processing.chunks must be between 1 and {MAX_CHUNKS}"
                ))
            })?;
        Ok(Self {
            topology: config.topology,
            workers,
            chunks,
            blend: config.blend_params(),
        })
    }
}

/// Runs batches of images through the configured topology.
pub struct Orchestrator {
    settings: RunSettings,
    codec: Arc<dyn ImageCodec>,
    watermark: Arc<PixelBuffer>,
    cancel: CancelToken,
    progress: Option<ProgressFn>,
}

impl Orchestrator {
    pub fn new(settings: RunSettings, codec: Arc<dyn ImageCodec>, watermark: Arc<PixelBuffer>) -> Self {
        Self {
            settings,
            codec,
            watermark,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    /// Use an externally controlled cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report the number of settled images as the run progresses.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Mark every requested image. Per-image failures are counted in the
    /// report; the run itself always completes.
    pub fn run(&self, requests: Vec<LoadRequest>) -> RunReport {
        let counters = Arc::new(match &self.progress {
            Some(progress) => RunCounters::with_progress(Arc::clone(progress)),
            None => RunCounters::default(),
        });
        let stages = Stages::new(
            Arc::clone(&self.codec),
            Arc::clone(&self.watermark),
            self.settings.chunks,
            self.settings.blend,
            Arc::clone(&counters),
        );

        let discovered = requests.len();
        let RunSettings {
            topology,
            workers,
            chunks,
            ..
        } = self.settings;
        tracing::info!(
            "Marking {} image(s): topology={}, workers={}, chunks={}",
            discovered,
            topology,
            workers,
            chunks
        );

        let start = Instant::now();
        let stage_timings = match topology {
            Topology::Sequential => sequential::run(&stages, requests, &self.cancel),
            Topology::StagedPool => staged::run(&stages, workers, requests, &self.cancel),
            Topology::FarmOfPipes => farm::run_farm_of_pipes(&stages, workers, requests, &self.cancel),
            Topology::PipeOfFarms => farm::run_pipe_of_farms(&stages, workers, requests, &self.cancel),
        };
        let elapsed = start.elapsed();
        let cancelled = self.cancel.is_cancelled();

        // Requests stranded in the lane of a panicked worker never settle.
        let unsettled = discovered.saturating_sub(counters.settled());
        if unsettled > 0 && !cancelled {
            tracing::warn!("{} image(s) never reached a final state", unsettled);
            counters.incomplete.fetch_add(unsettled, Ordering::SeqCst);
        }

        let report = RunReport {
            topology,
            workers: workers.get(),
            chunks: chunks.get(),
            discovered,
            processed: counters.processed.load(Ordering::SeqCst),
            decode_failures: counters.decode_failures.load(Ordering::SeqCst),
            encode_failures: counters.encode_failures.load(Ordering::SeqCst),
            incomplete: counters.incomplete.load(Ordering::SeqCst),
            chunks_marked: counters.chunks_marked.load(Ordering::SeqCst),
            cancelled,
            elapsed_ms: elapsed.as_millis() as u64,
            stages: stage_timings,
        };

        if cancelled {
            tracing::warn!(
                "Run cancelled after {:?}: {} saved, {} failed",
                elapsed,
                report.processed,
                report.failed()
            );
        } else {
            tracing::info!(
                "Run finished in {:?}: {} saved, {} failed",
                elapsed,
                report.processed,
                report.failed()
            );
        }
        report
    }
}

/// Pop the next item unless the run has been cancelled.
fn pull<T>(queue: &WorkQueue<T>, cancel: &CancelToken) -> Option<T> {
    if cancel.is_cancelled() {
        None
    } else {
        queue.pop()
    }
}

/// Runs `on_last` when the last live worker of a stage exits, including
/// by unwinding, so the next stage always sees its end-of-stream.
struct StageExit<'a, F: FnOnce()> {
    live: &'a AtomicUsize,
    on_last: Option<F>,
}

impl<'a, F: FnOnce()> StageExit<'a, F> {
    fn new(live: &'a AtomicUsize, on_last: F) -> Self {
        Self {
            live,
            on_last: Some(on_last),
        }
    }
}

impl<F: FnOnce()> Drop for StageExit<'_, F> {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            if let Some(on_last) = self.on_last.take() {
                on_last();
            }
        }
    }
}

/// Cancel every queue of the run as soon as the token fires. Exits once
/// `finished` is set.
fn watch_cancel<'scope, 'env>(
    scope: &'scope Scope<'scope, 'env>,
    cancel: &'env CancelToken,
    finished: &'env AtomicBool,
    queues: Vec<&'env dyn Cancellable>,
) {
    scope.spawn(move || {
        while !finished.load(Ordering::Acquire) {
            if cancel.wait_timeout(CANCEL_POLL) {
                tracing::warn!("Cancellation requested, dropping queued work");
                for queue in &queues {
                    queue.cancel();
                }
                return;
            }
        }
    });
}

/// Join workers and merge their timings. A panicked worker is logged; the
/// images it held are reported through their trackers.
fn join_workers(handles: Vec<ScopedJoinHandle<'_, StageTimings>>) -> StageTimings {
    let mut timings = StageTimings::default();
    for handle in handles {
        match handle.join() {
            Ok(worker) => timings.merge(&worker),
            Err(_) => tracing::error!("Pipeline worker panicked"),
        }
    }
    timings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::blend::Intensity;
    use crate::pipeline::testing::MemoryCodec;
    use crate::types::Channels;
    use std::path::PathBuf;
    use std::time::Duration;

    fn settings(topology: Topology, workers: usize, chunks: usize) -> RunSettings {
        RunSettings {
            topology,
            workers: NonZeroUsize::new(workers).unwrap(),
            chunks: NonZeroUsize::new(chunks).unwrap(),
            blend: BlendParams {
                intensity: Intensity::new(0.5).unwrap(),
                background_threshold: Some(500),
            },
        }
    }

    fn request(name: &str) -> LoadRequest {
        LoadRequest {
            source: PathBuf::from(format!("in/{name}")),
            output: PathBuf::from(format!("out/{name}")),
        }
    }

    /// Gradient images of assorted shapes, gray and RGB.
    fn populate(codec: &MemoryCodec, count: usize) -> Vec<LoadRequest> {
        (0..count)
            .map(|i| {
                let name = format!("img{i:03}.png");
                let width = 3 + (i as u32 * 7) % 13;
                let height = 2 + (i as u32 * 5) % 11;
                let channels = if i % 3 == 0 { Channels::Gray } else { Channels::Rgb };
                let len = (width * height) as usize * channels.count();
                let data = (0..len).map(|b| ((b * 31 + i) % 256) as u8).collect();
                codec.insert(
                    format!("in/{name}"),
                    PixelBuffer::from_raw(width, height, channels, data).unwrap(),
                );
                request(&name)
            })
            .collect()
    }

    fn watermark() -> Arc<PixelBuffer> {
        let data = (0..5 * 4 * 3).map(|b| ((b * 53) % 256) as u8).collect();
        Arc::new(PixelBuffer::from_raw(5, 4, Channels::Rgb, data).unwrap())
    }

    fn run(topology: Topology, workers: usize, chunks: usize, codec: &Arc<MemoryCodec>) -> RunReport {
        let requests = populate(codec, 24);
        Orchestrator::new(
            settings(topology, workers, chunks),
            Arc::clone(codec) as Arc<dyn ImageCodec>,
            watermark(),
        )
        .run(requests)
    }

    #[test]
    fn test_settings_reject_zero_workers() {
        let config = ProcessingConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(RunSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_settings_chunks_default_to_workers() {
        let config = ProcessingConfig {
            workers: 6,
            ..Default::default()
        };
        let settings = RunSettings::from_config(&config).unwrap();
        assert_eq!(settings.chunks.get(), 6);

        let config = ProcessingConfig {
            chunks: Some(0),
            ..Default::default()
        };
        assert!(RunSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_settings_reject_excessive_chunks() {
        let config = ProcessingConfig {
            chunks: Some(1 << 40),
            ..Default::default()
        };
        assert!(matches!(
            RunSettings::from_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        let config = ProcessingConfig {
            chunks: Some(MAX_CHUNKS),
            ..Default::default()
        };
        assert_eq!(RunSettings::from_config(&config).unwrap().chunks.get(), MAX_CHUNKS);
    }

    #[test]
    fn test_all_topologies_produce_identical_outputs() {
        let reference = Arc::new(MemoryCodec::new());
        let report = run(Topology::Sequential, 1, 1, &reference);
        assert_eq!(report.processed, 24);

        for topology in Topology::ALL {
            for (workers, chunks) in [(1, 1), (3, 5), (4, 64)] {
                let codec = Arc::new(MemoryCodec::new());
                let report = run(topology, workers, chunks, &codec);
                assert_eq!(report.processed, 24, "{topology} w={workers} c={chunks}");
                assert_eq!(report.failed(), 0);
                for i in 0..24 {
                    let path = format!("out/img{i:03}.png");
                    assert_eq!(
                        codec.saved(&path),
                        reference.saved(&path),
                        "{topology} w={workers} c={chunks} {path}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_uniform_scenario() {
        // 4x4 black image, uniform gray 100 watermark, intensity 0.5
        let codec = Arc::new(MemoryCodec::new());
        codec.insert("in/black.png", PixelBuffer::filled(4, 4, Channels::Gray, 0));
        let orchestrator = Orchestrator::new(
            settings(Topology::PipeOfFarms, 2, 4),
            Arc::clone(&codec) as Arc<dyn ImageCodec>,
            Arc::new(PixelBuffer::filled(2, 2, Channels::Gray, 100)),
        );
        let report = orchestrator.run(vec![request("black.png")]);

        assert_eq!(report.processed, 1);
        assert_eq!(report.chunks_marked, 4);
        let saved = codec.saved("out/black.png").unwrap();
        assert!(saved.as_bytes().iter().all(|&v| v == 50));
    }

    #[test]
    fn test_partial_failure() {
        for topology in Topology::ALL {
            let codec = Arc::new(MemoryCodec::new());
            let mut requests = populate(&codec, 3);
            requests.insert(1, request("corrupt.png"));

            let report = Orchestrator::new(
                settings(topology, 2, 3),
                Arc::clone(&codec) as Arc<dyn ImageCodec>,
                watermark(),
            )
            .run(requests);

            assert_eq!(report.discovered, 4);
            assert_eq!(report.processed, 3, "{topology}");
            assert_eq!(report.decode_failures, 1);
            assert_eq!(report.incomplete, 0);
            assert_eq!(codec.saved_count(), 3);
        }
    }

    #[test]
    fn test_encode_failure_does_not_stop_run() {
        for topology in Topology::ALL {
            let codec = Arc::new(MemoryCodec::new());
            let requests = populate(&codec, 5);
            codec.fail_encode("out/img002.png");

            let report = Orchestrator::new(
                settings(topology, 3, 2),
                Arc::clone(&codec) as Arc<dyn ImageCodec>,
                watermark(),
            )
            .run(requests);

            assert_eq!(report.processed, 4, "{topology}");
            assert_eq!(report.encode_failures, 1);
            assert!(codec.saved("out/img002.png").is_none());
        }
    }

    #[test]
    fn test_empty_batch() {
        for topology in Topology::ALL {
            let codec = Arc::new(MemoryCodec::new());
            let report = Orchestrator::new(
                settings(topology, 4, 4),
                codec as Arc<dyn ImageCodec>,
                watermark(),
            )
            .run(Vec::new());
            assert_eq!(report.discovered, 0);
            assert_eq!(report.processed, 0);
            assert!(!report.cancelled);
        }
    }

    #[test]
    fn test_cancellation_stops_early_and_terminates() {
        for topology in Topology::ALL {
            let codec = Arc::new(MemoryCodec::new().with_decode_delay(Duration::from_millis(5)));
            let requests = populate(&codec, 200);
            let cancel = CancelToken::new();

            let orchestrator = Orchestrator::new(
                settings(topology, 2, 3),
                Arc::clone(&codec) as Arc<dyn ImageCodec>,
                watermark(),
            )
            .with_cancel(cancel.clone());

            let report = std::thread::scope(|s| {
                let handle = s.spawn(|| orchestrator.run(requests));
                std::thread::sleep(Duration::from_millis(30));
                cancel.cancel();
                handle.join().unwrap()
            });

            assert!(report.cancelled, "{topology}");
            assert!(report.processed < 200, "{topology}");
            // Every saved image is complete; nothing half-marked hits disk.
            assert_eq!(codec.saved_count(), report.processed);
        }
    }

    #[test]
    fn test_cancellation_counts_images_waiting_to_be_saved() {
        for topology in [Topology::StagedPool, Topology::PipeOfFarms] {
            let codec = Arc::new(MemoryCodec::new().with_encode_delay(Duration::from_millis(25)));
            let requests = populate(&codec, 20);
            let cancel = CancelToken::new();

            let orchestrator = Orchestrator::new(
                settings(topology, 2, 3),
                Arc::clone(&codec) as Arc<dyn ImageCodec>,
                watermark(),
            )
            .with_cancel(cancel.clone());

            let report = std::thread::scope(|s| {
                let handle = s.spawn(|| orchestrator.run(requests));
                std::thread::sleep(Duration::from_millis(50));
                cancel.cancel();
                handle.join().unwrap()
            });

            assert!(report.cancelled, "{topology}");
            assert!(report.incomplete > 0, "{topology}");
            assert_eq!(
                report.processed + report.failed(),
                report.discovered,
                "{topology}"
            );
        }
    }

    #[test]
    fn test_progress_counts_every_image() {
        let codec = Arc::new(MemoryCodec::new());
        let mut requests = populate(&codec, 6);
        requests.push(request("missing.png"));
        let last = Arc::new(AtomicUsize::new(0));

        let progress: ProgressFn = {
            let last = Arc::clone(&last);
            Arc::new(move |n| {
                last.fetch_max(n, Ordering::SeqCst);
            })
        };
        let report = Orchestrator::new(
            settings(Topology::StagedPool, 3, 2),
            Arc::clone(&codec) as Arc<dyn ImageCodec>,
            watermark(),
        )
        .with_progress(progress)
        .run(requests);

        assert_eq!(report.processed + report.failed(), 7);
        assert_eq!(last.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_stage_exit_fires_once_on_last_worker() {
        let live = AtomicUsize::new(3);
        let fired = AtomicUsize::new(0);
        for _ in 0..3 {
            let _exit = StageExit::new(&live, || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
