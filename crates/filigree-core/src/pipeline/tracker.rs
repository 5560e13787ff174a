//! Completion tracking and ownership hand-off for chunked images.
//!
//! When an image is loaded its pixel buffer is cut into one owned segment per
//! chunk, and every segment travels in its own [`ChunkTask`]. All tasks of an
//! image share one [`ImageJob`] holding a [`CompletionTracker`]. A marker that
//! finishes a chunk deposits the segment and decrements the tracker in one
//! critical section; the single marker that takes the count to zero receives
//! every segment back and reassembles the image for the saver. The job itself
//! is released when the last task referencing it is dropped.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::PipelineError;
use crate::types::{Channels, PixelBuffer};

use super::chunker::{self, Chunk};
use super::stages::RunCounters;

enum Slot {
    Waiting,
    Marked(Vec<u8>),
    Abandoned,
}

struct TrackerState {
    pending: usize,
    slots: Vec<Slot>,
}

/// Result of reporting one chunk to a [`CompletionTracker`].
#[derive(Debug, PartialEq, Eq)]
pub enum Handoff {
    /// Other chunks of the image are still in flight.
    Pending,
    /// This call completed the image; the marked segments in chunk order.
    Ready(Vec<Vec<u8>>),
    /// This call completed the image but some chunks were abandoned.
    Incomplete { missing: usize },
}

/// Countdown shared by all chunks of one image.
///
/// The count starts at the number of chunks and is decremented exactly once
/// per chunk, under the tracker's lock, so exactly one caller ever observes the
/// transition to zero.
pub struct CompletionTracker {
    state: Mutex<TrackerState>,
}

impl CompletionTracker {
    pub fn new(chunks: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                pending: chunks,
                slots: (0..chunks).map(|_| Slot::Waiting).collect(),
            }),
        }
    }

    /// Chunks not yet reported.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
    }

    /// Deposit the marked samples of chunk `index` and count it down.
    pub fn complete(&self, index: usize, segment: Vec<u8>) -> Handoff {
        self.settle(index, Slot::Marked(segment))
    }

    /// Count chunk `index` down without a result.
    pub fn abandon(&self, index: usize) -> Handoff {
        self.settle(index, Slot::Abandoned)
    }

    fn settle(&self, index: usize, outcome: Slot) -> Handoff {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.slots.get(index) {
            Some(Slot::Waiting) => {}
            _ => {
                tracing::error!("Chunk {} reported twice or out of range", index);
                debug_assert!(false, "chunk {index} reported twice or out of range");
                return Handoff::Pending;
            }
        }
        state.slots[index] = outcome;
        state.pending -= 1;
        if state.pending > 0 {
            return Handoff::Pending;
        }

        let slots = std::mem::take(&mut state.slots);
        let missing = slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Abandoned))
            .count();
        if missing > 0 {
            return Handoff::Incomplete { missing };
        }
        Handoff::Ready(
            slots
                .into_iter()
                .map(|slot| match slot {
                    Slot::Marked(segment) => segment,
                    Slot::Waiting | Slot::Abandoned => Vec::new(),
                })
                .collect(),
        )
    }
}

/// Per-image state shared by all of its chunk tasks.
pub struct ImageJob {
    source: PathBuf,
    output: PathBuf,
    width: u32,
    height: u32,
    channels: Channels,
    tracker: CompletionTracker,
    counters: Arc<RunCounters>,
}

impl ImageJob {
    /// Split a decoded image into `n` chunk tasks sharing one tracker.
    pub fn dispatch(
        source: PathBuf,
        output: PathBuf,
        image: PixelBuffer,
        n: NonZeroUsize,
        counters: Arc<RunCounters>,
    ) -> Vec<ChunkTask> {
        let width = image.width();
        let height = image.height();
        let channels = image.channels();
        let chunks = chunker::chunk(width, height, n);

        let job = Arc::new(ImageJob {
            source,
            output,
            width,
            height,
            channels,
            tracker: CompletionTracker::new(chunks.len()),
            counters,
        });

        // Peel segments off the tail so each sample is copied once.
        let mut data = image.into_bytes();
        let mut tasks: Vec<ChunkTask> = chunks
            .iter()
            .enumerate()
            .rev()
            .map(|(index, chunk)| ChunkTask {
                job: Arc::clone(&job),
                index,
                chunk: *chunk,
                segment: Some(data.split_off(chunk.byte_range(channels).start)),
            })
            .collect();
        tasks.reverse();
        tasks
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    /// Chunks of this image still in flight.
    pub fn pending(&self) -> usize {
        self.tracker.pending()
    }

    fn assemble(&self, segments: Vec<Vec<u8>>) -> Option<MarkedImage> {
        let data = segments.concat();
        match PixelBuffer::from_raw(self.width, self.height, self.channels, data) {
            Some(pixels) => Some(MarkedImage {
                source: self.source.clone(),
                output: self.output.clone(),
                pixels,
                unsaved: Some(Arc::clone(&self.counters)),
            }),
            None => {
                tracing::error!(
                    "Reassembled buffer for {:?} does not match {}x{}",
                    self.source,
                    self.width,
                    self.height
                );
                self.counters.record_incomplete();
                None
            }
        }
    }

    fn report_incomplete(&self, missing: usize) {
        let err = PipelineError::Incomplete {
            path: self.source.clone(),
            missing,
        };
        tracing::error!("{}", err);
        self.counters.record_incomplete();
    }
}

/// One chunk of one image, carrying its own samples.
///
/// A task must end in [`ChunkTask::finish`]; a task dropped any other way
/// (panic, cancellation) abandons its chunk so the image's tracker still
/// reaches zero.
pub struct ChunkTask {
    job: Arc<ImageJob>,
    index: usize,
    chunk: Chunk,
    segment: Option<Vec<u8>>,
}

impl ChunkTask {
    pub fn job(&self) -> &ImageJob {
        &self.job
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// Samples of this chunk, as laid out in the full image buffer.
    pub fn segment_mut(&mut self) -> &mut [u8] {
        self.segment.as_deref_mut().unwrap_or_default()
    }

    /// Report the chunk as marked.
    ///
    /// Returns the reassembled image only for the task that completes it.
    pub fn finish(mut self) -> Option<MarkedImage> {
        let segment = self.segment.take().unwrap_or_default();
        match self.job.tracker.complete(self.index, segment) {
            Handoff::Pending => None,
            Handoff::Ready(segments) => self.job.assemble(segments),
            Handoff::Incomplete { missing } => {
                self.job.report_incomplete(missing);
                None
            }
        }
    }
}

impl Drop for ChunkTask {
    fn drop(&mut self) {
        if self.segment.take().is_some() {
            if let Handoff::Incomplete { missing } = self.job.tracker.abandon(self.index) {
                self.job.report_incomplete(missing);
            }
        }
    }
}

impl std::fmt::Debug for ChunkTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkTask")
            .field("source", &self.job.source)
            .field("index", &self.index)
            .field("chunk", &self.chunk)
            .finish()
    }
}

/// A fully marked image, owned solely by the save stage.
///
/// An image dropped before it reaches [`MarkedImage::claim`] (a cancelled save
/// queue, a panicking saver) is counted as incomplete.
pub struct MarkedImage {
    pub source: PathBuf,
    pub output: PathBuf,
    pub pixels: PixelBuffer,
    unsaved: Option<Arc<RunCounters>>,
}

impl MarkedImage {
    /// Take responsibility for settling the image. The caller must then record
    /// it as processed or failed.
    pub fn claim(&mut self) {
        self.unsaved = None;
    }
}

impl Drop for MarkedImage {
    fn drop(&mut self) {
        if let Some(counters) = self.unsaved.take() {
            tracing::warn!("Discarded {:?} before it was saved", self.source);
            counters.record_incomplete();
        }
    }
}

impl std::fmt::Debug for MarkedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkedImage")
            .field("source", &self.source)
            .field("output", &self.output)
            .field("pixels", &self.pixels)
            .finish()
    }
}
