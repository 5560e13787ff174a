//! Core data types for the Filigree pipeline.
//!
//! `PixelBuffer` is the decoded, codec-independent form of an image that the
//! chunker and blend kernel operate on; `RunReport` and `StageStats` describe
//! the outcome of a batch run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Topology;

/// Channel layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channels {
    /// Single luma channel
    Gray,
    /// Interleaved red, green, blue
    Rgb,
}

impl Channels {
    /// Number of interleaved samples per pixel.
    pub fn count(self) -> usize {
        match self {
            Channels::Gray => 1,
            Channels::Rgb => 3,
        }
    }
}

/// A decoded 8-bit image: row-major, channels interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw samples. Returns `None` if `data` does not hold exactly
    /// `width * height * channels` samples.
    pub fn from_raw(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(channels.count())?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: Channels, value: u8) -> Self {
        let len = width as usize * height as usize * channels.count();
        Self {
            width,
            height,
            channels,
            data: vec![value; len],
        }
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

    /// Number of pixels (not samples).
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Samples of the pixel at `(row, col)`.
    pub fn pixel(&self, row: usize, col: usize) -> &[u8] {
        let ch = self.channels.count();
        let offset = (row * self.width as usize + col) * ch;
        &self.data[offset..offset + ch]
    }

    /// Mutable samples of the pixel at `(row, col)`.
    pub fn pixel_mut(&mut self, row: usize, col: usize) -> &mut [u8] {
        let ch = self.channels.count();
        let offset = (row * self.width as usize + col) * ch;
        &mut self.data[offset..offset + ch]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Timing accumulator for one stage.
///
/// Each worker keeps its own and the orchestrator merges them at join time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    /// Items handled
    pub count: u64,
    /// Total busy time in microseconds
    pub total_us: u64,
    /// Fastest item in microseconds
    pub min_us: u64,
    /// Slowest item in microseconds
    pub max_us: u64,
}

impl StageStats {
    /// Record one item that took `elapsed`.
    pub fn record(&mut self, elapsed: Duration) {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.min_us = if self.count == 0 { us } else { self.min_us.min(us) };
        self.max_us = self.max_us.max(us);
        self.total_us = self.total_us.saturating_add(us);
        self.count += 1;
    }

    /// Fold another worker's statistics into this one.
    pub fn merge(&mut self, other: &StageStats) {
        if other.count == 0 {
            return;
        }
        self.min_us = if self.count == 0 {
            other.min_us
        } else {
            self.min_us.min(other.min_us)
        };
        self.max_us = self.max_us.max(other.max_us);
        self.total_us = self.total_us.saturating_add(other.total_us);
        self.count += other.count;
    }

    /// Mean time per item in microseconds.
    pub fn mean_us(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_us / self.count
        }
    }
}

/// Per-stage timings of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub load: StageStats,
    pub mark: StageStats,
    pub save: StageStats,
}

impl StageTimings {
    pub fn merge(&mut self, other: &StageTimings) {
        self.load.merge(&other.load);
        self.mark.merge(&other.mark);
        self.save.merge(&other.save);
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Topology the run used
    pub topology: Topology,

    /// Worker threads per stage
    pub workers: usize,

    /// Chunks per image
    pub chunks: usize,

    /// Input files handed to the pipeline
    pub discovered: usize,

    /// Images marked and saved successfully
    pub processed: usize,

    /// Inputs that could not be decoded
    pub decode_failures: usize,

    /// Marked images that could not be saved
    pub encode_failures: usize,

    /// Images dropped with unmarked chunks (cancellation or worker failure)
    pub incomplete: usize,

    /// Chunks blended across all images
    pub chunks_marked: usize,

    /// Whether the run was cancelled before draining its input
    pub cancelled: bool,

    /// Wall-clock time of the run in milliseconds
    pub elapsed_ms: u64,

    /// Merged per-stage timings
    pub stages: StageTimings,
}

impl RunReport {
    /// Throughput in images per second.
    pub fn images_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            0.0
        } else {
            self.processed as f64 * 1000.0 / self.elapsed_ms as f64
        }
    }

    /// Total number of images that did not make it to disk.
    pub fn failed(&self) -> usize {
        self.decode_failures + self.encode_failures + self.incomplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_checks_length() {
        assert!(PixelBuffer::from_raw(2, 2, Channels::Rgb, vec![0; 12]).is_some());
        assert!(PixelBuffer::from_raw(2, 2, Channels::Rgb, vec![0; 11]).is_none());
        assert!(PixelBuffer::from_raw(2, 2, Channels::Gray, vec![0; 4]).is_some());
    }

    #[test]
    fn test_pixel_addressing() {
        let mut buf = PixelBuffer::filled(3, 2, Channels::Rgb, 0);
        buf.pixel_mut(1, 2).copy_from_slice(&[1, 2, 3]);
        assert_eq!(buf.pixel(1, 2), &[1, 2, 3]);
        assert_eq!(&buf.as_bytes()[15..18], &[1, 2, 3]);
        assert_eq!(buf.pixel_count(), 6);
    }

    #[test]
    fn test_stage_stats_record_and_merge() {
        let mut a = StageStats::default();
        a.record(Duration::from_micros(10));
        a.record(Duration::from_micros(30));
        assert_eq!((a.count, a.min_us, a.max_us, a.mean_us()), (2, 10, 30, 20));

        let mut b = StageStats::default();
        b.record(Duration::from_micros(5));

        let mut merged = StageStats::default();
        merged.merge(&a);
        merged.merge(&b);
        merged.merge(&StageStats::default());
        assert_eq!(merged.count, 3);
        assert_eq!(merged.min_us, 5);
        assert_eq!(merged.max_us, 30);
        assert_eq!(merged.total_us, 45);
    }

    #[test]
    fn test_run_report_serializes_topology_kebab_case() {
        let report = RunReport {
            topology: Topology::FarmOfPipes,
            workers: 2,
            chunks: 2,
            discovered: 4,
            processed: 3,
            decode_failures: 1,
            encode_failures: 0,
            incomplete: 0,
            chunks_marked: 6,
            cancelled: false,
            elapsed_ms: 1500,
            stages: StageTimings::default(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"topology\":\"farm-of-pipes\""));
        assert!(json.contains("\"processed\":3"));
        assert_eq!(report.failed(), 1);
        assert!((report.images_per_second() - 2.0).abs() < 1e-9);
    }
}
