//! Intensity-weighted watermark blending over a single chunk.
//!
//! The watermark tiles across the image: pixel `(row, col)` is mixed with
//! watermark pixel `(row % wm_height, col % wm_width)`. For RGB images with an
//! RGB watermark, watermark pixels whose channel sum reaches the background
//! threshold are skipped so a white backdrop leaves the photo untouched.

use crate::config::{DEFAULT_BACKGROUND_THRESHOLD, DEFAULT_INTENSITY};
use crate::types::{Channels, PixelBuffer};

use super::chunker::Chunk;

/// Watermark opacity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Intensity(f32);

impl Intensity {
    /// Returns `None` unless `value` is a finite number in `[0, 1]`.
    pub fn new(value: f32) -> Option<Self> {
        (0.0..=1.0).contains(&value).then_some(Self(value))
    }

    /// Map a `0..=100` percentage, falling back to the default intensity (with a
    /// warning) when out of range.
    pub fn from_percent(percent: i64) -> Self {
        if (0..=100).contains(&percent) {
            Self(percent as f32 / 100.0)
        } else {
            tracing::warn!(
                "Intensity {percent} is outside 0..=100, using default {DEFAULT_INTENSITY}"
            );
            Self(DEFAULT_INTENSITY)
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self(DEFAULT_INTENSITY)
    }
}

/// Parameters shared by every blend of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendParams {
    pub intensity: Intensity,
    /// Channel-sum threshold for the RGB background skip; `None` disables it.
    pub background_threshold: Option<u16>,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            intensity: Intensity::default(),
            background_threshold: Some(DEFAULT_BACKGROUND_THRESHOLD),
        }
    }
}

/// Mix one sample with the watermark sample at the given intensity.
#[inline]
pub fn mix(sample: u8, watermark: u8, intensity: Intensity) -> u8 {
    let i = intensity.value();
    let value = sample as f32 * (1.0 - i) + watermark as f32 * i;
    value.round().clamp(0.0, 255.0) as u8
}

/// Blend the watermark into `chunk` of `image`, in place.
///
/// Only samples inside the chunk are touched.
pub fn blend_chunk(
    image: &mut PixelBuffer,
    chunk: &Chunk,
    watermark: &PixelBuffer,
    params: &BlendParams,
) {
    let width = image.width();
    let channels = image.channels();
    debug_assert_eq!(chunk.image_width(), width as usize);
    let range = chunk.byte_range(channels);
    blend_segment(
        &mut image.as_bytes_mut()[range],
        chunk,
        channels,
        watermark,
        params,
    );
}

/// Blend the watermark into a chunk's own samples.
///
/// `segment` holds exactly the samples of `chunk`, i.e. the slice
/// `chunk.byte_range(channels)` of the full image buffer.
pub fn blend_segment(
    segment: &mut [u8],
    chunk: &Chunk,
    channels: Channels,
    watermark: &PixelBuffer,
    params: &BlendParams,
) {
    let wm_width = watermark.width() as usize;
    let wm_height = watermark.height() as usize;
    if wm_width == 0 || wm_height == 0 {
        return;
    }

    let ch = channels.count();
    debug_assert_eq!(segment.len(), chunk.len() * ch);

    let threshold = params
        .background_threshold
        .filter(|_| channels == Channels::Rgb && watermark.channels() == Channels::Rgb);
    let width = chunk.image_width();
    let base = chunk.pixel_range().start;

    for (row, cols) in chunk.spans() {
        let wm_row = row % wm_height;
        let span_start = (row * width + cols.start - base) * ch;
        let samples = &mut segment[span_start..span_start + cols.len() * ch];

        for (pixel, col) in samples.chunks_exact_mut(ch).zip(cols) {
            let wm_pixel = watermark.pixel(wm_row, col % wm_width);

            if let Some(threshold) = threshold {
                let sum: u16 = wm_pixel.iter().map(|&v| v as u16).sum();
                if sum >= threshold {
                    continue;
                }
            }

            let last = wm_pixel.len() - 1;
            for (c, sample) in pixel.iter_mut().enumerate() {
                *sample = mix(*sample, wm_pixel[c.min(last)], params.intensity);
            }
        }
    }
}
