//! Row-major partitioning of an image into contiguous chunks.
//!
//! A chunk is a half-open range of pixel offsets `[start, end)` in row-major
//! order. Because the range is contiguous, it is also a contiguous byte range
//! of an interleaved pixel buffer, which lets the loader hand each chunk its
//! own owned segment of the image.

use std::num::NonZeroUsize;
use std::ops::Range;

use crate::types::Channels;

/// A `(row, col)` pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    fn from_offset(offset: usize, width: usize) -> Self {
        if width == 0 {
            return Self { row: 0, col: 0 };
        }
        Self {
            row: offset / width,
            col: offset % width,
        }
    }
}

/// A contiguous row-major pixel range within one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    start: usize,
    end: usize,
    width: usize,
}

impl Chunk {
    /// Build a chunk from pixel offsets in an image `width` pixels wide.
    pub fn from_offsets(start: usize, end: usize, width: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end, width }
    }

    /// First pixel of the chunk.
    pub fn start(&self) -> Position {
        Position::from_offset(self.start, self.width)
    }

    /// One past the last pixel, in row-major order. For the final chunk of an
    /// image this is `(height, 0)`.
    pub fn end(&self) -> Position {
        Position::from_offset(self.end, self.width)
    }

    /// Last pixel of the chunk (inclusive), `None` when empty.
    pub fn last(&self) -> Option<Position> {
        (!self.is_empty()).then(|| Position::from_offset(self.end - 1, self.width))
    }

    /// Pixel offsets covered by the chunk.
    pub fn pixel_range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Sample offsets covered by the chunk in an interleaved buffer.
    pub fn byte_range(&self, channels: Channels) -> Range<usize> {
        let ch = channels.count();
        self.start * ch..self.end * ch
    }

    /// Number of pixels in the chunk.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Width of the image the chunk belongs to.
    pub fn image_width(&self) -> usize {
        self.width
    }

    /// Row spans of the chunk: `(row, columns)` for each row it touches. Only
    /// the first and last spans can be partial rows.
    pub fn spans(&self) -> impl Iterator<Item = (usize, Range<usize>)> {
        let width = self.width;
        let end = self.end;
        let mut offset = self.start;
        std::iter::from_fn(move || {
            if offset >= end || width == 0 {
                return None;
            }
            let row = offset / width;
            let col = offset % width;
            let row_end = ((row + 1) * width).min(end);
            let span = (row, col..col + (row_end - offset));
            offset = row_end;
            Some(span)
        })
    }
}

/// Split a `width` x `height` image into `n` row-major chunks.
///
/// Every chunk but the last holds `ceil(width * height / n)` pixels; the last
/// one ends exactly at the final pixel. When `n` exceeds the pixel count the
/// trailing chunks are empty. The result is a pure function of its inputs.
pub fn chunk(width: u32, height: u32, n: NonZeroUsize) -> Vec<Chunk> {
    let width = width as usize;
    let total = width * height as usize;
    let n = n.get();
    let base = total.div_ceil(n);

    (0..n)
        .map(|i| {
            let start = (i * base).min(total);
            let end = if i + 1 == n {
                total
            } else {
                ((i + 1) * base).min(total)
            };
            Chunk::from_offsets(start, end, width)
        })
        .collect()
}
