//! Image decoding and encoding behind a small codec trait.
//!
//! The engine only ever sees [`PixelBuffer`]s. [`FileCodec`] bridges to the
//! `image` crate: anything without color decodes to gray, everything else to
//! 8-bit RGB (alpha is dropped, 16-bit samples are narrowed). The output
//! format follows the extension of the output path.

use image::{DynamicImage, ExtendedColorType, ImageReader};
use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Channels, PixelBuffer};

/// Decodes source images and encodes watermarked results.
///
/// Implementations are shared by every worker thread.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer>;

    fn encode(&self, image: &PixelBuffer, path: &Path) -> PipelineResult<()>;
}

/// Filesystem codec backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCodec;

impl FileCodec {
    pub fn new() -> Self {
        Self
    }

    fn to_pixel_buffer(image: DynamicImage, path: &Path) -> PipelineResult<PixelBuffer> {
        let (channels, width, height, data) = if image.color().has_color() {
            let rgb = image.into_rgb8();
            let (w, h) = rgb.dimensions();
            (Channels::Rgb, w, h, rgb.into_raw())
        } else {
            let luma = image.into_luma8();
            let (w, h) = luma.dimensions();
            (Channels::Gray, w, h, luma.into_raw())
        };
        PixelBuffer::from_raw(width, height, channels, data).ok_or_else(|| {
            PipelineError::Unsupported {
                path: path.to_path_buf(),
                message: format!("decoded buffer does not match {width}x{height}"),
            }
        })
    }
}

impl ImageCodec for FileCodec {
    fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer> {
        let reader = ImageReader::open(path)
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot open file: {}", e),
            })?
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        let image = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::to_pixel_buffer(image, path)
    }

    fn encode(&self, image: &PixelBuffer, path: &Path) -> PipelineResult<()> {
        let color = match image.channels() {
            Channels::Gray => ExtendedColorType::L8,
            Channels::Rgb => ExtendedColorType::Rgb8,
        };
        image::save_buffer(path, image.as_bytes(), image.width(), image.height(), color).map_err(
            |e| PipelineError::Encode {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        )
    }
}
