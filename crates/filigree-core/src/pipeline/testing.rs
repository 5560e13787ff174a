//! In-memory codec for engine tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::types::PixelBuffer;

use super::codec::ImageCodec;

#[derive(Default)]
pub struct MemoryCodec {
    inputs: Mutex<HashMap<PathBuf, PixelBuffer>>,
    saved: Mutex<HashMap<PathBuf, PixelBuffer>>,
    failing_encodes: Mutex<HashSet<PathBuf>>,
    decode_delay: Option<Duration>,
    encode_delay: Option<Duration>,
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every decode, to keep a run busy.
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = Some(delay);
        self
    }

    /// Sleep this long in every encode, so marked images back up before saving.
    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = Some(delay);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, image: PixelBuffer) {
        self.inputs.lock().unwrap().insert(path.into(), image);
    }

    pub fn fail_encode(&self, path: impl Into<PathBuf>) {
        self.failing_encodes.lock().unwrap().insert(path.into());
    }

    pub fn saved(&self, path: impl AsRef<Path>) -> Option<PixelBuffer> {
        self.saved.lock().unwrap().get(path.as_ref()).cloned()
    }

    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap().len()
    }
}

impl ImageCodec for MemoryCodec {
    fn decode(&self, path: &Path) -> PipelineResult<PixelBuffer> {
        if let Some(delay) = self.decode_delay {
            std::thread::sleep(delay);
        }
        self.inputs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::Decode {
                path: path.to_path_buf(),
                message: "not a valid image".into(),
            })
    }

    fn encode(&self, image: &PixelBuffer, path: &Path) -> PipelineResult<()> {
        if let Some(delay) = self.encode_delay {
            std::thread::sleep(delay);
        }
        if self.failing_encodes.lock().unwrap().contains(path) {
            return Err(PipelineError::Encode {
                path: path.to_path_buf(),
                message: "device full".into(),
            });
        }
        self.saved
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), image.clone());
        Ok(())
    }
}
