//! Watermarking pipeline components.
//!
//! - **discovery**: Find input images in a directory
//! - **codec**: Decode and encode images behind the `ImageCodec` trait
//! - **chunker**: Partition an image into contiguous pixel ranges
//! - **blend**: The per-chunk watermark kernel
//! - **tracker**: Per-image completion tracking and reassembly
//! - **queue**: Blocking work queues between stages
//! - **cancel**: Cooperative cancellation
//! - **stages**: The load, mark and save stages
//! - **topology**: Worker topologies and the run orchestrator

pub mod blend;
pub mod cancel;
pub mod chunker;
pub mod codec;
pub mod discovery;
pub mod queue;
pub mod stages;
pub mod topology;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use blend::{blend_chunk, blend_segment, BlendParams, Intensity};
pub use cancel::CancelToken;
pub use chunker::{chunk, Chunk, Position};
pub use codec::{FileCodec, ImageCodec};
pub use discovery::{DiscoveredFile, FileDiscovery};
pub use queue::{Cancellable, WorkQueue};
pub use stages::{LoadRequest, Loader, Marker, ProgressFn, RunCounters, Saver, Stages};
pub use topology::{Orchestrator, RunSettings};
pub use tracker::{ChunkTask, CompletionTracker, Handoff, ImageJob, MarkedImage};
