//! Staged pool: one shared queue per stage boundary, drained by a pool of
//! `W` threads per stage.
//!
//! All load requests are queued up front followed by one end-of-stream per
//! loader. When the last worker of a stage exits it enqueues one
//! end-of-stream per worker of the next stage.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::{Cancellable, WorkQueue};
use crate::pipeline::stages::{LoadRequest, Stages};
use crate::pipeline::tracker::{ChunkTask, MarkedImage};
use crate::types::StageTimings;

use super::{join_workers, pull, watch_cancel, StageExit};

pub(super) fn run(
    stages: &Stages,
    workers: NonZeroUsize,
    requests: Vec<LoadRequest>,
    cancel: &CancelToken,
) -> StageTimings {
    let workers = workers.get();
    let loads: WorkQueue<LoadRequest> = WorkQueue::new();
    let marks: WorkQueue<ChunkTask> = WorkQueue::new();
    let saves: WorkQueue<MarkedImage> = WorkQueue::new();

    for request in requests {
        loads.push(request);
    }
    loads.push_end_of_stream_n(workers);

    let live_loaders = AtomicUsize::new(workers);
    let live_markers = AtomicUsize::new(workers);
    let finished = AtomicBool::new(false);
    let queues: [&dyn Cancellable; 3] = [&loads, &marks, &saves];

    thread::scope(|s| {
        watch_cancel(s, cancel, &finished, queues.to_vec());

        let mut handles = Vec::with_capacity(3 * workers);
        for _ in 0..workers {
            handles.push(s.spawn(|| {
                let _exit = StageExit::new(&live_loaders, || marks.push_end_of_stream_n(workers));
                let mut timings = StageTimings::default();
                while let Some(request) = pull(&loads, cancel) {
                    for task in stages.load(request, &mut timings.load) {
                        marks.push(task);
                    }
                }
                timings
            }));
        }
        for _ in 0..workers {
            handles.push(s.spawn(|| {
                let _exit = StageExit::new(&live_markers, || saves.push_end_of_stream_n(workers));
                let mut timings = StageTimings::default();
                while let Some(task) = pull(&marks, cancel) {
                    if let Some(image) = stages.mark(task, &mut timings.mark) {
                        saves.push(image);
                    }
                }
                timings
            }));
        }
        for _ in 0..workers {
            handles.push(s.spawn(|| {
                let mut timings = StageTimings::default();
                while let Some(image) = pull(&saves, cancel) {
                    stages.save(image, &mut timings.save);
                }
                timings
            }));
        }

        let timings = join_workers(handles);
        finished.store(true, Ordering::Release);
        timings
    })
}
