//! Farm-based topologies.
//!
//! A farm is a group of workers, each with a private input lane, fed by a
//! round-robin emitter. Closing a farm enqueues one end-of-stream per lane.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::queue::{Cancellable, WorkQueue};
use crate::pipeline::stages::{LoadRequest, Stages};
use crate::pipeline::tracker::{ChunkTask, MarkedImage};
use crate::types::StageTimings;

use super::{join_workers, pull, watch_cancel, StageExit};

struct Farm<T> {
    lanes: Vec<WorkQueue<T>>,
    next: AtomicUsize,
}

impl<T> Farm<T> {
    fn new(workers: NonZeroUsize) -> Self {
        Self {
            lanes: (0..workers.get()).map(|_| WorkQueue::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Hand an item to the next lane in round-robin order.
    fn dispatch(&self, item: T) {
        let lane = self.next.fetch_add(1, Ordering::Relaxed) % self.lanes.len();
        self.lanes[lane].push(item);
    }

    fn lane(&self, index: usize) -> &WorkQueue<T> {
        &self.lanes[index]
    }

    fn close(&self) {
        for lane in &self.lanes {
            lane.push_end_of_stream();
        }
    }

    /// Emit every request from the calling thread, then close the farm.
    fn emit(&self, items: Vec<T>, cancel: &CancelToken) {
        for item in items {
            if cancel.is_cancelled() {
                break;
            }
            self.dispatch(item);
        }
        self.close();
    }
}

impl<T: Send> Cancellable for Farm<T> {
    fn cancel(&self) {
        for lane in &self.lanes {
            lane.cancel();
        }
    }
}

/// `W` independent load → mark → save pipes. Each pipe finishes one image
/// before it takes the next.
pub(super) fn run_farm_of_pipes(
    stages: &Stages,
    workers: NonZeroUsize,
    requests: Vec<LoadRequest>,
    cancel: &CancelToken,
) -> StageTimings {
    let pipes: Farm<LoadRequest> = Farm::new(workers);
    let finished = AtomicBool::new(false);

    thread::scope(|s| {
        watch_cancel(s, cancel, &finished, vec![&pipes as &dyn Cancellable]);

        let handles: Vec<_> = (0..workers.get())
            .map(|index| {
                let pipes = &pipes;
                s.spawn(move || {
                    let mut timings = StageTimings::default();
                    while let Some(request) = pull(pipes.lane(index), cancel) {
                        stages.run_pipe(request, &mut timings);
                    }
                    timings
                })
            })
            .collect();

        pipes.emit(requests, cancel);

        let timings = join_workers(handles);
        finished.store(true, Ordering::Release);
        timings
    })
}

/// A load farm, a mark farm and a save farm chained together. Chunks of one
/// image are spread round-robin over the markers.
pub(super) fn run_pipe_of_farms(
    stages: &Stages,
    workers: NonZeroUsize,
    requests: Vec<LoadRequest>,
    cancel: &CancelToken,
) -> StageTimings {
    let loads: Farm<LoadRequest> = Farm::new(workers);
    let marks: Farm<ChunkTask> = Farm::new(workers);
    let saves: Farm<MarkedImage> = Farm::new(workers);

    let live_loaders = AtomicUsize::new(workers.get());
    let live_markers = AtomicUsize::new(workers.get());
    let finished = AtomicBool::new(false);
    let farms: [&dyn Cancellable; 3] = [&loads, &marks, &saves];

    thread::scope(|s| {
        watch_cancel(s, cancel, &finished, farms.to_vec());

        let mut handles = Vec::with_capacity(3 * workers.get());
        for index in 0..workers.get() {
            let (loads, marks, saves) = (&loads, &marks, &saves);
            let (live_loaders, live_markers) = (&live_loaders, &live_markers);

            handles.push(s.spawn(move || {
                let _exit = StageExit::new(live_loaders, || marks.close());
                let mut timings = StageTimings::default();
                while let Some(request) = pull(loads.lane(index), cancel) {
                    for task in stages.load(request, &mut timings.load) {
                        marks.dispatch(task);
                    }
                }
                timings
            }));
            handles.push(s.spawn(move || {
                let _exit = StageExit::new(live_markers, || saves.close());
                let mut timings = StageTimings::default();
                while let Some(task) = pull(marks.lane(index), cancel) {
                    if let Some(image) = stages.mark(task, &mut timings.mark) {
                        saves.dispatch(image);
                    }
                }
                timings
            }));
            handles.push(s.spawn(move || {
                let mut timings = StageTimings::default();
                while let Some(image) = pull(saves.lane(index), cancel) {
                    stages.save(image, &mut timings.save);
                }
                timings
            }));
        }

        loads.emit(requests, cancel);

        let timings = join_workers(handles);
        finished.store(true, Ordering::Release);
        timings
    })
}
