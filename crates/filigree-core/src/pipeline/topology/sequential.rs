//! Single-threaded baseline: each image is loaded, marked chunk by chunk and
//! saved before the next one is read.

use crate::pipeline::cancel::CancelToken;
use crate::pipeline::stages::{LoadRequest, Stages};
use crate::types::StageTimings;

pub(super) fn run(stages: &Stages, requests: Vec<LoadRequest>, cancel: &CancelToken) -> StageTimings {
    let mut timings = StageTimings::default();
    for request in requests {
        if cancel.is_cancelled() {
            break;
        }
        stages.run_pipe(request, &mut timings);
    }
    timings
}
