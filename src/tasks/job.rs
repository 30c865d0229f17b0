use std::sync::{Arc, Weak};
use std::time::Instant;

use image::RgbaImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::processing::mask::resample;
use crate::resampler::{ResamplerState, upgrade_live};
use crate::tasks::pool::PoolJob;

/// How a resampling pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    OwnerGone,
}

/// Background pass that resamples every image of one resampler to the
/// component's size at the moment each image is processed.
///
/// Holds only a weak handle; the owner is re-checked before every image so
/// the job never keeps a destroyed resampler busy.
pub(crate) struct ResamplingJob {
    state: Weak<ResamplerState>,
    generation: u64,
    owner_name: String,
    label: String,
}

impl ResamplingJob {
    pub(crate) fn new(state: Weak<ResamplerState>, generation: u64, owner_name: String) -> Self {
        let label = format!("Image Resampling job for '{owner_name}'");
        Self {
            state,
            generation,
            owner_name,
            label,
        }
    }

    fn run_pass(&self, cancel: &CancellationToken) -> JobOutcome {
        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        let Some(state) = upgrade_live(&self.state) else {
            return JobOutcome::OwnerGone;
        };

        let started = Instant::now();
        let name = &self.owner_name;
        let count = state.images.len();
        info!(
            "'{}': starting resampling job for {} images to size {}x{}",
            name,
            count,
            state.component.width(),
            state.component.height()
        );
        if !state.begin_pass(cancel) {
            return JobOutcome::Cancelled;
        }
        drop(state);

        let mut results: Vec<Option<Arc<RgbaImage>>> = Vec::with_capacity(count);
        for index in 0..count {
            if cancel.is_cancelled() {
                return JobOutcome::Cancelled;
            }
            let Some(state) = upgrade_live(&self.state) else {
                return JobOutcome::OwnerGone;
            };
            let image = &state.images[index];
            let (width, height) = (state.component.width(), state.component.height());
            debug!(
                "'{}': resampling image #{} from {}x{} to {}x{}",
                name,
                index,
                image.width(),
                image.height(),
                width,
                height
            );
            let resampled = resample(
                state.engine.as_ref(),
                image,
                state.mask.as_ref(),
                width,
                height,
                state.algorithm,
            );
            results.push(resampled.map(Arc::new));
        }

        let Some(state) = upgrade_live(&self.state) else {
            return JobOutcome::OwnerGone;
        };
        if !state.publish(results, cancel) {
            return JobOutcome::Cancelled;
        }
        state.request_repaint();
        info!(
            "'{}': resampling job completed in {}ms",
            name,
            started.elapsed().as_millis()
        );
        JobOutcome::Completed
    }
}

/// Releases the single-flight record of a pass that did not complete,
/// including one that unwinds out of the engine.
struct ReleaseOnExit<'a> {
    job: &'a ResamplingJob,
    completed: bool,
}

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Some(state) = self.job.state.upgrade() {
            state.release_job(self.job.generation);
        }
    }
}

impl PoolJob for ResamplingJob {
    fn name(&self) -> &str {
        &self.label
    }

    fn run(&mut self, cancel: &CancellationToken) {
        let mut guard = ReleaseOnExit {
            job: &*self,
            completed: false,
        };
        let outcome = self.run_pass(cancel);
        guard.completed = outcome == JobOutcome::Completed;
        if !guard.completed {
            debug!(
                "'{}': resampling job #{} ended: {:?}",
                self.owner_name, self.generation, outcome
            );
        }
    }
}
