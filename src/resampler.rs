//! Deferred, debounced high-quality resampling for a component's images.
//!
//! The component keeps drawing a cheap stretched copy of each source image
//! until a background pass has produced images at exactly its size, then
//! swaps to those. Resizes invalidate the pass and restart a debounce timer;
//! destruction cancels everything and waits a bounded time for the worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ResamplerConfig;
use crate::error::Error;
use crate::events::ComponentEvent;
use crate::host::{Component, Displays, Interpolation, Surface, UiDispatcher};
use crate::platform::display::{effective_scale, should_use_high_quality};
use crate::processing::layout::{Point, RectF};
use crate::processing::resize::{FastResizeEngine, ResizeAlgorithm, ResizeEngine};
use crate::tasks::debounce::Debouncer;
use crate::tasks::job::ResamplingJob;
use crate::tasks::pool::{OwnerId, ResamplingPool, next_owner_id};

pub const INVALID_INDEX_LABEL: &str = "Invalid Image Index";
pub const RESAMPLING_FAILED_LABEL: &str = "Resampling Failed";

const PLACEHOLDER_FILL: Rgba<u8> = Rgba([0x55, 0x55, 0x55, 77]);
const PLACEHOLDER_TEXT: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);

type ResampledSet = Vec<Option<Arc<RgbaImage>>>;

/// Most recent job submitted for this resampler. It stays recorded after
/// completing so a repeat request for the same size is a no-op.
struct ActiveJob {
    token: CancellationToken,
    size: (i32, i32),
    generation: u64,
}

/// State shared between the UI thread and the worker.
///
/// `images` and `mask` never change after construction. `resampled` is only
/// written by jobs and is read through the `done` gate.
pub(crate) struct ResamplerState {
    pub(crate) component: Arc<dyn Component>,
    pub(crate) displays: Arc<dyn Displays>,
    pub(crate) dispatcher: Arc<dyn UiDispatcher>,
    pub(crate) engine: Arc<dyn ResizeEngine>,
    pub(crate) images: Vec<RgbaImage>,
    pub(crate) mask: Option<RgbaImage>,
    pub(crate) algorithm: ResizeAlgorithm,
    pool: Arc<ResamplingPool>,
    owner: OwnerId,
    resampled: Mutex<ResampledSet>,
    done: AtomicBool,
    lifetime: CancellationToken,
    active: Mutex<Option<ActiveJob>>,
    generation: AtomicU64,
}

/// Upgrade `weak` only while the resampler has not started tearing down.
pub(crate) fn upgrade_live(weak: &Weak<ResamplerState>) -> Option<Arc<ResamplerState>> {
    weak.upgrade().filter(|state| !state.lifetime.is_cancelled())
}

impl ResamplerState {
    fn lock_resampled(&self) -> MutexGuard<'_, ResampledSet> {
        self.resampled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn should_display_resampled(&self) -> bool {
        self.is_done()
            && should_use_high_quality(effective_scale(
                self.component.as_ref(),
                self.displays.as_ref(),
            ))
    }

    /// Clear readiness and stale results at the start of a pass.
    pub(crate) fn begin_pass(&self, cancel: &CancellationToken) -> bool {
        let mut resampled = self.lock_resampled();
        if cancel.is_cancelled() {
            return false;
        }
        self.done.store(false, Ordering::Release);
        resampled.clear();
        true
    }

    /// Publish a complete pass. The cancellation check happens under the
    /// result lock so a concurrent cancel + fence cannot miss it.
    pub(crate) fn publish(&self, results: ResampledSet, cancel: &CancellationToken) -> bool {
        let mut resampled = self.lock_resampled();
        if cancel.is_cancelled() {
            return false;
        }
        *resampled = results;
        self.done.store(true, Ordering::Release);
        true
    }

    pub(crate) fn request_repaint(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.dispatcher.post(Box::new(move || {
            if let Some(state) = upgrade_live(&weak) {
                info!(
                    "'{}': resampling complete, triggering repaint",
                    state.component.name()
                );
                state.component.repaint();
            }
        }));
    }

    /// Forget job `generation` if it is still the recorded one, so the next
    /// request for the same size submits again.
    pub(crate) fn release_job(&self, generation: u64) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|job| job.generation == generation) {
            *active = None;
        }
    }

    /// Cancel the outstanding job, wait until no publish is in progress,
    /// then drop readiness.
    fn invalidate(&self) {
        if let Some(job) = self.lock_active().take() {
            job.token.cancel();
        }
        self.pool.remove_jobs(self.owner, Duration::ZERO);
        let _fence = self.lock_resampled();
        self.done.store(false, Ordering::Release);
    }

    fn try_schedule(self: &Arc<Self>) -> bool {
        let name = self.component.name();
        let size = (self.component.width(), self.component.height());
        if size.0 <= 0 || size.1 <= 0 {
            debug!(
                "'{}': scheduling skipped - size: {}x{}",
                name, size.0, size.1
            );
            return false;
        }

        let scale = effective_scale(self.component.as_ref(), self.displays.as_ref());
        let needed = should_use_high_quality(scale);
        debug!(
            "'{}': display scale: {}, resampling needed: {}",
            name,
            scale.map_or_else(|| "unknown".to_string(), |s| format!("{s:.2}")),
            needed
        );
        if !needed {
            return false;
        }

        let outstanding = self
            .lock_active()
            .as_ref()
            .filter(|job| !job.token.is_cancelled())
            .map(|job| job.size);
        match outstanding {
            Some(pending) if pending == size => {
                debug!("'{}': job for {}x{} already submitted", name, size.0, size.1);
                return false;
            }
            Some(_) => self.invalidate(),
            None => {}
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.lifetime.child_token();
        *self.lock_active() = Some(ActiveJob {
            token: token.clone(),
            size,
            generation,
        });
        info!("'{}': scheduling resampling job", name);
        self.pool.submit(
            self.owner,
            token,
            Box::new(ResamplingJob::new(Arc::downgrade(self), generation, name)),
        );
        true
    }
}

/// Owns a component's source images and their resampled versions.
///
/// Lives on the UI thread. The host forwards move/resize notifications to
/// [`handle_event`](Self::handle_event), calls [`tick`](Self::tick) from its
/// timer loop, and paints through [`draw`](Self::draw).
pub struct DeferredResampler {
    state: Arc<ResamplerState>,
    debounce: Debouncer,
    teardown_timeout: Duration,
}

impl DeferredResampler {
    pub fn builder(
        component: Arc<dyn Component>,
        displays: Arc<dyn Displays>,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> DeferredResamplerBuilder {
        DeferredResamplerBuilder {
            component,
            displays,
            dispatcher,
            images: Vec::new(),
            mask: None,
            config: ResamplerConfig::default(),
            engine: None,
            pool: None,
        }
    }

    pub fn image_count(&self) -> usize {
        self.state.images.len()
    }

    pub fn is_resampling_done(&self) -> bool {
        self.state.is_done()
    }

    /// Resampled images are shown only when a pass has completed and the
    /// component sits on a 1:1 display.
    pub fn should_display_resampled(&self) -> bool {
        self.state.should_display_resampled()
    }

    /// Size of the cached resample for `index`, once a pass is done.
    pub fn resampled_size(&self, index: usize) -> Option<(u32, u32)> {
        if !self.state.is_done() {
            return None;
        }
        self.state
            .lock_resampled()
            .get(index)
            .and_then(|img| img.as_ref().map(|img| img.dimensions()))
    }

    /// Submit a pass for the current size if the component is sized and on
    /// a 1:1 display. Returns whether a job was submitted.
    pub fn try_schedule_resampling(&self) -> bool {
        self.state.try_schedule()
    }

    pub fn handle_event(&mut self, event: ComponentEvent, now: Instant) {
        match event {
            ComponentEvent::MovedOrResized { was_resized, .. } => {
                if !was_resized {
                    trace!("'{}': moved but not resized", self.state.component.name());
                    return;
                }
                debug!(
                    "'{}': resized to {}x{}, cancelling jobs and starting {}ms timer",
                    self.state.component.name(),
                    self.state.component.width(),
                    self.state.component.height(),
                    self.debounce.delay().as_millis()
                );
                self.state.invalidate();
                self.debounce.arm(now);
            }
        }
    }

    /// Drive the debounce timer. Returns `true` when it fired.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.debounce.poll(now) {
            return false;
        }
        debug!(
            "'{}': timer fired after {}ms delay",
            self.state.component.name(),
            self.debounce.delay().as_millis()
        );
        self.state.try_schedule();
        self.debounce.finish();
        true
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Paint image `index`: the cached resample when it is ready, otherwise
    /// the original stretched to the component. Contract violations are
    /// drawn as labelled placeholders.
    pub fn draw(&self, surface: &mut dyn Surface, index: usize) {
        surface.set_interpolation(Interpolation::High);
        let component = self.state.component.as_ref();

        let Some(original) = self.state.images.get(index) else {
            warn!(
                "'{}': draw - invalid image index: {} (total images: {})",
                component.name(),
                index,
                self.state.images.len()
            );
            self.draw_placeholder(surface, INVALID_INDEX_LABEL);
            return;
        };

        if self.state.should_display_resampled() {
            let cached = self.state.lock_resampled().get(index).cloned().flatten();
            match cached {
                Some(image) if image.width() > 0 && image.height() > 0 => {
                    surface.draw_image_at(&image, Point::new(0, 0));
                }
                _ => {
                    warn!(
                        "'{}': resampled image #{} is invalid",
                        component.name(),
                        index
                    );
                    self.draw_placeholder(surface, RESAMPLING_FAILED_LABEL);
                }
            }
        } else {
            surface.draw_image_stretched(original, self.target_rect());
        }
    }

    fn target_rect(&self) -> RectF {
        let component = self.state.component.as_ref();
        component
            .float_bounds()
            .unwrap_or_else(|| component.local_bounds().to_float())
    }

    fn draw_placeholder(&self, surface: &mut dyn Surface, label: &str) {
        surface.fill_all(PLACEHOLDER_FILL);
        surface.draw_text(
            label,
            self.state.component.local_bounds(),
            PLACEHOLDER_TEXT,
        );
    }

    #[cfg(test)]
    fn downgrade(&self) -> Weak<ResamplerState> {
        Arc::downgrade(&self.state)
    }
}

impl Drop for DeferredResampler {
    fn drop(&mut self) {
        self.debounce.cancel();
        self.state.lifetime.cancel();
        let stopped = self
            .state
            .pool
            .remove_jobs(self.state.owner, self.teardown_timeout);
        if !stopped {
            warn!(
                "'{}': resampling job still running after {:?}; abandoning it",
                self.state.component.name(),
                self.teardown_timeout
            );
        }
        let _fence = self.state.lock_resampled();
        self.state.done.store(false, Ordering::Release);
    }
}

/// Configures and creates a [`DeferredResampler`].
pub struct DeferredResamplerBuilder {
    component: Arc<dyn Component>,
    displays: Arc<dyn Displays>,
    dispatcher: Arc<dyn UiDispatcher>,
    images: Vec<RgbaImage>,
    mask: Option<RgbaImage>,
    config: ResamplerConfig,
    engine: Option<Arc<dyn ResizeEngine>>,
    pool: Option<Arc<ResamplingPool>>,
}

impl DeferredResamplerBuilder {
    pub fn images(mut self, images: impl IntoIterator<Item = RgbaImage>) -> Self {
        self.images.extend(images);
        self
    }

    pub fn image(mut self, image: RgbaImage) -> Self {
        self.images.push(image);
        self
    }

    pub fn mask(mut self, mask: Option<RgbaImage>) -> Self {
        self.mask = mask;
        self
    }

    pub fn config(mut self, config: ResamplerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ResizeEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Use `pool` instead of the one selected by the configuration.
    pub fn pool(mut self, pool: Arc<ResamplingPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Create the resampler and post its first scheduling attempt to the UI
    /// thread.
    pub fn build(self) -> Result<DeferredResampler, Error> {
        let config = self.config.validated()?;
        let pool = match self.pool {
            Some(pool) => pool,
            None if config.shared_worker => ResamplingPool::shared(&config)?,
            None => Arc::new(ResamplingPool::new(
                &config.worker_thread_name,
                config.teardown_timeout,
            )?),
        };

        let state = Arc::new(ResamplerState {
            component: self.component,
            displays: self.displays,
            dispatcher: self.dispatcher,
            engine: self
                .engine
                .unwrap_or_else(|| Arc::new(FastResizeEngine)),
            images: self.images,
            mask: self.mask,
            algorithm: config.algorithm,
            pool,
            owner: next_owner_id(),
            resampled: Mutex::new(Vec::new()),
            done: AtomicBool::new(false),
            lifetime: CancellationToken::new(),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&state);
        state.dispatcher.post(Box::new(move || {
            if let Some(state) = upgrade_live(&weak) {
                state.try_schedule();
            }
        }));

        Ok(DeferredResampler {
            state,
            debounce: Debouncer::new(config.debounce_delay),
            teardown_timeout: config.teardown_timeout,
        })
    }
}
