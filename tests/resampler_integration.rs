use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use deferred_resampler::events::ComponentEvent;
use deferred_resampler::host::{Component, Interpolation};
use deferred_resampler::platform::headless::{
    CanvasSurface, DrawOp, HeadlessComponent, QueueDispatcher, StaticDisplays,
};
use deferred_resampler::processing::layout::{Point, Rect, RectF};
use deferred_resampler::processing::resize::{FastResizeEngine, ResizeAlgorithm, ResizeEngine};
use deferred_resampler::resampler::{INVALID_INDEX_LABEL, RESAMPLING_FAILED_LABEL};
use deferred_resampler::tasks::pool::ResamplingPool;
use deferred_resampler::{DeferredResampler, ResamplerConfig};
use image::{Rgba, RgbaImage};

const PLACEHOLDER: Rgba<u8> = Rgba([0x55, 0x55, 0x55, 77]);

fn assert_close(actual: &Rgba<u8>, expected: [u8; 4]) {
    for (a, e) in actual.0.iter().zip(expected) {
        assert!(a.abs_diff(e) <= 1, "{actual:?} vs {expected:?}");
    }
}

/// Records every target size it is asked for.
#[derive(Default)]
struct RecordingEngine {
    targets: Mutex<Vec<(u32, u32)>>,
    fail: bool,
    delay: Duration,
    panic_once: AtomicBool,
}

impl RecordingEngine {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn panicking_once() -> Self {
        Self {
            panic_once: AtomicBool::new(true),
            ..Default::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn targets(&self) -> Vec<(u32, u32)> {
        self.targets.lock().unwrap().clone()
    }
}

impl ResizeEngine for RecordingEngine {
    fn resize(
        &self,
        image: &RgbaImage,
        width: u32,
        height: u32,
        algorithm: ResizeAlgorithm,
    ) -> Option<RgbaImage> {
        self.targets.lock().unwrap().push((width, height));
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("engine blew up");
        }
        thread::sleep(self.delay);
        if self.fail {
            return None;
        }
        FastResizeEngine.resize(image, width, height, algorithm)
    }
}

struct Harness {
    component: Arc<HeadlessComponent>,
    dispatcher: Arc<QueueDispatcher>,
    engine: Arc<RecordingEngine>,
    resampler: DeferredResampler,
}

impl Harness {
    fn new(size: (i32, i32), scale: f64, images: usize, engine: RecordingEngine) -> Self {
        Self::build(size, scale, images, engine, None)
    }

    fn on_pool(size: (i32, i32), engine: RecordingEngine, pool: Arc<ResamplingPool>) -> Self {
        Self::build(size, 1.0, 1, engine, Some(pool))
    }

    fn build(
        size: (i32, i32),
        scale: f64,
        images: usize,
        engine: RecordingEngine,
        pool: Option<Arc<ResamplingPool>>,
    ) -> Self {
        let component = Arc::new(HeadlessComponent::new("harness", size.0, size.1));
        let dispatcher = Arc::new(QueueDispatcher::new());
        let engine = Arc::new(engine);
        let config = ResamplerConfig {
            shared_worker: false,
            ..Default::default()
        };
        let mut builder = DeferredResampler::builder(
            component.clone(),
            Arc::new(StaticDisplays::single(1920, 1080, scale)),
            dispatcher.clone(),
        )
        .images((0..images).map(|_| RgbaImage::from_pixel(800, 600, Rgba([40, 80, 120, 255]))))
        .config(config)
        .engine(engine.clone());
        if let Some(pool) = pool {
            builder = builder.pool(pool);
        }
        let resampler = builder.build().unwrap();
        Self {
            component,
            dispatcher,
            engine,
            resampler,
        }
    }

    /// Pump the UI queue until `cond` holds or two seconds pass.
    fn pump_until(&self, mut cond: impl FnMut(&Self) -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            self.dispatcher.run_pending();
            if cond(self) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond(self)
    }

    fn draw(&self, index: usize) -> CanvasSurface {
        let mut surface = CanvasSurface::new(
            self.component.width().max(1) as u32,
            self.component.height().max(1) as u32,
        );
        self.resampler.draw(&mut surface, index);
        surface
    }
}

#[test]
fn unscaled_display_swaps_to_resampled_image() {
    let h = Harness::new((400, 300), 1.0, 1, RecordingEngine::default());
    assert!(h.pump_until(|h| h.component.repaint_count() == 1));
    assert!(h.resampler.is_resampling_done());
    assert!(h.resampler.should_display_resampled());
    assert_eq!(h.resampler.resampled_size(0), Some((400, 300)));

    let surface = h.draw(0);
    assert_eq!(surface.interpolation(), Interpolation::High);
    assert_eq!(
        surface.ops(),
        [DrawOp::ImageAt {
            origin: Point::new(0, 0),
            width: 400,
            height: 300,
        }]
    );
    assert_close(surface.canvas().get_pixel(399, 299), [40, 80, 120, 255]);
}

#[test]
fn scaled_display_stretches_the_original() {
    let h = Harness::new((400, 300), 2.0, 1, RecordingEngine::default());
    h.dispatcher.run_pending();
    assert!(!h.resampler.try_schedule_resampling());
    thread::sleep(Duration::from_millis(50));
    assert!(h.engine.targets().is_empty());
    assert!(!h.resampler.is_resampling_done());

    let surface = h.draw(0);
    assert_eq!(
        surface.ops(),
        [DrawOp::Stretched {
            target: RectF::new(0.0, 0.0, 400.0, 300.0),
            width: 800,
            height: 600,
        }]
    );
}

#[test]
fn float_bounds_override_stretch_target() {
    let h = Harness::new((400, 300), 1.5, 1, RecordingEngine::default());
    let bounds = RectF::new(0.5, 0.25, 399.5, 299.75);
    h.component.set_float_bounds(Some(bounds));
    let surface = h.draw(0);
    assert!(matches!(
        surface.ops(),
        [DrawOp::Stretched { target, .. }] if *target == bounds
    ));
}

#[test]
fn out_of_range_index_draws_placeholder() {
    let h = Harness::new((400, 300), 1.0, 3, RecordingEngine::default());
    assert_eq!(h.resampler.image_count(), 3);
    let surface = h.draw(5);
    assert_eq!(
        surface.ops(),
        [
            DrawOp::Fill(PLACEHOLDER),
            DrawOp::Text(INVALID_INDEX_LABEL.to_string()),
        ]
    );
}

#[test]
fn failed_resample_draws_placeholder() {
    let h = Harness::new((120, 90), 1.0, 2, RecordingEngine::failing());
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));
    assert_eq!(h.engine.targets(), [(120, 90), (120, 90)]);
    assert_eq!(h.resampler.resampled_size(1), None);

    let surface = h.draw(1);
    assert_eq!(
        surface.ops(),
        [
            DrawOp::Fill(PLACEHOLDER),
            DrawOp::Text(RESAMPLING_FAILED_LABEL.to_string()),
        ]
    );
}

#[test]
fn panicking_pass_does_not_block_retry_at_same_size() {
    let h = Harness::new((120, 90), 1.0, 1, RecordingEngine::panicking_once());
    assert!(h.pump_until(|h| !h.engine.targets().is_empty()));
    assert!(!h.resampler.is_resampling_done());

    assert!(h.pump_until(|h| h.resampler.try_schedule_resampling()));
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));
    assert_eq!(h.engine.targets(), [(120, 90), (120, 90)]);
    assert_eq!(h.resampler.resampled_size(0), Some((120, 90)));
}

#[test]
fn dropping_a_queued_resampler_leaves_the_running_one_alone() {
    let pool = Arc::new(ResamplingPool::new("queue-shared", Duration::from_secs(1)).unwrap());
    let a = Harness::on_pool(
        (200, 100),
        RecordingEngine::slow(Duration::from_millis(150)),
        pool.clone(),
    );
    assert!(a.pump_until(|a| !a.engine.targets().is_empty()));

    let b = Harness::on_pool((200, 100), RecordingEngine::default(), pool.clone());
    b.dispatcher.run_pending();
    assert_eq!(pool.pending_jobs(), 1);
    let b_engine = b.engine.clone();
    drop(b);
    assert_eq!(pool.pending_jobs(), 0);

    assert!(a.pump_until(|a| a.resampler.is_resampling_done()));
    assert_eq!(a.resampler.resampled_size(0), Some((200, 100)));
    thread::sleep(Duration::from_millis(50));
    assert!(b_engine.targets().is_empty());
    assert_eq!(a.engine.targets().len(), 1);
}

#[test]
fn resize_burst_runs_one_job_for_final_size() {
    let mut h = Harness::new((0, 0), 1.0, 1, RecordingEngine::default());
    h.dispatcher.run_pending();
    assert!(h.engine.targets().is_empty());

    let t0 = Instant::now();
    h.component.set_size(500, 300);
    h.resampler.handle_event(ComponentEvent::resized(), t0);
    h.component.set_size(600, 300);
    h.resampler.handle_event(ComponentEvent::resized(), t0 + Duration::from_millis(100));
    assert_eq!(
        h.resampler.next_deadline(),
        Some(t0 + Duration::from_millis(600))
    );

    assert!(!h.resampler.tick(t0 + Duration::from_millis(550)));
    assert!(h.resampler.tick(t0 + Duration::from_millis(600)));
    assert!(!h.resampler.tick(t0 + Duration::from_millis(1200)));
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));
    assert_eq!(h.engine.targets(), [(600, 300)]);
    assert_eq!(h.resampler.resampled_size(0), Some((600, 300)));
}

#[test]
fn pure_move_is_ignored() {
    let mut h = Harness::new((200, 100), 1.0, 1, RecordingEngine::default());
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));

    h.component.set_screen_position(300, 200);
    h.resampler.handle_event(ComponentEvent::moved(), Instant::now());
    assert!(h.resampler.is_resampling_done());
    assert_eq!(h.resampler.next_deadline(), None);
    assert_eq!(h.engine.targets().len(), 1);
}

#[test]
fn resize_drops_readiness_until_next_pass() {
    let mut h = Harness::new((200, 100), 1.0, 1, RecordingEngine::default());
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));

    let t0 = Instant::now();
    h.component.set_size(300, 150);
    h.resampler.handle_event(ComponentEvent::resized(), t0);
    assert!(!h.resampler.is_resampling_done());
    assert!(matches!(h.draw(0).ops(), [DrawOp::Stretched { .. }]));

    assert!(h.resampler.tick(t0 + ResamplerConfig::DEFAULT_DELAY));
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));
    assert_eq!(h.resampler.resampled_size(0), Some((300, 150)));
}

#[test]
fn masked_resample_is_transparent_outside_mask() {
    let component = Arc::new(HeadlessComponent::new("masked", 100, 100));
    let dispatcher = Arc::new(QueueDispatcher::new());
    let mask = RgbaImage::from_fn(10, 10, |_, y| {
        Rgba([0, 0, 0, if y < 5 { 255 } else { 0 }])
    });
    let resampler = DeferredResampler::builder(
        component.clone(),
        Arc::new(StaticDisplays::single(1920, 1080, 1.0)),
        dispatcher.clone(),
    )
    .image(RgbaImage::from_pixel(50, 50, Rgba([200, 10, 10, 255])))
    .mask(Some(mask))
    .build()
    .unwrap();

    let start = Instant::now();
    while !resampler.is_resampling_done() && start.elapsed() < Duration::from_secs(2) {
        dispatcher.run_pending();
        thread::sleep(Duration::from_millis(5));
    }
    let mut surface = CanvasSurface::new(100, 100);
    resampler.draw(&mut surface, 0);
    assert_close(surface.canvas().get_pixel(50, 20), [200, 10, 10, 255]);
    assert_eq!(surface.canvas().get_pixel(50, 80)[3], 0);
}

#[test]
fn hidden_component_uses_parent_monitor_area() {
    let h = Harness::new((400, 300), 1.0, 1, RecordingEngine::default());
    h.component.set_showing(false);
    h.component.set_screen_position(-5000, -5000);
    h.component.set_parent_monitor_area(Rect::new(10, 10, 100, 100));
    assert!(h.pump_until(|h| h.resampler.is_resampling_done()));
}

#[tokio::test]
async fn timer_loop_settles_after_quiet_period() {
    let component = Arc::new(HeadlessComponent::new("async", 320, 240));
    let dispatcher = Arc::new(QueueDispatcher::new());
    let mut resampler = DeferredResampler::builder(
        component.clone(),
        Arc::new(StaticDisplays::single(1920, 1080, 1.0)),
        dispatcher.clone(),
    )
    .image(RgbaImage::from_pixel(64, 64, Rgba([1, 1, 1, 255])))
    .config(ResamplerConfig {
        debounce_delay: Duration::from_millis(30),
        shared_worker: false,
        ..Default::default()
    })
    .build()
    .unwrap();
    dispatcher.run_pending();

    component.set_size(160, 120);
    resampler.handle_event(ComponentEvent::resized(), Instant::now());

    let give_up = Instant::now() + Duration::from_secs(3);
    while Instant::now() < give_up {
        dispatcher.run_pending();
        resampler.tick(Instant::now());
        if resampler.next_deadline().is_none() && resampler.is_resampling_done() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(resampler.is_resampling_done());
    assert_eq!(resampler.resampled_size(0), Some((160, 120)));
}
