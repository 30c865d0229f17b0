//! Off-screen host: a component, monitor layout, UI queue and canvas that
//! need no windowing system.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::events::UiTask;
use crate::host::{Component, DisplayInfo, Displays, Interpolation, Surface, TopLevel, UiDispatcher};
use crate::processing::layout::{Point, Rect, RectF};

#[derive(Debug, Clone)]
struct Geometry {
    screen: Rect,
    showing: bool,
    parent_monitor_area: Rect,
    top_level: Option<TopLevel>,
    float_bounds: Option<RectF>,
}

/// Component with host-controlled geometry.
#[derive(Debug)]
pub struct HeadlessComponent {
    name: String,
    geometry: Mutex<Geometry>,
    repaints: AtomicUsize,
}

impl HeadlessComponent {
    /// Visible component at screen origin.
    pub fn new(name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            name: name.into(),
            geometry: Mutex::new(Geometry {
                screen: Rect::new(0, 0, width, height),
                showing: true,
                parent_monitor_area: Rect::default(),
                top_level: None,
                float_bounds: None,
            }),
            repaints: AtomicUsize::new(0),
        }
    }

    fn with_geometry<R>(&self, f: impl FnOnce(&mut Geometry) -> R) -> R {
        let mut guard = self
            .geometry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn set_size(&self, width: i32, height: i32) {
        self.with_geometry(|g| {
            g.screen.width = width;
            g.screen.height = height;
        });
    }

    pub fn set_screen_position(&self, x: i32, y: i32) {
        self.with_geometry(|g| {
            g.screen.x = x;
            g.screen.y = y;
        });
    }

    pub fn set_showing(&self, showing: bool) {
        self.with_geometry(|g| g.showing = showing);
    }

    pub fn set_parent_monitor_area(&self, area: Rect) {
        self.with_geometry(|g| g.parent_monitor_area = area);
    }

    pub fn set_top_level(&self, top: Option<TopLevel>) {
        self.with_geometry(|g| g.top_level = top);
    }

    pub fn set_float_bounds(&self, bounds: Option<RectF>) {
        self.with_geometry(|g| g.float_bounds = bounds);
    }

    pub fn repaint_count(&self) -> usize {
        self.repaints.load(Ordering::SeqCst)
    }
}

impl Component for HeadlessComponent {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn width(&self) -> i32 {
        self.with_geometry(|g| g.screen.width)
    }

    fn height(&self) -> i32 {
        self.with_geometry(|g| g.screen.height)
    }

    fn is_showing(&self) -> bool {
        self.with_geometry(|g| g.showing)
    }

    fn screen_bounds(&self) -> Rect {
        self.with_geometry(|g| g.screen)
    }

    fn parent_monitor_area(&self) -> Rect {
        self.with_geometry(|g| g.parent_monitor_area)
    }

    fn top_level(&self) -> Option<TopLevel> {
        self.with_geometry(|g| g.top_level)
    }

    fn float_bounds(&self) -> Option<RectF> {
        self.with_geometry(|g| g.float_bounds)
    }

    fn repaint(&self) {
        self.repaints.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fixed monitor layout.
#[derive(Debug, Clone, Default)]
pub struct StaticDisplays {
    displays: Vec<DisplayInfo>,
}

impl StaticDisplays {
    pub fn new(displays: Vec<DisplayInfo>) -> Self {
        Self { displays }
    }

    /// One main monitor of the given size and scale at the origin.
    pub fn single(width: i32, height: i32, scale: f64) -> Self {
        Self::new(vec![DisplayInfo {
            bounds: Rect::sized(width, height),
            scale,
            is_main: true,
        }])
    }
}

impl Displays for StaticDisplays {
    fn display_for_point(&self, point: Point) -> Option<DisplayInfo> {
        self.displays
            .iter()
            .find(|d| d.bounds.contains(point))
            .copied()
    }

    fn display_for_rect(&self, rect: Rect) -> Option<DisplayInfo> {
        self.displays
            .iter()
            .filter_map(|d| d.bounds.intersection(&rect).map(|i| (i.area(), d)))
            .max_by_key(|(area, _)| *area)
            .map(|(_, d)| *d)
    }
}

/// UI task queue drained explicitly by the thread that owns it.
#[derive(Debug)]
pub struct QueueDispatcher {
    tx: Sender<UiTask>,
    rx: Receiver<UiTask>,
}

impl QueueDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Run every task queued so far, including ones posted while running.
    /// Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(task) => {
                    task();
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for QueueDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UiDispatcher for QueueDispatcher {
    fn post(&self, task: UiTask) {
        // The receiver lives as long as `self`, so the send cannot fail.
        let _ = self.tx.send(task);
    }
}

/// Draw call recorded by [`CanvasSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Fill(Rgba<u8>),
    Text(String),
    ImageAt { origin: Point, width: u32, height: u32 },
    Stretched { target: RectF, width: u32, height: u32 },
}

/// RGBA canvas that composites draw calls and keeps a log of them.
#[derive(Debug)]
pub struct CanvasSurface {
    canvas: RgbaImage,
    interpolation: Interpolation,
    ops: Vec<DrawOp>,
}

impl CanvasSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            interpolation: Interpolation::default(),
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_canvas(self) -> RgbaImage {
        self.canvas
    }

    fn filter(&self) -> FilterType {
        match self.interpolation {
            Interpolation::Low => FilterType::Nearest,
            Interpolation::Medium => FilterType::Triangle,
            Interpolation::High => FilterType::CatmullRom,
        }
    }
}

impl Surface for CanvasSurface {
    fn set_interpolation(&mut self, quality: Interpolation) {
        self.interpolation = quality;
    }

    fn fill_all(&mut self, colour: Rgba<u8>) {
        let layer = RgbaImage::from_pixel(self.canvas.width(), self.canvas.height(), colour);
        imageops::overlay(&mut self.canvas, &layer, 0, 0);
        self.ops.push(DrawOp::Fill(colour));
    }

    fn draw_text(&mut self, text: &str, _area: Rect, _colour: Rgba<u8>) {
        self.ops.push(DrawOp::Text(text.to_string()));
    }

    fn draw_image_at(&mut self, image: &RgbaImage, origin: Point) {
        imageops::overlay(&mut self.canvas, image, origin.x as i64, origin.y as i64);
        self.ops.push(DrawOp::ImageAt {
            origin,
            width: image.width(),
            height: image.height(),
        });
    }

    fn draw_image_stretched(&mut self, image: &RgbaImage, target: RectF) {
        let area = target.round();
        if !area.is_empty() && image.width() > 0 && image.height() > 0 {
            let scaled = imageops::resize(
                image,
                area.width as u32,
                area.height as u32,
                self.filter(),
            );
            imageops::overlay(&mut self.canvas, &scaled, area.x as i64, area.y as i64);
        }
        self.ops.push(DrawOp::Stretched {
            target,
            width: image.width(),
            height: image.height(),
        });
    }
}
