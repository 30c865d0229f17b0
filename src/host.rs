//! Seams to the host windowing toolkit.
//!
//! The resampler never talks to a real toolkit; it sees the component it
//! decorates, the monitor layout, a way to run code on the UI thread, and a
//! surface to paint on. Everything here may be read from the worker thread
//! except [`Surface`], which only the UI thread touches.

use image::{Rgba, RgbaImage};

use crate::events::UiTask;
use crate::processing::layout::{Point, Rect, RectF};

/// The visual component whose images are being resampled.
pub trait Component: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> String;

    /// Current local width.
    fn width(&self) -> i32;

    /// Current local height.
    fn height(&self) -> i32;

    /// Whether the component and all its parents are visible on screen.
    fn is_showing(&self) -> bool;

    /// Component bounds in screen coordinates.
    fn screen_bounds(&self) -> Rect;

    /// Area of the monitor reported for the parent container. Empty when
    /// unknown.
    fn parent_monitor_area(&self) -> Rect;

    /// The top-level window containing this component, if any.
    fn top_level(&self) -> Option<TopLevel>;

    /// Explicit sub-pixel placement attached by the caller.
    fn float_bounds(&self) -> Option<RectF> {
        None
    }

    /// Ask the host to repaint the component. Called on the UI thread.
    fn repaint(&self);

    fn local_bounds(&self) -> Rect {
        Rect::sized(self.width(), self.height())
    }
}

/// On-screen state of a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevel {
    pub on_desktop: bool,
    pub screen_bounds: Rect,
}

/// A monitor as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayInfo {
    pub bounds: Rect,
    pub scale: f64,
    pub is_main: bool,
}

/// Monitor enumeration.
pub trait Displays: Send + Sync {
    fn display_for_point(&self, point: Point) -> Option<DisplayInfo>;

    fn display_for_rect(&self, rect: Rect) -> Option<DisplayInfo>;
}

/// Runs callbacks once, soon, on the UI thread.
pub trait UiDispatcher: Send + Sync {
    fn post(&self, task: UiTask);
}

/// Interpolation used when the surface scales an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Low,
    #[default]
    Medium,
    High,
}

/// Paint target handed to [`DeferredResampler::draw`](crate::DeferredResampler::draw).
pub trait Surface {
    fn set_interpolation(&mut self, quality: Interpolation);

    /// Blend `colour` over the whole surface.
    fn fill_all(&mut self, colour: Rgba<u8>);

    /// Draw `text` centred in `area`.
    fn draw_text(&mut self, text: &str, area: Rect, colour: Rgba<u8>);

    /// Draw `image` unscaled with its top-left corner at `origin`.
    fn draw_image_at(&mut self, image: &RgbaImage, origin: Point);

    /// Draw `image` stretched to fill `target`.
    fn draw_image_stretched(&mut self, image: &RgbaImage, target: RectF);
}
