//! Display scale oracle.
//!
//! High-quality resampling only pays off when the component is shown on a
//! 1:1 monitor; under any other scale the OS rescales the whole window and
//! the cheap stretch path is used instead.

use tracing::debug;

use crate::host::{Component, DisplayInfo, Displays};
use crate::processing::layout::Rect;

/// Find the monitor currently showing `component`.
///
/// Strategies, in order: the monitor under the component's on-screen centre,
/// the monitor intersecting its screen bounds (both only while showing with a
/// non-zero width), the parent monitor area, and the centre of the top-level
/// window when it is on the desktop.
pub fn component_display(
    component: &dyn Component,
    displays: &dyn Displays,
) -> Option<DisplayInfo> {
    let bounds = component.screen_bounds();
    if component.is_showing() && bounds.width > 0 {
        if let Some(display) = displays.display_for_point(bounds.centre()) {
            return Some(display);
        }
        if let Some(display) = displays.display_for_rect(bounds) {
            return Some(display);
        }
    }

    let monitor_area = component.parent_monitor_area();
    if !monitor_area.is_empty() {
        if let Some(display) = displays.display_for_rect(monitor_area) {
            return Some(display);
        }
    }

    if let Some(top) = component.top_level() {
        if top.on_desktop && top.screen_bounds.width > 0 {
            if let Some(display) = displays.display_for_point(top.screen_bounds.centre()) {
                return Some(display);
            }
        }
    }

    debug!("'{}': failed to detect display", component.name());
    None
}

/// Scale factor of the monitor showing `component`; `None` when unknown.
pub fn effective_scale(component: &dyn Component, displays: &dyn Displays) -> Option<f64> {
    component_display(component, displays).map(|d| d.scale)
}

/// True only for a known scale of exactly 1.0 (within float tolerance).
pub fn should_use_high_quality(scale: Option<f64>) -> bool {
    scale.is_some_and(|s| approximately_equal(s, 1.0))
}

/// Scale check for an arbitrary screen rectangle.
pub fn is_resampling_needed_for_rect(displays: &dyn Displays, rect: Rect) -> bool {
    should_use_high_quality(displays.display_for_rect(rect).map(|d| d.scale))
}

fn approximately_equal(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    diff <= f64::MIN_POSITIVE || diff <= f64::EPSILON * a.abs().max(b.abs())
}
