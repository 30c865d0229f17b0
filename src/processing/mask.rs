//! Masked dual-quality compositing.
//!
//! A mask selects where the high-quality resample is kept. Everywhere
//! else the output stays transparent so the caller can layer it over a
//! cheaper full-size background.

use image::RgbaImage;

use super::resize::{ResizeAlgorithm, ResizeEngine, rescale_stencil};

/// Resample `image` to `width`×`height`, restricted to the non-transparent
/// area of `mask` when one is given.
///
/// Returns `None` for non-positive targets, an empty source, or when the
/// engine fails or, with a mask, returns an image of the wrong size.
pub fn resample(
    engine: &dyn ResizeEngine,
    image: &RgbaImage,
    mask: Option<&RgbaImage>,
    width: i32,
    height: i32,
    algorithm: ResizeAlgorithm,
) -> Option<RgbaImage> {
    if width <= 0 || height <= 0 || is_null(image) {
        return None;
    }
    let (width, height) = (width as u32, height as u32);

    let Some(mask) = mask.filter(|m| !is_null(m)) else {
        return engine.resize(image, width, height, algorithm);
    };

    let high_quality = engine
        .resize(image, width, height, algorithm)
        .filter(|resized| resized.dimensions() == (width, height))?;
    let stencil = rescale_stencil(mask, width, height);
    Some(apply_stencil(&high_quality, &stencil))
}

/// Copy pixels of `source` where `stencil` alpha is non-zero; all other
/// output pixels are transparent black.
pub fn apply_stencil(source: &RgbaImage, stencil: &RgbaImage) -> RgbaImage {
    let mut out = RgbaImage::new(source.width(), source.height());
    for (x, y, px) in out.enumerate_pixels_mut() {
        if stencil.get_pixel_checked(x, y).is_some_and(|m| m[3] > 0) {
            *px = *source.get_pixel(x, y);
        }
    }
    out
}

fn is_null(image: &RgbaImage) -> bool {
    image.width() == 0 || image.height() == 0
}
