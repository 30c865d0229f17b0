use fast_image_resize as fir;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::Deserialize;
use tracing::warn;

/// Resampling strategy handed to a [`ResizeEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeAlgorithm {
    Fast,
    Bilinear,
    #[default]
    HighQuality,
}

impl ResizeAlgorithm {
    fn to_fast_alg(self) -> fir::ResizeAlg {
        match self {
            Self::Fast => fir::ResizeAlg::Nearest,
            Self::Bilinear => fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
            Self::HighQuality => fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3),
        }
    }
}

/// The resize kernel. Pure and synchronous; `None` means the engine could
/// not produce an image.
pub trait ResizeEngine: Send + Sync {
    fn resize(
        &self,
        image: &RgbaImage,
        width: u32,
        height: u32,
        algorithm: ResizeAlgorithm,
    ) -> Option<RgbaImage>;
}

/// [`ResizeEngine`] backed by `fast_image_resize`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FastResizeEngine;

impl ResizeEngine for FastResizeEngine {
    fn resize(
        &self,
        image: &RgbaImage,
        width: u32,
        height: u32,
        algorithm: ResizeAlgorithm,
    ) -> Option<RgbaImage> {
        match resize_rgba(image, width, height, algorithm) {
            Ok(resized) => Some(resized),
            Err(err) => {
                warn!(
                    "resize {}x{} -> {}x{} failed: {err:#}",
                    image.width(),
                    image.height(),
                    width,
                    height
                );
                None
            }
        }
    }
}

fn resize_rgba(
    source: &RgbaImage,
    target_w: u32,
    target_h: u32,
    algorithm: ResizeAlgorithm,
) -> anyhow::Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        anyhow::bail!("resize dimensions must be positive");
    }
    if source.width() == 0 || source.height() == 0 {
        anyhow::bail!("source image is empty");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new().resize_alg(algorithm.to_fast_alg());
    let mut resizer = fir::Resizer::new();
    resizer.resize(&src_view, &mut dst_image, Some(&options))?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("resized buffer has unexpected length"))
}

/// Cheap nearest-neighbour rescale for stencils, where only the
/// zero/non-zero alpha boundary matters.
pub fn rescale_stencil(mask: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if mask.width() == width && mask.height() == height {
        return mask.clone();
    }
    imageops::resize(mask, width, height, FilterType::Nearest)
}
