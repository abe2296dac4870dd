//! Resampling: fitting a source to the canvas height and sizing slices.
//!
//! Every source is first scaled so its height equals the canvas height
//! (aspect ratio preserved), then cropped, then resampled one last time
//! if the crop window differs from the exact slice size.

use std::fmt;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::types::Dimensions;

/// Resampling filter used when scaling sources and slices.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl Default for ResampleFilter {
    fn default() -> Self {
        Self::Lanczos3
    }
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Size of `source` scaled so its height equals `height`, preserving
/// the aspect ratio. The new width is rounded to the nearest pixel.
///
/// A zero-height source has no defined aspect ratio and maps to a zero
/// width. A non-empty source scaled to a non-zero height keeps at least
/// one column, so very thin sources still have pixels to crop from.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fit_height(source: Dimensions, height: u32) -> Dimensions {
    if source.height == 0 {
        return Dimensions::new(0, height);
    }
    let width = (f64::from(source.width) * f64::from(height) / f64::from(source.height)).round();
    let width = if source.width > 0 && height > 0 {
        width.max(1.0)
    } else {
        width
    };
    Dimensions::new(width as u32, height)
}

/// Resample `image` to exactly `size`.
///
/// Returns a copy unchanged when the image already has that size, and
/// an empty buffer of `size` when either axis is zero (no sampling
/// happens in that case).
#[must_use]
pub fn resize_exact(image: &RgbaImage, size: Dimensions, filter: ResampleFilter) -> RgbaImage {
    if size.is_empty() || image.width() == 0 || image.height() == 0 {
        return RgbaImage::new(size.width, size.height);
    }
    if image.dimensions() == (size.width, size.height) {
        return image.clone();
    }
    image::imageops::resize(image, size.width, size.height, filter.to_image_filter())
}
