//! Shared types for the collage slice pipeline.

use serde::{Deserialize, Serialize};

use crate::detect::DetectError;
use crate::resample::ResampleFilter;

/// Re-export `GrayImage` so detector implementations outside this crate
/// can accept the grayscale copy without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can hold rendered slices
/// and composed canvases without depending on `image` directly.
pub use image::RgbaImage;

/// Re-export the RGBA pixel type for the same reason.
pub use image::Rgba;

/// Upper bound on the number of sources a single collage may combine.
pub const MAX_SOURCES: usize = 4;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` when either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width-over-height ratio rounded to `precision` decimal digits.
    ///
    /// Returns `None` for a zero height.
    #[must_use]
    pub fn rounded_ratio(self, precision: u32) -> Option<f64> {
        if self.height == 0 {
            return None;
        }
        let scale = 10_f64.powi(i32::try_from(precision).unwrap_or(i32::MAX));
        let ratio = f64::from(self.width) / f64::from(self.height);
        Some((ratio * scale).round() / scale)
    }
}

/// An axis-aligned feature box reported by a detector, in the pixel
/// space of the decoded, unscaled source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRegion {
    /// Left edge in pixels.
    pub left: u32,
    /// Top edge in pixels.
    pub top: u32,
    /// Box width in pixels.
    pub width: u32,
    /// Box height in pixels.
    pub height: u32,
    /// Relative importance. Never negative.
    pub weight: f64,
}

impl FeatureRegion {
    /// Create a region weighted by its own area, so larger features
    /// pull the focal point harder.
    #[must_use]
    pub fn from_box(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            weight: f64::from(width) * f64::from(height),
        }
    }

    /// Replace the weight. Negative or NaN weights are clamped to zero.
    #[must_use]
    pub fn with_weight(self, weight: f64) -> Self {
        Self {
            weight: if weight.is_nan() { 0.0 } else { weight.max(0.0) },
            ..self
        }
    }
}

/// A weighted point a crop window should be centered on.
///
/// Coordinates live in the fitted image (source scaled so its height
/// equals the canvas height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocalPoint {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
    /// Combined weight of the regions that produced this point.
    pub weight: f64,
}

/// Where a [`FocalPoint`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocalOrigin {
    /// Weighted centroid of detected feature regions.
    Features,
    /// No features were detected; horizontal center, vertical top.
    TopCenter,
}

/// A crop rectangle expressed as edges, in fitted-image pixels.
///
/// `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    /// Left edge (inclusive).
    pub left: u32,
    /// Top edge (inclusive).
    pub top: u32,
    /// Right edge (exclusive).
    pub right: u32,
    /// Bottom edge (exclusive).
    pub bottom: u32,
}

impl CropWindow {
    /// A window covering an entire image of the given size.
    #[must_use]
    pub const fn full(size: Dimensions) -> Self {
        Self {
            left: 0,
            top: 0,
            right: size.width,
            bottom: size.height,
        }
    }

    /// Window width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Window height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Window size.
    #[must_use]
    pub const fn size(&self) -> Dimensions {
        Dimensions::new(self.width(), self.height())
    }

    /// Whether the window lies entirely within an image of `bounds`.
    #[must_use]
    pub const fn fits_within(&self, bounds: Dimensions) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right <= bounds.width
            && self.bottom <= bounds.height
    }
}

/// The crop/resize plan for one slice of the collage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlicePlan {
    /// Position of the slice in the output, left to right.
    pub index: usize,
    /// Final slice size: slice width by canvas height.
    pub target: Dimensions,
    /// Decoded source size.
    pub source: Dimensions,
    /// Source scaled so its height equals the canvas height.
    pub fitted: Dimensions,
    /// Crop window within the fitted image.
    pub crop: CropWindow,
    /// Point the crop window was centered on.
    pub focal: FocalPoint,
    /// How the focal point was derived.
    pub focal_origin: FocalOrigin,
    /// `true` when the fitted aspect ratio already matched the target
    /// and the whole fitted image is used.
    pub identity: bool,
}

/// Output image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputFormat {
    /// Lossless PNG with alpha.
    Png,
    /// JPEG, alpha flattened.
    Jpeg {
        /// Encoder quality, 1 to 100.
        quality: u8,
    },
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

/// Configuration for collage planning and composition.
///
/// Every field has a default, so a partial JSON document is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollageConfig {
    /// Cache lifetime applied when no source advertises a shorter one.
    pub default_max_age_secs: u64,

    /// Fraction of a feature's height its top edge is raised by before
    /// weighting. Face detectors box the face below the hair line.
    pub hair_offset: f64,

    /// Resampling filter for both the height fit and the final slice
    /// sizing.
    pub resample_filter: ResampleFilter,

    /// Canvas fill color (RGBA) behind the pasted slices.
    pub background: [u8; 4],

    /// Encoding of the composed canvas.
    pub output_format: OutputFormat,

    /// Decimal digits used when comparing the fitted and target aspect
    /// ratios for the identity crop.
    pub aspect_precision: u32,
}

impl CollageConfig {
    /// Default cache lifetime: one day.
    pub const DEFAULT_MAX_AGE_SECS: u64 = 86_400;
    /// Default hair offset (12 % of the feature height).
    pub const DEFAULT_HAIR_OFFSET: f64 = 0.12;
    /// Default resampling filter.
    pub const DEFAULT_RESAMPLE_FILTER: ResampleFilter = ResampleFilter::Lanczos3;
    /// Default canvas background: opaque white.
    pub const DEFAULT_BACKGROUND: [u8; 4] = [255, 255, 255, 255];
    /// Default aspect ratio comparison precision.
    pub const DEFAULT_ASPECT_PRECISION: u32 = 2;

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field
    /// out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.hair_offset) {
            return Err(PipelineError::InvalidConfig(format!(
                "hair_offset must be within [0, 1], got {}",
                self.hair_offset
            )));
        }
        if let OutputFormat::Jpeg { quality } = self.output_format
            && !(1..=100).contains(&quality)
        {
            return Err(PipelineError::InvalidConfig(format!(
                "jpeg quality must be within [1, 100], got {quality}"
            )));
        }
        if self.aspect_precision > 6 {
            return Err(PipelineError::InvalidConfig(format!(
                "aspect_precision must be at most 6, got {}",
                self.aspect_precision
            )));
        }
        Ok(())
    }
}

impl Default for CollageConfig {
    fn default() -> Self {
        Self {
            default_max_age_secs: Self::DEFAULT_MAX_AGE_SECS,
            hair_offset: Self::DEFAULT_HAIR_OFFSET,
            resample_filter: Self::DEFAULT_RESAMPLE_FILTER,
            background: Self::DEFAULT_BACKGROUND,
            output_format: OutputFormat::default(),
            aspect_precision: Self::DEFAULT_ASPECT_PRECISION,
        }
    }
}

/// Errors that can occur while planning, rendering or composing slices.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Failed to encode the composed canvas.
    #[error("failed to encode image: {0}")]
    ImageEncode(#[source] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The decoded source has a zero-length axis.
    #[error("source image has no pixels ({}x{})", .0.width, .0.height)]
    EmptySource(Dimensions),

    /// Configuration is invalid.
    #[error("invalid collage configuration: {0}")]
    InvalidConfig(String),

    /// The feature detector failed.
    #[error("feature detection failed: {0}")]
    Detect(#[from] DetectError),

    /// A computed crop window falls outside the fitted image.
    #[error(
        "crop window {window:?} exceeds fitted image {}x{}",
        .fitted.width,
        .fitted.height
    )]
    CropOutOfBounds {
        /// The offending window.
        window: CropWindow,
        /// Size of the fitted image.
        fitted: Dimensions,
    },

    /// A rendered slice does not have the size its plan promised.
    #[error(
        "slice {index} is {}x{}, expected {}x{}",
        .actual.width,
        .actual.height,
        .expected.width,
        .expected.height
    )]
    SliceMismatch {
        /// Slice position.
        index: usize,
        /// Size from the plan.
        expected: Dimensions,
        /// Size of the rendered image.
        actual: Dimensions,
    },

    /// A slice would be pasted past the right edge of the canvas.
    #[error("slice {index} at x={offset} (width {width}) overflows canvas width {canvas_width}")]
    SliceOverflow {
        /// Slice position.
        index: usize,
        /// Horizontal paste offset.
        offset: u64,
        /// Slice width.
        width: u32,
        /// Canvas width.
        canvas_width: u32,
    },
}
