//! Feature-aware crop planning and slice rendering.
//!
//! A slice is produced in three steps:
//!
//! 1. Fit: scale the source so its height equals the canvas height.
//! 2. Crop: cut the largest window with the slice's aspect ratio out of
//!    the fitted image, centered on the focal point and clamped to the
//!    image on each axis independently.
//! 3. Size: resample the window to exactly `slice_width × canvas_height`
//!    when it is not already that size.
//!
//! When the fitted image already has the slice's aspect ratio (compared
//! at [`CollageConfig::aspect_precision`] decimal digits) the crop is
//! skipped and the whole fitted image is used.

use image::RgbaImage;
use tracing::debug;

use crate::codec;
use crate::detect::FeatureDetector;
use crate::focal;
use crate::resample::{self, ResampleFilter};
use crate::types::{
    CollageConfig, CropWindow, Dimensions, FeatureRegion, FocalPoint, PipelineError, SlicePlan,
};

/// Compute the crop/resize plan for one slice.
///
/// `regions` are in the pixel space of `source`.
///
/// # Errors
///
/// Returns [`PipelineError::EmptySource`] if `source` has no pixels and
/// [`PipelineError::CropOutOfBounds`] if the computed window would not
/// fit the fitted image.
pub fn plan(
    index: usize,
    source: &RgbaImage,
    regions: &[FeatureRegion],
    canvas_height: u32,
    slice_width: u32,
    config: &CollageConfig,
) -> Result<SlicePlan, PipelineError> {
    let source_size = Dimensions::new(source.width(), source.height());
    if source_size.is_empty() {
        return Err(PipelineError::EmptySource(source_size));
    }

    let target = Dimensions::new(slice_width, canvas_height);
    let fitted = resample::fit_height(source_size, canvas_height);
    let (focal, focal_origin) =
        focal::focal_point(regions, source_size, fitted, config.hair_offset);

    let (crop, identity) = if target.is_empty() || fitted.is_empty() {
        (CropWindow::full(Dimensions::new(0, 0)), false)
    } else if fitted.rounded_ratio(config.aspect_precision)
        == target.rounded_ratio(config.aspect_precision)
    {
        (CropWindow::full(fitted), true)
    } else {
        (crop_window(fitted, target, focal), false)
    };

    if !crop.fits_within(fitted) {
        return Err(PipelineError::CropOutOfBounds {
            window: crop,
            fitted,
        });
    }

    debug!(
        index,
        source = ?source_size,
        fitted = ?fitted,
        crop = ?crop,
        identity,
        origin = ?focal_origin,
        "slice planned"
    );

    Ok(SlicePlan {
        index,
        target,
        source: source_size,
        fitted,
        crop,
        focal,
        focal_origin,
        identity,
    })
}

/// Largest window of `target`'s aspect ratio inside `fitted`, centered
/// on `focal` and clamped to the image bounds.
///
/// Both sizes must be non-empty.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
pub fn crop_window(fitted: Dimensions, target: Dimensions, focal: FocalPoint) -> CropWindow {
    let (fw, fh) = (f64::from(fitted.width), f64::from(fitted.height));
    let (tw, th) = (f64::from(target.width), f64::from(target.height));

    let (crop_width, crop_height) = if tw / fw > th / fh {
        let height = (fw * th / tw).round() as u32;
        (fitted.width, height.min(fitted.height))
    } else {
        let width = (tw * fh / th).ceil() as u32;
        (width.min(fitted.width), fitted.height)
    };

    let left = clamp_edge(focal.x, crop_width, fitted.width);
    let top = clamp_edge(focal.y, crop_height, fitted.height);

    CropWindow {
        left,
        top,
        right: (left + crop_width).min(fitted.width),
        bottom: (top + crop_height).min(fitted.height),
    }
}

/// Leading edge of a span of `span` pixels centered on `center`, kept
/// within `[0, extent - span]`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_edge(center: f64, span: u32, extent: u32) -> u32 {
    let max = f64::from(extent.saturating_sub(span));
    let edge = (center - f64::from(span) / 2.0).clamp(0.0, max);
    edge.round() as u32
}

/// Render a planned slice: fit, crop, then size to the target exactly.
#[must_use]
pub fn render(source: &RgbaImage, plan: &SlicePlan, filter: ResampleFilter) -> RgbaImage {
    if plan.target.is_empty() || plan.fitted.is_empty() {
        return RgbaImage::new(plan.target.width, plan.target.height);
    }

    let fitted = resample::resize_exact(source, plan.fitted, filter);
    let cropped = if plan.identity {
        fitted
    } else {
        image::imageops::crop_imm(
            &fitted,
            plan.crop.left,
            plan.crop.top,
            plan.crop.width(),
            plan.crop.height(),
        )
        .to_image()
    };
    resample::resize_exact(&cropped, plan.target, filter)
}

/// A planned and rendered slice, with the regions the plan was built
/// from.
#[derive(Debug, Clone)]
pub struct RenderedSlice {
    /// How the slice was cut out of its source.
    pub plan: SlicePlan,
    /// Detected regions, in source pixel space.
    pub regions: Vec<FeatureRegion>,
    /// The slice pixels, exactly `plan.target` in size.
    pub image: RgbaImage,
}

/// Detect features in `source`, plan its slice and render it.
///
/// Detection is skipped for a zero-size slice; there is nothing to
/// place.
///
/// # Errors
///
/// Returns [`PipelineError::Detect`] if the detector fails, or any
/// error from [`plan`].
pub fn process_slice(
    index: usize,
    source: &RgbaImage,
    detector: &dyn FeatureDetector,
    canvas_height: u32,
    slice_width: u32,
    config: &CollageConfig,
) -> Result<RenderedSlice, PipelineError> {
    let regions = if canvas_height == 0 || slice_width == 0 {
        Vec::new()
    } else {
        detector.detect(&codec::to_gray(source))?
    };
    let plan = plan(index, source, &regions, canvas_height, slice_width, config)?;
    let image = render(source, &plan, config.resample_filter);
    Ok(RenderedSlice {
        plan,
        regions,
        image,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::detect::{FixedFeatures, NoFeatures};
    use crate::types::FocalOrigin;

    fn gray_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([128, 128, 128, 255]))
    }

    /// Left half red, right half blue.
    fn split_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn single_slice_without_features_aligns_top_center() {
        // 300x200 canvas, one 600x800 portrait source.
        let source = gray_image(600, 800);
        let plan = plan(0, &source, &[], 200, 300, &CollageConfig::default()).unwrap();

        assert_eq!(plan.focal_origin, FocalOrigin::TopCenter);
        assert_eq!(plan.fitted, Dimensions::new(150, 200));
        assert_eq!(plan.target, Dimensions::new(300, 200));
        // Fitted image is narrower than the slice: full width, top band.
        assert_eq!(
            plan.crop,
            CropWindow {
                left: 0,
                top: 0,
                right: 150,
                bottom: 100,
            }
        );
        assert!(!plan.identity);
    }

    #[test]
    fn landscape_source_without_features_is_cropped_at_center() {
        let source = gray_image(800, 200);
        let plan = plan(0, &source, &[], 200, 150, &CollageConfig::default()).unwrap();
        assert_eq!(plan.fitted, Dimensions::new(800, 200));
        assert_eq!(plan.crop.size(), Dimensions::new(150, 200));
        // 400 - 75 = 325
        assert_eq!(plan.crop.left, 325);
    }

    #[test]
    fn weighted_faces_move_crop_off_center() {
        let source = gray_image(800, 200);
        let regions = [
            FeatureRegion::from_box(40, 50, 60, 60).with_weight(10.0),
            FeatureRegion::from_box(600, 50, 40, 40).with_weight(1.0),
        ];
        let config = CollageConfig::default();
        let centered = plan(0, &source, &[], 200, 150, &config).unwrap();
        let focused = plan(0, &source, &regions, 200, 150, &config).unwrap();

        assert_eq!(focused.focal_origin, FocalOrigin::Features);
        // (70 * 10 + 620) / 11 = 120 -> left = 120 - 75 = 45
        assert_eq!(focused.crop.left, 45);
        assert!(centered.crop.left.abs_diff(focused.crop.left) > 100);
    }

    #[test]
    fn crop_window_is_clamped_to_bounds() {
        let fitted = Dimensions::new(400, 200);
        let target = Dimensions::new(100, 200);
        let right = crop_window(
            fitted,
            target,
            FocalPoint {
                x: 395.0,
                y: 0.0,
                weight: 1.0,
            },
        );
        assert_eq!((right.left, right.right), (300, 400));

        let left = crop_window(
            fitted,
            target,
            FocalPoint {
                x: -50.0,
                y: 500.0,
                weight: 1.0,
            },
        );
        assert_eq!((left.left, left.right), (0, 100));
        assert_eq!((left.top, left.bottom), (0, 200));
    }

    #[test]
    fn matching_aspect_ratio_skips_crop() {
        let source = gray_image(600, 400);
        let plan = plan(0, &source, &[], 200, 300, &CollageConfig::default()).unwrap();
        assert!(plan.identity);
        assert_eq!(plan.crop, CropWindow::full(Dimensions::new(300, 200)));
    }

    #[test]
    fn near_matching_aspect_ratio_within_rounding_skips_crop() {
        // 1001x667 fits to 300x200 (ratio 1.50), same as the slice.
        let source = gray_image(1001, 667);
        let plan = plan(0, &source, &[], 200, 300, &CollageConfig::default()).unwrap();
        assert!(plan.identity);
        let rendered = render(&source, &plan, ResampleFilter::Triangle);
        assert_eq!(rendered.dimensions(), (300, 200));
    }

    #[test]
    fn rendered_slice_has_target_size() {
        for (w, h) in [(600, 800), (800, 200), (37, 999), (1200, 1200)] {
            let source = gray_image(w, h);
            let slice = process_slice(
                0,
                &source,
                &NoFeatures,
                200,
                101,
                &CollageConfig::default(),
            )
            .unwrap();
            assert_eq!(slice.image.dimensions(), (101, 200), "source {w}x{h}");
            assert!(slice.plan.crop.fits_within(slice.plan.fitted));
        }
    }

    #[test]
    fn render_follows_focal_point() {
        // Face on the blue half: the slice should come out blue.
        let source = split_image(800, 200);
        let detector = FixedFeatures::new(vec![FeatureRegion::from_box(600, 50, 50, 50)]);
        let slice = process_slice(
            0,
            &source,
            &detector,
            200,
            100,
            &CollageConfig::default(),
        )
        .unwrap();
        assert_eq!(slice.regions.len(), 1);
        let px = slice.image.get_pixel(50, 100);
        assert!(px[2] > 200 && px[0] < 50, "expected blue, got {px:?}");
    }

    #[test]
    fn thin_source_fills_its_slice() {
        // 2x1000 fits to 1x200 rather than collapsing to zero width.
        let source = RgbaImage::from_pixel(2, 1000, image::Rgba([0, 0, 255, 255]));
        let slice = process_slice(
            0,
            &source,
            &NoFeatures,
            200,
            150,
            &CollageConfig::default(),
        )
        .unwrap();
        assert_eq!(slice.plan.fitted, Dimensions::new(1, 200));
        assert!(!slice.plan.crop.size().is_empty());
        assert_eq!(slice.image.dimensions(), (150, 200));
        let px = slice.image.get_pixel(75, 100);
        assert!(px[2] > 200 && px[0] < 50, "expected blue, got {px:?}");
    }

    #[test]
    fn zero_width_slice_is_empty() {
        let source = gray_image(100, 100);
        let slice = process_slice(
            0,
            &source,
            &NoFeatures,
            200,
            0,
            &CollageConfig::default(),
        )
        .unwrap();
        assert_eq!(slice.image.dimensions(), (0, 200));
        assert_eq!(slice.plan.crop.size(), Dimensions::new(0, 0));
    }

    #[test]
    fn empty_source_is_rejected() {
        let source = RgbaImage::new(0, 10);
        let result = plan(0, &source, &[], 200, 100, &CollageConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptySource(_))));
    }

    #[test]
    fn planning_is_deterministic() {
        let source = split_image(640, 480);
        let detector = FixedFeatures::new(vec![FeatureRegion::from_box(10, 10, 80, 80)]);
        let config = CollageConfig::default();
        let a = process_slice(0, &source, &detector, 200, 75, &config).unwrap();
        let b = process_slice(0, &source, &detector, 200, 75, &config).unwrap();
        assert_eq!(a.plan, b.plan);
        assert_eq!(a.image, b.image);
    }
}
