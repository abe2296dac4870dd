//! Debug overlays showing how a slice was planned.
//!
//! Draws the crop window, the detected feature regions (scaled into the
//! fitted image) and the focal point over the fitted source. Useful for
//! checking why a crop landed where it did.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::resample::{self, ResampleFilter};
use crate::types::{FeatureRegion, SlicePlan};

const WINDOW_COLOR: Rgba<u8> = Rgba([0, 200, 0, 255]);
const REGION_COLOR: Rgba<u8> = Rgba([255, 0, 255, 255]);
const FOCAL_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Render the fitted source with the plan drawn over it.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn annotate(
    source: &RgbaImage,
    regions: &[FeatureRegion],
    plan: &SlicePlan,
    filter: ResampleFilter,
) -> RgbaImage {
    let mut out = resample::resize_exact(source, plan.fitted, filter);
    if plan.fitted.is_empty() {
        return out;
    }

    let ratio = f64::from(plan.fitted.width) / f64::from(plan.source.width.max(1));
    for region in regions {
        let scale = |v: u32| (f64::from(v) * ratio).round() as u32;
        if let Some(rect) = rect(
            scale(region.left),
            scale(region.top),
            scale(region.width),
            scale(region.height),
        ) {
            draw_hollow_rect_mut(&mut out, rect, REGION_COLOR);
        }
    }

    if let Some(rect) = rect(
        plan.crop.left,
        plan.crop.top,
        plan.crop.width(),
        plan.crop.height(),
    ) {
        draw_hollow_rect_mut(&mut out, rect, WINDOW_COLOR);
    }

    draw_cross_mut(
        &mut out,
        FOCAL_COLOR,
        plan.focal.x.round() as i32,
        plan.focal.y.round() as i32,
    );
    out
}

#[allow(clippy::cast_possible_wrap)]
fn rect(left: u32, top: u32, width: u32, height: u32) -> Option<Rect> {
    (width > 0 && height > 0).then(|| Rect::at(left as i32, top as i32).of_size(width, height))
}
