//! Canvas composition: paste rendered slices side by side.

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::types::{Dimensions, PipelineError, SlicePlan};

/// A composed canvas and where each slice landed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    /// The output image, exactly the requested canvas size.
    pub canvas: RgbaImage,
    /// Horizontal paste offset of each slice, in slice index order.
    pub offsets: Vec<u64>,
}

/// Allocate a `canvas_width × canvas_height` canvas filled with
/// `background` and paste every slice at the cumulative width of the
/// slices before it.
///
/// Slices are placed by their plan index, not by their position in
/// `slices`. Pasting blends with the slice's alpha. Slices must already
/// have their planned size; the composer never resizes.
///
/// Every slice is checked before the first paste, so a failure leaves
/// nothing half-drawn.
///
/// # Errors
///
/// Returns [`PipelineError::SliceMismatch`] if a rendered slice differs
/// from its planned size or from the canvas height, and
/// [`PipelineError::SliceOverflow`] if a slice would extend past the
/// right edge of the canvas.
pub fn compose(
    canvas_width: u32,
    canvas_height: u32,
    background: [u8; 4],
    slices: &[(SlicePlan, RgbaImage)],
) -> Result<Composition, PipelineError> {
    let mut ordered: Vec<&(SlicePlan, RgbaImage)> = slices.iter().collect();
    ordered.sort_by_key(|(plan, _)| plan.index);

    let mut offsets = Vec::with_capacity(ordered.len());
    let mut offset = 0_u64;
    for (plan, rendered) in &ordered {
        let actual = Dimensions::new(rendered.width(), rendered.height());
        if actual != plan.target || actual.height != canvas_height {
            return Err(PipelineError::SliceMismatch {
                index: plan.index,
                expected: Dimensions::new(plan.target.width, canvas_height),
                actual,
            });
        }
        if offset + u64::from(actual.width) > u64::from(canvas_width) {
            return Err(PipelineError::SliceOverflow {
                index: plan.index,
                offset,
                width: actual.width,
                canvas_width,
            });
        }
        offsets.push(offset);
        offset += u64::from(actual.width);
    }

    let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba(background));
    for ((plan, rendered), &x) in ordered.iter().zip(&offsets) {
        let paste_x = i64::try_from(x).unwrap_or(i64::MAX);
        image::imageops::overlay(&mut canvas, rendered, paste_x, 0);
        debug!(index = plan.index, x, width = rendered.width(), "slice pasted");
    }

    Ok(Composition { canvas, offsets })
}
