//! Focal point derivation from detected feature regions.

use crate::types::{Dimensions, FeatureRegion, FocalOrigin, FocalPoint};

/// Raise a region's top edge by `offset` times its height, never above
/// the image's top edge.
#[must_use]
pub fn raise_top(top: f64, height: f64, offset: f64) -> f64 {
    height.mul_add(-offset, top).max(0.0)
}

/// Weighted centroid of region centers, in source pixels.
///
/// Each region's top edge is first raised by `hair_offset` of its
/// height. Returns `None` for an empty slice. When every weight is zero
/// the plain mean of the centers is used.
#[must_use]
pub fn center_of_mass(regions: &[FeatureRegion], hair_offset: f64) -> Option<FocalPoint> {
    if regions.is_empty() {
        return None;
    }

    let centers = regions.iter().map(|r| {
        let height = f64::from(r.height);
        let top = raise_top(f64::from(r.top), height, hair_offset);
        (
            f64::from(r.width).mul_add(0.5, f64::from(r.left)),
            height.mul_add(0.5, top),
            r.weight,
        )
    });

    let total_weight: f64 = regions.iter().map(|r| r.weight).sum();
    if total_weight > 0.0 {
        let (sum_x, sum_y) = centers.fold((0.0, 0.0), |(sx, sy), (x, y, w)| {
            (x.mul_add(w, sx), y.mul_add(w, sy))
        });
        Some(FocalPoint {
            x: sum_x / total_weight,
            y: sum_y / total_weight,
            weight: total_weight,
        })
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = regions.len() as f64;
        let (sum_x, sum_y) = centers.fold((0.0, 0.0), |(sx, sy), (x, y, _)| (sx + x, sy + y));
        Some(FocalPoint {
            x: sum_x / count,
            y: sum_y / count,
            weight: 0.0,
        })
    }
}

/// Focal point in fitted-image coordinates.
///
/// With detected regions this is their weighted centroid scaled by
/// `fitted.width / source.width`. Without any, it is the horizontal
/// center of the fitted image at its top edge, so crops keep the upper
/// part of the picture.
#[must_use]
pub fn focal_point(
    regions: &[FeatureRegion],
    source: Dimensions,
    fitted: Dimensions,
    hair_offset: f64,
) -> (FocalPoint, FocalOrigin) {
    match center_of_mass(regions, hair_offset) {
        Some(centroid) if source.width > 0 => {
            let ratio = f64::from(fitted.width) / f64::from(source.width);
            (
                FocalPoint {
                    x: centroid.x * ratio,
                    y: centroid.y * ratio,
                    weight: centroid.weight,
                },
                FocalOrigin::Features,
            )
        }
        _ => (
            FocalPoint {
                x: f64::from(fitted.width) / 2.0,
                y: 0.0,
                weight: 1.0,
            },
            FocalOrigin::TopCenter,
        ),
    }
}
