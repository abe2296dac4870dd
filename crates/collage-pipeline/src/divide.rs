//! Splitting the canvas width between slices.
//!
//! Integer division leaves a remainder when the canvas width is not a
//! multiple of the slice count. Every slice but the last gets the floor
//! of the division; the last slice absorbs the remainder, so dividing
//! 301px in three parts gives 100 + 100 + 101.

use serde::{Deserialize, Serialize};

/// Widths produced by [`divide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceWidths {
    /// Width of every slice except the last.
    pub base: u32,
    /// Width of the last slice (`base` plus the remainder).
    pub last: u32,
    /// Number of slices.
    pub parts: u32,
}

impl SliceWidths {
    /// Width of the slice at `index`.
    #[must_use]
    pub const fn width_of(&self, index: usize) -> u32 {
        if index + 1 >= self.parts as usize {
            self.last
        } else {
            self.base
        }
    }

    /// Widths of all slices in order.
    #[must_use]
    pub fn widths(&self) -> Vec<u32> {
        (0..self.parts as usize).map(|i| self.width_of(i)).collect()
    }
}

/// Divide `total_width` into `parts` slices.
///
/// `parts` of zero is treated as one; callers validate the source count
/// before planning. A zero `total_width` yields zero-width slices.
#[must_use]
pub const fn divide(total_width: u32, parts: u32) -> SliceWidths {
    let parts = if parts == 0 { 1 } else { parts };
    let base = total_width / parts;
    let last = total_width - base * (parts - 1);
    SliceWidths { base, last, parts }
}
