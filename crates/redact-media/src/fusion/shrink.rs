//! Class-aware box shrinking.
//!
//! Detector boxes fit loosely around anatomy; the region actually worth
//! obscuring is a centered sub-rectangle. Ratios come per class from
//! [`ShrinkRatios`] and give the fraction of each dimension trimmed off,
//! split evenly between both sides.

use redact_models::{Region, RegionClass, RegionSource, ShrinkRatios};

/// Shrink a raw detection box to its redaction-relevant sub-region.
///
/// The class ratio is the fraction of width/height removed, so a `(0.70,
/// 0.55)` ratio leaves a 30% x 45% centered core. Returns `None` for boxes
/// under the minimum size in either dimension or boxes that collapse to
/// nothing after trimming.
pub fn shrink_box(
    bbox: &[f32; 4],
    class: RegionClass,
    score: f32,
    source: RegionSource,
    ratios: &ShrinkRatios,
    min_box_px: f32,
) -> Option<Region> {
    let [x1, y1, x2, y2] = *bbox;
    let w = x2 - x1;
    let h = y2 - y1;
    if w < min_box_px || h < min_box_px {
        return None;
    }

    let (rw, rh) = ratios.for_class(class);
    let dx = w * rw / 2.0;
    let dy = h * rh / 2.0;
    let sx1 = x1 + dx;
    let sy1 = y1 + dy;
    let sx2 = x2 - dx;
    let sy2 = y2 - dy;
    if sx2 <= sx1 || sy2 <= sy1 {
        return None;
    }

    Some(Region::new(sx1, sy1, sx2, sy2, class, score, source))
}
