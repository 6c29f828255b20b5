//! IoU-based merge of regions from multiple detector layers.

use redact_models::Region;

/// Merge overlapping regions into a canonical set.
///
/// Regions overlapping above `iou_threshold` are duplicates; the one
/// with larger area wins regardless of score or label. The larger box
/// carries more safety margin, which is the right bias here. Quadratic,
/// fine for single-digit per-frame counts.
pub fn merge_regions(regions: Vec<Region>, iou_threshold: f32) -> Vec<Region> {
    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());

    for candidate in regions {
        let mut overlapped = false;
        for existing in merged.iter_mut() {
            if candidate.iou(existing) > iou_threshold {
                if candidate.area() > existing.area() {
                    *existing = candidate.clone();
                }
                overlapped = true;
                break;
            }
        }
        if !overlapped {
            merged.push(candidate);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::{RegionClass, RegionSource};

    fn region(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Region {
        Region::new(x1, y1, x2, y2, RegionClass::Penis, score, RegionSource::Primary)
    }

    #[test]
    fn test_larger_area_replaces_smaller() {
        let small = region(10.0, 10.0, 50.0, 50.0, 0.95);
        let large = region(8.0, 8.0, 60.0, 60.0, 0.40);
        let merged = merge_regions(vec![small, large.clone()], 0.3);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].area() - large.area()).abs() < 1e-3);
        assert!((merged[0].score - 0.40).abs() < 1e-6);
    }

    #[test]
    fn test_smaller_candidate_discarded() {
        let large = region(8.0, 8.0, 60.0, 60.0, 0.40);
        let small = region(10.0, 10.0, 50.0, 50.0, 0.95);
        let merged = merge_regions(vec![large.clone(), small], 0.3);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].area() - large.area()).abs() < 1e-3);
    }

    #[test]
    fn test_disjoint_regions_both_kept() {
        let a = region(0.0, 0.0, 40.0, 40.0, 0.9);
        let b = region(100.0, 100.0, 140.0, 140.0, 0.9);
        let merged = merge_regions(vec![a, b], 0.3);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_cross_label_overlap_still_merges() {
        let a = Region::new(10.0, 10.0, 50.0, 50.0, RegionClass::Penis, 0.8, RegionSource::Primary);
        let b = Region::new(
            10.0,
            10.0,
            55.0,
            55.0,
            RegionClass::Vagina,
            0.6,
            RegionSource::Secondary,
        );
        let merged = merge_regions(vec![a, b], 0.3);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].class, RegionClass::Vagina);
    }

    #[test]
    fn test_threshold_boundary() {
        // IoU exactly 1/3 merges; IoU 0.25 keeps both
        let a = region(0.0, 0.0, 100.0, 100.0, 0.9);
        let b = region(50.0, 0.0, 150.0, 100.0, 0.9);
        assert_eq!(merge_regions(vec![a.clone(), b], 0.3).len(), 1);

        let c = region(60.0, 0.0, 160.0, 100.0, 0.9);
        assert_eq!(merge_regions(vec![a, c], 0.3).len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_regions(vec![], 0.3).is_empty());
    }
}
