//! Per-frame fusion of detector layers with temporal fallback.
//!
//! Three independent detection sources and two independent fallback
//! mechanisms (frame history and per-track carryover) deliberately bias
//! toward over-redaction. A missed frame is worse than an extra mosaic.

use image::RgbImage;
use tracing::{debug, warn};

use redact_models::{RedactionConfig, Region, RegionClass, RegionSource};

use crate::detect::{DetectorLayer, RawDetection};

use super::dedup::merge_regions;
use super::shrink::shrink_box;
use super::state::{FallbackHistory, TrackStore};

/// Count of final regions by originating layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceBreakdown {
    pub primary: usize,
    pub secondary: usize,
    pub tertiary: usize,
    pub track_fallback: usize,
    pub history_fallback: usize,
}

impl SourceBreakdown {
    fn tally(regions: &[Region]) -> Self {
        let mut breakdown = Self::default();
        for region in regions {
            match region.source {
                RegionSource::Primary => breakdown.primary += 1,
                RegionSource::Secondary => breakdown.secondary += 1,
                RegionSource::Tertiary => breakdown.tertiary += 1,
                RegionSource::TrackFallback => breakdown.track_fallback += 1,
                RegionSource::HistoryFallback => breakdown.history_fallback += 1,
            }
        }
        breakdown
    }

    pub fn total(&self) -> usize {
        self.primary + self.secondary + self.tertiary + self.track_fallback + self.history_fallback
    }
}

/// Result of fusing one frame.
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    /// Regions to redact on this frame
    pub regions: Vec<Region>,
    pub breakdown: SourceBreakdown,
}

impl FusionOutcome {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// One video's worth of fusion state: the detector layers, the track
/// store, and the fallback history. Created fresh per video.
pub struct FusionEngine {
    primary: Box<dyn DetectorLayer>,
    secondary: Option<Box<dyn DetectorLayer>>,
    tertiary: Option<Box<dyn DetectorLayer>>,
    config: RedactionConfig,
    tracks: TrackStore,
    history: FallbackHistory,
    frame_index: u64,
}

impl FusionEngine {
    pub fn new(
        primary: Box<dyn DetectorLayer>,
        secondary: Option<Box<dyn DetectorLayer>>,
        tertiary: Option<Box<dyn DetectorLayer>>,
        config: RedactionConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            tertiary,
            config,
            tracks: TrackStore::new(),
            history: FallbackHistory::new(),
            frame_index: 0,
        }
    }

    /// Fuse one frame. Never fails: a layer that errors contributes no
    /// detections for this frame and the rest proceed.
    pub fn fuse_frame(&mut self, frame: &RgbImage) -> FusionOutcome {
        let mut refreshed: Vec<u64> = Vec::new();
        let mut candidates: Vec<Region> = Vec::new();

        // Layer 1: identity-tracking primary
        for raw in run_layer(self.primary.as_mut(), frame) {
            if raw.score < self.config.min_confidence {
                continue;
            }
            let Some(class) = RegionClass::from_primary_label(&raw.label) else {
                continue;
            };
            let Some(region) = self.shrink(&raw, class, RegionSource::Primary) else {
                continue;
            };
            if let Some(id) = raw.track_id {
                refreshed.push(id);
                self.tracks.refresh(id, region.clone());
            }
            candidates.push(region);
        }

        // Layer 2: stateless cross-check, same taxonomy
        if let Some(secondary) = self.secondary.as_mut() {
            for raw in run_layer(secondary.as_mut(), frame) {
                if raw.score < self.config.min_confidence {
                    continue;
                }
                let Some(class) = RegionClass::from_primary_label(&raw.label) else {
                    continue;
                };
                if let Some(region) = self.shrink(&raw, class, RegionSource::Secondary) {
                    candidates.push(region);
                }
            }
        }

        // Layer 3: different model family, exposed-class labels only
        if let Some(tertiary) = self.tertiary.as_mut() {
            for raw in run_layer(tertiary.as_mut(), frame) {
                if raw.score < self.config.min_confidence_tertiary {
                    continue;
                }
                let Some(class) = RegionClass::from_tertiary_label(&raw.label) else {
                    continue;
                };
                // The class ratios are tuned for the primary taxonomy;
                // boxes from this family get the default margin, keeping
                // the mapped class only as a tag.
                if let Some(mut region) =
                    self.shrink(&raw, RegionClass::Unclassified, RegionSource::Tertiary)
                {
                    region.class = class;
                    candidates.push(region);
                }
            }
        }

        let canonical = merge_regions(candidates, self.config.iou_threshold);

        let mut regions = if canonical.is_empty() {
            self.history.note_empty(self.config.max_lost_frames)
        } else {
            self.history.record(&canonical);
            canonical
        };

        // Tracks the primary lost this frame keep covering their last
        // position until the loss window runs out.
        regions.extend(
            self.tracks
                .age_unrefreshed(&refreshed, self.config.max_lost_frames),
        );

        // Preventive identity reset lands after the scheduled frame has
        // fused, so that frame's detections still refresh their tracks.
        if self.frame_index % self.config.tracker_reset_interval == 0 {
            debug!(frame = self.frame_index, "Periodic tracker reset");
            self.primary.reset();
        }
        self.frame_index += 1;

        let breakdown = SourceBreakdown::tally(&regions);
        FusionOutcome { regions, breakdown }
    }

    fn shrink(&self, raw: &RawDetection, class: RegionClass, source: RegionSource) -> Option<Region> {
        shrink_box(
            &raw.bbox,
            class,
            raw.score,
            source,
            &self.config.shrink,
            self.config.min_box_px as f32,
        )
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

fn run_layer(layer: &mut dyn DetectorLayer, frame: &RgbImage) -> Vec<RawDetection> {
    match layer.detect(frame) {
        Ok(detections) => detections,
        Err(e) => {
            warn!(layer = layer.name(), error = %e, "Detector layer failed, skipping for this frame");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ScriptedDetector;
    use crate::error::{MediaError, MediaResult};

    fn frame() -> RgbImage {
        RgbImage::new(640, 480)
    }

    fn det(bbox: [f32; 4], label: &str, score: f32, id: Option<u64>) -> RawDetection {
        let mut d = RawDetection::new(bbox, label, score);
        d.track_id = id;
        d
    }

    struct FailingDetector;

    impl DetectorLayer for FailingDetector {
        fn detect(&mut self, _frame: &RgbImage) -> MediaResult<Vec<RawDetection>> {
            Err(MediaError::detector_failed("inference blew up"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_excluded_labels_skipped() {
        let script = vec![vec![
            det([100.0, 100.0, 200.0, 200.0], "make_love", 0.9, None),
            det([300.0, 100.0, 400.0, 200.0], "nipple", 0.9, None),
        ]];
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(script, "primary")),
            None,
            None,
            RedactionConfig::default(),
        );
        let outcome = engine.fuse_frame(&frame());
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_low_confidence_skipped() {
        let script = vec![vec![det([100.0, 100.0, 200.0, 200.0], "penis", 0.05, None)]];
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(script, "primary")),
            None,
            None,
            RedactionConfig::default(),
        );
        assert!(engine.fuse_frame(&frame()).is_empty());
    }

    #[test]
    fn test_layer_failure_not_fatal() {
        let secondary = vec![vec![det([100.0, 100.0, 200.0, 200.0], "penis", 0.9, None)]];
        let mut engine = FusionEngine::new(
            Box::new(FailingDetector),
            Some(Box::new(ScriptedDetector::new(secondary, "secondary"))),
            None,
            RedactionConfig::default(),
        );
        let outcome = engine.fuse_frame(&frame());
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.breakdown.secondary, 1);
    }

    #[test]
    fn test_overlapping_layers_merge_to_one() {
        let primary = vec![vec![det([100.0, 100.0, 200.0, 200.0], "penis", 0.9, Some(1))]];
        let secondary = vec![vec![det([102.0, 102.0, 204.0, 204.0], "penis", 0.7, None)]];
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(primary, "primary")),
            Some(Box::new(ScriptedDetector::new(secondary, "secondary"))),
            None,
            RedactionConfig::default(),
        );
        // Refreshed track is excluded from carryover, so only the merged
        // canonical region remains.
        let outcome = engine.fuse_frame(&frame());
        assert_eq!(outcome.regions.len(), 1);
        assert_eq!(outcome.breakdown.total(), 1);
    }

    #[test]
    fn test_history_fallback_after_detection_stops() {
        let mut script = vec![vec![det([100.0, 100.0, 200.0, 200.0], "penis", 0.9, None)]];
        script.extend(std::iter::repeat_with(Vec::new).take(20));
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(script, "primary")),
            None,
            None,
            RedactionConfig::default(),
        );

        let first = engine.fuse_frame(&frame());
        assert_eq!(first.breakdown.primary, 1);

        for _ in 0..15 {
            let outcome = engine.fuse_frame(&frame());
            assert_eq!(outcome.breakdown.history_fallback, 1);
            assert_eq!(outcome.regions[0].x1, first.regions[0].x1);
        }
        // Window exhausted
        assert!(engine.fuse_frame(&frame()).is_empty());
    }

    #[test]
    fn test_track_fallback_covers_lost_identity() {
        let mut script = vec![vec![det([100.0, 100.0, 200.0, 200.0], "penis", 0.9, Some(42))]];
        script.extend(std::iter::repeat_with(Vec::new).take(20));
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(script, "primary")),
            None,
            None,
            RedactionConfig::default(),
        );

        engine.fuse_frame(&frame());
        assert_eq!(engine.active_tracks(), 1);

        for _ in 0..15 {
            let outcome = engine.fuse_frame(&frame());
            assert_eq!(outcome.breakdown.track_fallback, 1);
        }
        let outcome = engine.fuse_frame(&frame());
        assert_eq!(outcome.breakdown.track_fallback, 0);
        assert_eq!(engine.active_tracks(), 0);
    }

    #[test]
    fn test_tertiary_exposed_labels_mapped() {
        let tertiary = vec![vec![det(
            [100.0, 100.0, 200.0, 200.0],
            "FEMALE_GENITALIA_EXPOSED",
            0.5,
            None,
        )]];
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(vec![], "primary")),
            None,
            Some(Box::new(ScriptedDetector::new(tertiary, "tertiary"))),
            RedactionConfig::default(),
        );
        let outcome = engine.fuse_frame(&frame());
        assert_eq!(outcome.breakdown.tertiary, 1);
        assert_eq!(outcome.regions[0].class, RegionClass::Vagina);
        // Shrunk with the default (0.60, 0.50) margin, not the vagina one
        assert!((outcome.regions[0].width() - 40.0).abs() < 1e-3);
        assert!((outcome.regions[0].height() - 50.0).abs() < 1e-3);
    }

    /// Detector that records how many `detect` calls each `reset`
    /// arrived after.
    struct ResetSpy {
        detect_calls: u32,
        resets_after: std::sync::Arc<std::sync::Mutex<Vec<u32>>>,
    }

    impl DetectorLayer for ResetSpy {
        fn detect(&mut self, _frame: &RgbImage) -> MediaResult<Vec<RawDetection>> {
            self.detect_calls += 1;
            Ok(Vec::new())
        }

        fn reset(&mut self) {
            self.resets_after.lock().unwrap().push(self.detect_calls);
        }

        fn name(&self) -> &'static str {
            "reset-spy"
        }
    }

    #[test]
    fn test_periodic_reset_lands_after_scheduled_frame() {
        let resets = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let spy = ResetSpy {
            detect_calls: 0,
            resets_after: resets.clone(),
        };
        let config = RedactionConfig {
            tracker_reset_interval: 2,
            ..RedactionConfig::default()
        };
        let mut engine = FusionEngine::new(Box::new(spy), None, None, config);
        for _ in 0..5 {
            engine.fuse_frame(&frame());
        }
        // Frames 0, 2 and 4 hit the interval; each reset follows that
        // frame's detect call rather than preceding it.
        assert_eq!(*resets.lock().unwrap(), vec![1, 3, 5]);
    }

    #[test]
    fn test_tertiary_covered_labels_skipped() {
        let tertiary = vec![vec![det(
            [100.0, 100.0, 200.0, 200.0],
            "FEMALE_BREAST_COVERED",
            0.9,
            None,
        )]];
        let mut engine = FusionEngine::new(
            Box::new(ScriptedDetector::new(vec![], "primary")),
            None,
            Some(Box::new(ScriptedDetector::new(tertiary, "tertiary"))),
            RedactionConfig::default(),
        );
        assert!(engine.fuse_frame(&frame()).is_empty());
    }
}
