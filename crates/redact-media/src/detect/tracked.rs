//! Identity assignment over a stateless detector layer.
//!
//! The secondary layer wraps a detector with short-horizon IoU matching
//! so detections carry stable track ids across frames. Periodic resets
//! clear the identity table without touching the wrapped layer.

use std::collections::HashMap;

use image::RgbImage;
use tracing::debug;

use crate::error::MediaResult;

use super::{iou_xyxy, DetectorLayer, RawDetection};

const MATCH_IOU: f32 = 0.3;

struct TrackEntry {
    bbox: [f32; 4],
    age: u32,
}

/// Wraps a detector layer and assigns persistent track ids by greedy
/// IoU matching against the previous frames' boxes.
pub struct TrackedDetector {
    inner: Box<dyn DetectorLayer>,
    tracks: HashMap<u64, TrackEntry>,
    next_id: u64,
    /// Frames a track survives without a match before removal
    max_gap: u32,
}

impl TrackedDetector {
    pub fn new(inner: Box<dyn DetectorLayer>) -> Self {
        Self {
            inner,
            tracks: HashMap::new(),
            next_id: 1,
            max_gap: 5,
        }
    }

    fn assign_ids(&mut self, detections: &mut [RawDetection]) {
        let mut claimed: Vec<u64> = Vec::new();

        for det in detections.iter_mut() {
            let mut best: Option<(u64, f32)> = None;
            for (id, entry) in &self.tracks {
                if claimed.contains(id) {
                    continue;
                }
                let overlap = iou_xyxy(&det.bbox, &entry.bbox);
                if overlap > MATCH_IOU && best.is_none_or(|(_, b)| overlap > b) {
                    best = Some((*id, overlap));
                }
            }

            let id = match best {
                Some((id, _)) => id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
            claimed.push(id);
            det.track_id = Some(id);
            self.tracks.insert(
                id,
                TrackEntry {
                    bbox: det.bbox,
                    age: 0,
                },
            );
        }

        // Age out tracks that found no match this frame
        self.tracks.retain(|id, entry| {
            if claimed.contains(id) {
                true
            } else {
                entry.age += 1;
                entry.age <= self.max_gap
            }
        });
    }
}

impl DetectorLayer for TrackedDetector {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<RawDetection>> {
        let mut detections = self.inner.detect(frame)?;
        self.assign_ids(&mut detections);
        Ok(detections)
    }

    /// Clears identity state only. The wrapped layer is stateless and
    /// keeps its loaded weights.
    fn reset(&mut self) {
        debug!(tracks = self.tracks.len(), "Resetting track identities");
        self.tracks.clear();
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::super::stub::ScriptedDetector;
    use super::*;

    fn frame() -> RgbImage {
        RgbImage::new(64, 64)
    }

    #[test]
    fn test_stable_id_across_frames() {
        let script = vec![
            vec![RawDetection::new([10.0, 10.0, 30.0, 30.0], "penis", 0.9)],
            vec![RawDetection::new([12.0, 11.0, 32.0, 31.0], "penis", 0.9)],
        ];
        let mut tracked = TrackedDetector::new(Box::new(ScriptedDetector::new(script, "secondary")));

        let first = tracked.detect(&frame()).unwrap();
        let second = tracked.detect(&frame()).unwrap();
        assert_eq!(first[0].track_id, second[0].track_id);
    }

    #[test]
    fn test_new_id_for_distant_box() {
        let script = vec![
            vec![RawDetection::new([10.0, 10.0, 30.0, 30.0], "penis", 0.9)],
            vec![RawDetection::new([100.0, 100.0, 130.0, 130.0], "penis", 0.9)],
        ];
        let mut tracked = TrackedDetector::new(Box::new(ScriptedDetector::new(script, "secondary")));

        let first = tracked.detect(&frame()).unwrap();
        let second = tracked.detect(&frame()).unwrap();
        assert_ne!(first[0].track_id, second[0].track_id);
    }

    #[test]
    fn test_reset_breaks_identity() {
        let script = vec![
            vec![RawDetection::new([10.0, 10.0, 30.0, 30.0], "penis", 0.9)],
            vec![RawDetection::new([10.0, 10.0, 30.0, 30.0], "penis", 0.9)],
        ];
        let mut tracked = TrackedDetector::new(Box::new(ScriptedDetector::new(script, "secondary")));

        let first = tracked.detect(&frame()).unwrap();
        tracked.reset();
        let second = tracked.detect(&frame()).unwrap();
        assert_ne!(first[0].track_id, second[0].track_id);
    }

    #[test]
    fn test_track_survives_short_gap() {
        let script = vec![
            vec![RawDetection::new([10.0, 10.0, 30.0, 30.0], "penis", 0.9)],
            vec![],
            vec![RawDetection::new([11.0, 10.0, 31.0, 30.0], "penis", 0.9)],
        ];
        let mut tracked = TrackedDetector::new(Box::new(ScriptedDetector::new(script, "secondary")));

        let first = tracked.detect(&frame()).unwrap();
        tracked.detect(&frame()).unwrap();
        let third = tracked.detect(&frame()).unwrap();
        assert_eq!(first[0].track_id, third[0].track_id);
    }
}
