//! Detector layers.
//!
//! Every layer satisfies the same contract: given one decoded frame,
//! return zero or more raw detections. Layers are black boxes to the
//! fusion engine; only the primary layer carries identity state, and
//! only through the [`TrackedDetector`] wrapper.

pub mod onnx;
pub mod stub;
pub mod tracked;

pub use onnx::{OnnxDetector, OnnxDetectorConfig};
pub use stub::{ColorBlobDetector, ScriptedDetector};
pub use tracked::TrackedDetector;

use image::RgbImage;

use crate::error::MediaResult;

/// One raw detection from a layer, before shrinking and fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Pixel coordinates `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    /// Model-specific class label; mapped to the redaction taxonomy by
    /// the fusion engine
    pub label: String,
    /// Confidence in [0, 1]
    pub score: f32,
    /// Persistent identity, assigned only by the primary layer
    pub track_id: Option<u64>,
}

impl RawDetection {
    pub fn new(bbox: [f32; 4], label: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, id: u64) -> Self {
        self.track_id = Some(id);
        self
    }
}

/// A detection layer consulted once per frame.
///
/// Implementations run synchronously; frame processing is sequential by
/// design, with detector latency dominating.
pub trait DetectorLayer: Send {
    /// Detect regions in one frame.
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<RawDetection>>;

    /// Clear any identity state retained across frames. A no-op for
    /// stateless layers.
    fn reset(&mut self) {}

    /// Layer name for logging.
    fn name(&self) -> &'static str;
}

/// Compute IoU between two `[x1, y1, x2, y2]` boxes.
pub(crate) fn iou_xyxy(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);

    if ix2 <= ix1 || iy2 <= iy1 {
        return 0.0;
    }

    let intersection = (ix2 - ix1) * (iy2 - iy1);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_xyxy() {
        let a = [0.0, 0.0, 100.0, 100.0];
        assert!((iou_xyxy(&a, &a) - 1.0).abs() < 1e-6);

        let b = [100.0, 100.0, 200.0, 200.0];
        assert_eq!(iou_xyxy(&a, &b), 0.0);
    }
}
