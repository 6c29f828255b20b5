//! Test detector layers that need no model weights.

use image::RgbImage;

use crate::error::MediaResult;

use super::{DetectorLayer, RawDetection};

/// Replays a canned per-frame detection script. Frames past the end of
/// the script produce no detections.
pub struct ScriptedDetector {
    script: Vec<Vec<RawDetection>>,
    cursor: usize,
    name: &'static str,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<RawDetection>>, name: &'static str) -> Self {
        Self {
            script,
            cursor: 0,
            name,
        }
    }
}

impl DetectorLayer for ScriptedDetector {
    fn detect(&mut self, _frame: &RgbImage) -> MediaResult<Vec<RawDetection>> {
        let detections = self.script.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Detects the bounding box of saturated red pixels. Once such a blob
/// has been filled over, a second pass finds nothing, which makes this
/// layer useful for verifying residual-region rescans.
pub struct ColorBlobDetector {
    min_pixels: u32,
}

impl ColorBlobDetector {
    pub fn new() -> Self {
        Self { min_pixels: 16 }
    }

    /// Require at least this many saturated pixels before reporting.
    pub fn with_min_pixels(min_pixels: u32) -> Self {
        Self { min_pixels }
    }
}

impl Default for ColorBlobDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorLayer for ColorBlobDetector {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<RawDetection>> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut count = 0u32;

        for (x, y, pixel) in frame.enumerate_pixels() {
            if pixel[0] > 200 && pixel[1] < 50 && pixel[2] < 50 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                count += 1;
            }
        }

        if count < self.min_pixels {
            return Ok(vec![]);
        }

        Ok(vec![RawDetection::new(
            [
                min_x as f32,
                min_y as f32,
                (max_x + 1) as f32,
                (max_y + 1) as f32,
            ],
            "penis",
            1.0,
        )])
    }

    fn name(&self) -> &'static str {
        "color_blob"
    }
}
