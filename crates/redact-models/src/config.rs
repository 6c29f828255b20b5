//! Configuration for the redaction pipeline.

use serde::{Deserialize, Serialize};

use crate::pattern::RedactionPattern;
use crate::region::RegionClass;

/// Per-class box shrink ratios (horizontal, vertical).
///
/// Each ratio is the fraction of the box dimension removed before
/// redaction, split evenly between both sides, so the obscured area
/// follows the relevant sub-region rather than the loosely-fit
/// bounding box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShrinkRatios {
    pub anus: (f32, f32),
    pub penis: (f32, f32),
    pub vagina: (f32, f32),
    /// Applied to unclassified or unrecognized labels
    pub default: (f32, f32),
}

impl ShrinkRatios {
    /// Look up the (horizontal, vertical) ratio for a class.
    pub fn for_class(&self, class: RegionClass) -> (f32, f32) {
        match class {
            RegionClass::Anus => self.anus,
            RegionClass::Penis => self.penis,
            RegionClass::Vagina => self.vagina,
            RegionClass::Unclassified => self.default,
        }
    }
}

impl Default for ShrinkRatios {
    fn default() -> Self {
        Self {
            anus: (0.65, 0.65),
            penis: (0.70, 0.55),
            vagina: (0.70, 0.55),
            default: (0.60, 0.50),
        }
    }
}

/// Configuration for one redaction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Visual pattern for redacted regions
    pub pattern: RedactionPattern,

    /// Frames a track or fallback set survives without detection (default: 15)
    pub max_lost_frames: u32,

    /// IoU threshold above which two regions are merged (default: 0.3)
    pub iou_threshold: f32,

    /// Per-class shrink ratios
    pub shrink: ShrinkRatios,

    /// Minimum confidence for the primary and secondary layers (default: 0.10)
    pub min_confidence: f32,

    /// Minimum confidence for the tertiary layer (default: 0.30)
    pub min_confidence_tertiary: f32,

    /// Frames between forced primary-identity resets (default: 100)
    pub tracker_reset_interval: u64,

    /// Run the verification rescan over finished outputs (default: true)
    pub rescan_enabled: bool,

    /// Raw boxes narrower or shorter than this are rejected (default: 10)
    pub min_box_px: u32,

    /// FFmpeg x264 preset for encoding (default: "veryfast")
    pub render_preset: String,

    /// FFmpeg CRF quality (default: 23)
    pub render_crf: u32,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            pattern: RedactionPattern::default(),
            max_lost_frames: 15,
            iou_threshold: 0.3,
            shrink: ShrinkRatios::default(),
            min_confidence: 0.10,
            min_confidence_tertiary: 0.30,
            tracker_reset_interval: 100,
            rescan_enabled: true,
            min_box_px: 10,
            render_preset: "veryfast".to_string(),
            render_crf: 23,
        }
    }
}
