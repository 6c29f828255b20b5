//! Redaction regions and their class taxonomy.

use serde::{Deserialize, Serialize};

/// Which detection layer produced a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    /// Identity-tracking primary detector
    Primary,
    /// Stateless cross-check detector
    Secondary,
    /// Optional classifier from a different model family
    Tertiary,
    /// Re-rendered from a lost track's stored region
    TrackFallback,
    /// Re-rendered from the last non-empty canonical set
    HistoryFallback,
}

/// Class taxonomy for regions that require redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionClass {
    Anus,
    Penis,
    Vagina,
    /// A region whose detector did not assign a recognized class.
    Unclassified,
}

impl RegionClass {
    /// Map a primary-detector label to a redaction class.
    ///
    /// Returns `None` for labels that must not be redacted
    /// (`make_love`, `nipple`) or that are unknown to the taxonomy.
    pub fn from_primary_label(label: &str) -> Option<Self> {
        match label {
            "anus" => Some(Self::Anus),
            "penis" => Some(Self::Penis),
            "vagina" => Some(Self::Vagina),
            "make_love" | "nipple" => None,
            _ => None,
        }
    }

    /// Map a tertiary-classifier label to a redaction class.
    ///
    /// The tertiary model family uses an exposed/covered taxonomy; only
    /// exposed genital/anus labels are accepted.
    pub fn from_tertiary_label(label: &str) -> Option<Self> {
        match label {
            "FEMALE_GENITALIA_EXPOSED" => Some(Self::Vagina),
            "MALE_GENITALIA_EXPOSED" => Some(Self::Penis),
            "ANUS_EXPOSED" => Some(Self::Anus),
            _ => None,
        }
    }
}

/// An axis-aligned rectangle marked for redaction.
///
/// Coordinates are pixels in the source frame. Invariant: `x2 > x1` and
/// `y2 > y1`; constructors in the fusion pipeline only produce regions
/// satisfying it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class: RegionClass,
    /// Detector confidence in [0, 1]
    pub score: f32,
    pub source: RegionSource,
}

impl Region {
    /// Create a new region.
    pub fn new(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        class: RegionClass,
        score: f32,
        source: RegionSource,
    ) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            class,
            score,
            source,
        }
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area in square pixels.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Whether the rectangle has positive extent in both dimensions.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// Compute Intersection over Union with another region.
    pub fn iou(&self, other: &Region) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let intersection = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Clamp the region to frame bounds.
    ///
    /// Returns `None` when nothing of the region remains inside the frame.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let clamped = Region {
            x1: self.x1.max(0.0),
            y1: self.y1.max(0.0),
            x2: self.x2.min(frame_width as f32),
            y2: self.y2.min(frame_height as f32),
            ..*self
        };
        clamped.is_valid().then_some(clamped)
    }

    /// Copy of this region with a different source tag.
    pub fn with_source(&self, source: RegionSource) -> Region {
        Region { source, ..*self }
    }
}
