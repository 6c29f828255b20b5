//! Redaction pattern selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visual pattern applied to a redacted region.
///
/// Rendering parameters are deterministic functions of the region size;
/// see the renderer in `redact-media`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedactionPattern {
    /// Downscale to 1/8 then upscale nearest-neighbor
    PixelateFine,
    /// Downscale to 1/16 then upscale nearest-neighbor
    PixelateMedium,
    /// Downscale to 1/32 then upscale nearest-neighbor
    PixelateCoarse,
    /// Gaussian blur, radius proportional to region size
    Blur,
    /// Solid black fill
    Fill,
}

impl RedactionPattern {
    /// Downscale divisor for pixelation patterns, `None` otherwise.
    pub fn pixel_divisor(&self) -> Option<u32> {
        match self {
            Self::PixelateFine => Some(8),
            Self::PixelateMedium => Some(16),
            Self::PixelateCoarse => Some(32),
            Self::Blur | Self::Fill => None,
        }
    }
}

impl Default for RedactionPattern {
    fn default() -> Self {
        Self::PixelateFine
    }
}

impl fmt::Display for RedactionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PixelateFine => "pixelate-fine",
            Self::PixelateMedium => "pixelate-medium",
            Self::PixelateCoarse => "pixelate-coarse",
            Self::Blur => "blur",
            Self::Fill => "fill",
        };
        f.write_str(s)
    }
}

impl FromStr for RedactionPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pixelate-fine" | "fine" => Ok(Self::PixelateFine),
            "pixelate-medium" | "medium" => Ok(Self::PixelateMedium),
            "pixelate-coarse" | "coarse" => Ok(Self::PixelateCoarse),
            "blur" => Ok(Self::Blur),
            "fill" | "blackout" => Ok(Self::Fill),
            other => Err(format!("unknown redaction pattern: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisors() {
        assert_eq!(RedactionPattern::PixelateFine.pixel_divisor(), Some(8));
        assert_eq!(RedactionPattern::PixelateMedium.pixel_divisor(), Some(16));
        assert_eq!(RedactionPattern::PixelateCoarse.pixel_divisor(), Some(32));
        assert_eq!(RedactionPattern::Blur.pixel_divisor(), None);
        assert_eq!(RedactionPattern::Fill.pixel_divisor(), None);
    }

    #[test]
    fn test_parse_roundtrip() {
        for p in [
            RedactionPattern::PixelateFine,
            RedactionPattern::PixelateMedium,
            RedactionPattern::PixelateCoarse,
            RedactionPattern::Blur,
            RedactionPattern::Fill,
        ] {
            assert_eq!(p.to_string().parse::<RedactionPattern>().unwrap(), p);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            "blackout".parse::<RedactionPattern>().unwrap(),
            RedactionPattern::Fill
        );
        assert!("mosaic".parse::<RedactionPattern>().is_err());
    }
}
