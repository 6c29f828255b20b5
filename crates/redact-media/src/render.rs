//! In-place redaction rendering.
//!
//! Crops each region out of the frame, transforms it per the selected
//! pattern, and pastes it back. Regions are clamped to frame bounds
//! before any pixel work.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use redact_models::{RedactionPattern, Region};

const FILL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Apply the pattern to every region of the frame. Returns how many
/// regions were actually drawn (regions entirely outside the frame are
/// skipped).
pub fn redact_regions(frame: &mut RgbImage, regions: &[Region], pattern: RedactionPattern) -> usize {
    let (fw, fh) = (frame.width(), frame.height());
    let mut drawn = 0;

    for region in regions {
        let Some(clamped) = region.clamp(fw, fh) else {
            continue;
        };
        let x = clamped.x1.floor() as u32;
        let y = clamped.y1.floor() as u32;
        let w = (clamped.x2.ceil() as u32).min(fw) - x;
        let h = (clamped.y2.ceil() as u32).min(fh) - y;
        if w == 0 || h == 0 {
            continue;
        }

        apply_pattern(frame, x, y, w, h, pattern);
        drawn += 1;
    }

    drawn
}

fn apply_pattern(frame: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, pattern: RedactionPattern) {
    match pattern {
        RedactionPattern::Fill => {
            for py in y..y + h {
                for px in x..x + w {
                    frame.put_pixel(px, py, FILL_COLOR);
                }
            }
        }
        RedactionPattern::Blur => {
            let sigma = (w.min(h) as f32 / 10.0).max(8.0);
            let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
            let blurred = imageops::blur(&crop, sigma);
            imageops::replace(frame, &blurred, x as i64, y as i64);
        }
        _ => {
            // Pixelation: downscale with a quality filter, upscale back
            // with nearest-neighbor for the blocky look.
            let divisor = pattern.pixel_divisor().unwrap_or(8);
            let small_w = (w / divisor).max(1);
            let small_h = (h / divisor).max(1);

            let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
            let small = imageops::resize(&crop, small_w, small_h, FilterType::CatmullRom);
            let blocky = imageops::resize(&small, w, h, FilterType::Nearest);
            imageops::replace(frame, &blocky, x as i64, y as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redact_models::{RegionClass, RegionSource};

    fn region(x1: f32, y1: f32, x2: f32, y2: f32) -> Region {
        Region::new(x1, y1, x2, y2, RegionClass::Penis, 0.9, RegionSource::Primary)
    }

    fn gradient_frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
    }

    #[test]
    fn test_fill_blacks_out_region() {
        let mut frame = gradient_frame(100, 100);
        let drawn = redact_regions(&mut frame, &[region(10.0, 10.0, 30.0, 30.0)], RedactionPattern::Fill);
        assert_eq!(drawn, 1);
        assert_eq!(*frame.get_pixel(20, 20), Rgb([0, 0, 0]));
        // Outside untouched
        assert_ne!(*frame.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_pixelation_changes_region_only() {
        let mut frame = gradient_frame(200, 200);
        let before = frame.clone();
        redact_regions(
            &mut frame,
            &[region(50.0, 50.0, 150.0, 150.0)],
            RedactionPattern::PixelateCoarse,
        );
        assert_ne!(*frame.get_pixel(100, 100), *before.get_pixel(100, 100));
        assert_eq!(*frame.get_pixel(10, 10), *before.get_pixel(10, 10));
        assert_eq!(*frame.get_pixel(190, 190), *before.get_pixel(190, 190));
    }

    #[test]
    fn test_out_of_bounds_region_clamped() {
        let mut frame = gradient_frame(100, 100);
        let drawn = redact_regions(
            &mut frame,
            &[region(-20.0, -20.0, 30.0, 30.0)],
            RedactionPattern::Fill,
        );
        assert_eq!(drawn, 1);
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_fully_outside_region_skipped() {
        let mut frame = gradient_frame(100, 100);
        let drawn = redact_regions(
            &mut frame,
            &[region(200.0, 200.0, 300.0, 300.0)],
            RedactionPattern::Fill,
        );
        assert_eq!(drawn, 0);
    }

    #[test]
    fn test_tiny_region_pixelates_without_panic() {
        let mut frame = gradient_frame(100, 100);
        let drawn = redact_regions(
            &mut frame,
            &[region(10.0, 10.0, 14.0, 14.0)],
            RedactionPattern::PixelateCoarse,
        );
        assert_eq!(drawn, 1);
    }
}
