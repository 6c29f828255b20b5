//! The rescan's fixed-point behavior: patching a residual region once
//! must leave nothing for a second pass to find.

use image::{Rgb, RgbImage};

use redact_media::{redact_regions, ColorBlobDetector, RescanPass};
use redact_models::{RedactionConfig, RedactionPattern};

fn frame_with_blob() -> RgbImage {
    let mut frame = RgbImage::from_pixel(640, 480, Rgb([255, 255, 255]));
    // 100x100 saturated blob; the class-ratio shrink covers enough of
    // it that a filled patch drops the blob below detection threshold
    for y in 200..300 {
        for x in 300..400 {
            frame.put_pixel(x, y, Rgb([255, 0, 0]));
        }
    }
    frame
}

fn blob_pass() -> RescanPass {
    // Threshold below the full blob (10 000 px) but above the ~8 600 px
    // left once the 30x45 shrunk core is filled
    RescanPass::new(Box::new(ColorBlobDetector::with_min_pixels(9000)), None)
}

fn fill_config() -> RedactionConfig {
    RedactionConfig {
        pattern: RedactionPattern::Fill,
        ..RedactionConfig::default()
    }
}

#[test]
fn first_pass_fixes_second_pass_clean() {
    let config = fill_config();
    let mut frame = frame_with_blob();

    let mut first = blob_pass();
    let regions = first.detect_frame(&frame, &config);
    assert_eq!(regions.len(), 1, "residual blob should be detected");

    let drawn = redact_regions(&mut frame, &regions, config.pattern);
    assert_eq!(drawn, 1);

    let mut second = blob_pass();
    let leftover = second.detect_frame(&frame, &config);
    assert!(
        leftover.is_empty(),
        "second pass found {} regions on a patched frame",
        leftover.len()
    );
}

#[test]
fn clean_frame_needs_no_fix() {
    let config = fill_config();
    let frame = RgbImage::from_pixel(640, 480, Rgb([255, 255, 255]));
    let mut pass = blob_pass();
    assert!(pass.detect_frame(&frame, &config).is_empty());
}

#[test]
fn patched_region_matches_shrink_geometry() {
    let config = fill_config();
    let mut frame = frame_with_blob();

    let mut pass = blob_pass();
    let regions = pass.detect_frame(&frame, &config);
    redact_regions(&mut frame, &regions, config.pattern);

    // Blob center filled, blob corner (outside the shrunk region) still red
    assert_eq!(*frame.get_pixel(350, 250), Rgb([0, 0, 0]));
    assert_eq!(*frame.get_pixel(301, 201), Rgb([255, 0, 0]));
}
