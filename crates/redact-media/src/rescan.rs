//! Residual-leak verification pass.
//!
//! Re-decodes a finished output with only the stateless layers: the
//! identity tracker stays out so this validates static coverage, not
//! temporal continuity. Frames where a region still fires get patched;
//! if any did, the patched file replaces the original.

use std::path::Path;

use image::RgbImage;
use tempfile::TempDir;
use tracing::{info, warn};

use redact_models::{RedactionConfig, Region, RegionClass, RegionSource};

use crate::detect::DetectorLayer;
use crate::error::{MediaError, MediaResult};
use crate::finalize::{finalize_video, transcode_video_only};
use crate::frame_io::{FrameDecoder, FrameEncoder};
use crate::fs_utils::move_file;
use crate::fusion::{merge_regions, shrink_box};
use crate::pipeline::PipelineContext;
use crate::probe::{has_audio_stream, probe_video};
use crate::progress::ProgressStage;
use crate::render::redact_regions;

/// Result of one rescan.
#[derive(Debug, Clone, Copy)]
pub struct RescanOutcome {
    /// Frames where the rescan drew at least one additional region
    pub fixed_frames: u64,
    /// Whether the patched file replaced the original output
    pub replaced: bool,
}

/// The tracker-free detector stack used by the rescan.
pub struct RescanPass {
    secondary: Box<dyn DetectorLayer>,
    tertiary: Option<Box<dyn DetectorLayer>>,
}

impl RescanPass {
    pub fn new(secondary: Box<dyn DetectorLayer>, tertiary: Option<Box<dyn DetectorLayer>>) -> Self {
        Self { secondary, tertiary }
    }

    /// Detect residual regions on one frame: shrink and dedup exactly
    /// as the main pass does, but with no track or history state.
    pub fn detect_frame(&mut self, frame: &RgbImage, config: &RedactionConfig) -> Vec<Region> {
        let mut candidates = Vec::new();

        match self.secondary.detect(frame) {
            Ok(raws) => {
                for raw in raws {
                    if raw.score < config.min_confidence {
                        continue;
                    }
                    let Some(class) = RegionClass::from_primary_label(&raw.label) else {
                        continue;
                    };
                    if let Some(region) = shrink_box(
                        &raw.bbox,
                        class,
                        raw.score,
                        RegionSource::Secondary,
                        &config.shrink,
                        config.min_box_px as f32,
                    ) {
                        candidates.push(region);
                    }
                }
            }
            Err(e) => warn!(layer = self.secondary.name(), error = %e, "Rescan layer failed for frame"),
        }

        if let Some(tertiary) = self.tertiary.as_mut() {
            match tertiary.detect(frame) {
                Ok(raws) => {
                    for raw in raws {
                        if raw.score < config.min_confidence_tertiary {
                            continue;
                        }
                        let Some(class) = RegionClass::from_tertiary_label(&raw.label) else {
                            continue;
                        };
                        // Same default-margin rule as the main pass for
                        // boxes from this model family
                        if let Some(mut region) = shrink_box(
                            &raw.bbox,
                            RegionClass::Unclassified,
                            raw.score,
                            RegionSource::Tertiary,
                            &config.shrink,
                            config.min_box_px as f32,
                        ) {
                            region.class = class;
                            candidates.push(region);
                        }
                    }
                }
                Err(e) => warn!(layer = tertiary.name(), error = %e, "Rescan layer failed for frame"),
            }
        }

        merge_regions(candidates, config.iou_threshold)
    }
}

/// Verify a finished output and patch residual leaks in place.
///
/// With stable detector outputs a second rescan of the same file finds
/// nothing, so `fixed_frames == 0` leaves the original untouched.
pub async fn rescan_video(
    output: &Path,
    pass: &mut RescanPass,
    ctx: &PipelineContext<'_>,
) -> MediaResult<RescanOutcome> {
    let info = probe_video(output).await?;
    let total_frames = info.total_frames();

    let scratch = TempDir::new()?;
    let patched_intermediate = scratch.path().join("rescan_video_only.mp4");

    let mut decoder = FrameDecoder::open(output, info.width, info.height).await?;
    let mut encoder = FrameEncoder::create(
        &patched_intermediate,
        info.width,
        info.height,
        info.fps,
        &ctx.config.render_preset,
        ctx.config.render_crf,
    )
    .await?;

    let mut frame_index: u64 = 0;
    let mut fixed_frames: u64 = 0;
    loop {
        if ctx.cancel_rx.is_some_and(|rx| *rx.borrow()) {
            decoder.abort().await;
            encoder.abort().await;
            return Err(MediaError::Cancelled);
        }

        let Some(mut frame) = decoder.next_frame().await? else {
            break;
        };

        let regions = pass.detect_frame(&frame, ctx.config);
        if !regions.is_empty() {
            let drawn = redact_regions(&mut frame, &regions, ctx.config.pattern);
            if drawn > 0 {
                fixed_frames += 1;
            }
        }

        encoder.write_frame(&frame).await?;

        if let Some(progress) = ctx.progress {
            progress.frame(
                ProgressStage::Rescanning,
                frame_index,
                total_frames,
                Some(fixed_frames),
            );
        }
        frame_index += 1;
    }

    decoder.finish().await?;
    encoder.finish().await?;

    if fixed_frames == 0 {
        info!(output = %output.display(), "Rescan clean, keeping original");
        return Ok(RescanOutcome {
            fixed_frames: 0,
            replaced: false,
        });
    }

    info!(
        output = %output.display(),
        fixed_frames,
        "Rescan patched residual regions, replacing output"
    );

    // Carry sound over from the file being replaced
    let patched_final = scratch.path().join("rescan_final.mp4");
    let settings = ctx.encode_settings();
    if has_audio_stream(output).await.unwrap_or(false) {
        finalize_video(
            &patched_intermediate,
            output,
            None,
            &patched_final,
            &settings,
            ctx.cancel_rx,
        )
        .await?;
    } else {
        transcode_video_only(&patched_intermediate, &patched_final, &settings, ctx.cancel_rx)
            .await?;
    }

    move_file(&patched_final, output).await?;

    Ok(RescanOutcome {
        fixed_frames,
        replaced: true,
    })
}
