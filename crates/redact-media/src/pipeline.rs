//! End-to-end redaction of one video.
//!
//! Decodes frames sequentially, fuses detector layers, renders the
//! redaction pattern, encodes to a video-only intermediate, then hands
//! off to the finalizer for audio. Everything per-video lives in a
//! scratch directory wiped on every exit path.

use std::path::Path;

use tempfile::TempDir;
use tokio::sync::watch;
use tracing::{debug, info};

use redact_models::RedactionConfig;

use crate::error::{MediaError, MediaResult};
use crate::finalize::{finalize_video, EncodeSettings};
use crate::frame_io::{FrameDecoder, FrameEncoder};
use crate::fusion::FusionEngine;
use crate::probe::probe_video;
use crate::progress::{ProgressSender, ProgressStage};
use crate::render::redact_regions;

/// Shared wiring for one video: progress, cancellation, audio source.
pub struct PipelineContext<'a> {
    pub config: &'a RedactionConfig,
    pub progress: Option<&'a ProgressSender>,
    pub cancel_rx: Option<&'a watch::Receiver<bool>>,
    /// Replaces the input's own audio when set
    pub external_audio: Option<&'a Path>,
}

impl PipelineContext<'_> {
    fn cancelled(&self) -> bool {
        self.cancel_rx.is_some_and(|rx| *rx.borrow())
    }

    pub(crate) fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            preset: self.config.render_preset.clone(),
            crf: self.config.render_crf,
        }
    }
}

/// Redact one video end to end. Returns the number of frames written.
///
/// On cancellation the partial intermediate and the scratch directory
/// are discarded and `Cancelled` is returned; the caller decides what
/// happens to the batch.
pub async fn redact_video(
    input: &Path,
    output: &Path,
    engine: &mut FusionEngine,
    ctx: &PipelineContext<'_>,
) -> MediaResult<u64> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let info = probe_video(input).await?;
    let total_frames = info.total_frames();
    if total_frames == 0 {
        return Err(MediaError::decode_failed(format!(
            "No frames in {}",
            input.display()
        )));
    }
    info!(
        input = %input.display(),
        width = info.width,
        height = info.height,
        fps = info.fps,
        total_frames,
        "Starting redaction pass"
    );

    let scratch = TempDir::new()?;
    let intermediate = scratch.path().join("redacted_video_only.mp4");

    let mut decoder = FrameDecoder::open(input, info.width, info.height).await?;
    let mut encoder = FrameEncoder::create(
        &intermediate,
        info.width,
        info.height,
        info.fps,
        &ctx.config.render_preset,
        ctx.config.render_crf,
    )
    .await?;

    let mut frame_index: u64 = 0;
    loop {
        if ctx.cancelled() {
            decoder.abort().await;
            encoder.abort().await;
            return Err(MediaError::Cancelled);
        }

        let Some(mut frame) = decoder.next_frame().await? else {
            break;
        };

        let outcome = engine.fuse_frame(&frame);
        if !outcome.regions.is_empty() {
            let drawn = redact_regions(&mut frame, &outcome.regions, ctx.config.pattern);
            debug!(
                frame = frame_index,
                drawn,
                breakdown = ?outcome.breakdown,
                "Frame redacted"
            );
        }

        encoder.write_frame(&frame).await?;

        if let Some(progress) = ctx.progress {
            progress.frame(ProgressStage::Redacting, frame_index, total_frames, None);
        }
        frame_index += 1;
    }

    decoder.finish().await?;
    encoder.finish().await?;

    if ctx.cancelled() {
        return Err(MediaError::Cancelled);
    }

    if let Some(progress) = ctx.progress {
        progress.frame(ProgressStage::Finalizing, 0, 1, None);
    }
    finalize_video(
        &intermediate,
        input,
        ctx.external_audio,
        output,
        &ctx.encode_settings(),
        ctx.cancel_rx,
    )
    .await?;

    info!(
        output = %output.display(),
        frames = frame_index,
        "Redaction pass complete"
    );
    Ok(frame_index)
}
