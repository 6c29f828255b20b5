//! Audio finalization for redacted output.
//!
//! A redacted intermediate is video-only. This module decides, per
//! video, how sound ends up on the final file: an external track
//! aligned to video duration, the source's own audio, or nothing.

use std::path::Path;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::command::{run_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::{has_audio_stream, probe_duration};

/// Bounds within which a too-short audio track is time-stretched
/// rather than looped.
const STRETCH_MIN: f64 = 0.5;
const STRETCH_MAX: f64 = 2.0;

/// How to align an external audio track to the video duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioPlan {
    /// Audio is at least as long as the video; cut it at video end
    Trim,
    /// Audio is shorter; stretch playback by this video/audio ratio
    Stretch(f64),
    /// Audio is far too short; repeat it and cut at video end
    LoopTrim,
}

/// Pick an alignment strategy from the two durations.
pub fn plan_alignment(video_duration: f64, audio_duration: f64) -> AudioPlan {
    if audio_duration <= 0.0 {
        return AudioPlan::Trim;
    }
    if audio_duration >= video_duration {
        return AudioPlan::Trim;
    }
    let ratio = video_duration / audio_duration;
    if (STRETCH_MIN..=STRETCH_MAX).contains(&ratio) {
        AudioPlan::Stretch(ratio)
    } else {
        AudioPlan::LoopTrim
    }
}

/// x264 settings shared by every finalization path.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub preset: String,
    pub crf: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }
}

/// Produce the final output from a video-only intermediate.
///
/// Priority: external audio track if supplied, else the original
/// input's own audio, else video-only. Mux failures on the audio paths
/// fall back to a video-only transcode rather than failing the video.
pub async fn finalize_video(
    intermediate: &Path,
    original_input: &Path,
    external_audio: Option<&Path>,
    output: &Path,
    settings: &EncodeSettings,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> MediaResult<()> {
    if let Some(audio) = external_audio {
        match mux_external_audio(intermediate, audio, output, settings, cancel_rx).await {
            Ok(()) => return Ok(()),
            Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
            Err(e) => {
                warn!(error = %e, "External audio mux failed, falling back to original audio");
            }
        }
    }

    let original_has_audio = has_audio_stream(original_input).await.unwrap_or(false);
    if original_has_audio {
        match mux_original_audio(intermediate, original_input, output, settings, cancel_rx).await {
            Ok(()) => return Ok(()),
            Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Original audio mux failed, producing video-only output");
            }
        }
    }

    transcode_video_only(intermediate, output, settings, cancel_rx).await
}

/// Align an external audio track to the video duration and mux.
async fn mux_external_audio(
    video: &Path,
    audio: &Path,
    output: &Path,
    settings: &EncodeSettings,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> MediaResult<()> {
    let video_duration = probe_duration(video).await?;
    let audio_duration = probe_duration(audio).await?;
    let plan = plan_alignment(video_duration, audio_duration);
    info!(
        video_duration,
        audio_duration,
        ?plan,
        "Aligning external audio"
    );

    let mut cmd = match plan {
        AudioPlan::Trim => FfmpegCommand::new(output).input(video).input(audio),
        AudioPlan::Stretch(ratio) => {
            // atempo takes a playback-speed multiplier; slowing by the
            // inverse ratio stretches the track to video length
            let tempo = 1.0 / ratio;
            FfmpegCommand::new(output)
                .input(video)
                .input(audio)
                .audio_filter(format!("atempo={tempo:.6}"))
        }
        AudioPlan::LoopTrim => FfmpegCommand::new(output)
            .input(video)
            .input_with_args(audio, ["-stream_loop", "-1"]),
    };

    cmd = cmd
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .video_codec("libx264")
        .preset(settings.preset.clone())
        .crf(settings.crf)
        .args(["-pix_fmt", "yuv420p"])
        .audio_codec("aac")
        .args(["-t", &format!("{video_duration:.3}")]);

    run_ffmpeg(&cmd, cancel_rx)
        .await
        .map_err(|e| match e {
            MediaError::Cancelled => MediaError::Cancelled,
            other => MediaError::AudioMuxFailed(other.to_string()),
        })
}

/// Carry the original input's audio onto the redacted video.
async fn mux_original_audio(
    video: &Path,
    original: &Path,
    output: &Path,
    settings: &EncodeSettings,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output)
        .input(video)
        .input(original)
        .args(["-map", "0:v:0", "-map", "1:a:0"])
        .video_codec("libx264")
        .preset(settings.preset.clone())
        .crf(settings.crf)
        .args(["-pix_fmt", "yuv420p"])
        .audio_codec("aac")
        .arg("-shortest");

    run_ffmpeg(&cmd, cancel_rx)
        .await
        .map_err(|e| match e {
            MediaError::Cancelled => MediaError::Cancelled,
            other => MediaError::AudioMuxFailed(other.to_string()),
        })
}

/// Re-encode to the final profile with no audio stream.
pub async fn transcode_video_only(
    video: &Path,
    output: &Path,
    settings: &EncodeSettings,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(output)
        .input(video)
        .arg("-an")
        .video_codec("libx264")
        .preset(settings.preset.clone())
        .crf(settings.crf)
        .args(["-pix_fmt", "yuv420p"]);

    run_ffmpeg(&cmd, cancel_rx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longer_audio_trimmed() {
        assert_eq!(plan_alignment(10.0, 12.0), AudioPlan::Trim);
    }

    #[test]
    fn test_equal_durations_trim() {
        assert_eq!(plan_alignment(10.0, 10.0), AudioPlan::Trim);
    }

    #[test]
    fn test_shorter_audio_stretched_in_range() {
        match plan_alignment(10.0, 6.0) {
            AudioPlan::Stretch(ratio) => assert!((ratio - 10.0 / 6.0).abs() < 1e-9),
            other => panic!("expected stretch, got {other:?}"),
        }
    }

    #[test]
    fn test_far_shorter_audio_looped() {
        assert_eq!(plan_alignment(10.0, 3.0), AudioPlan::LoopTrim);
    }

    #[test]
    fn test_stretch_boundary_inclusive() {
        assert_eq!(plan_alignment(10.0, 5.0), AudioPlan::Stretch(2.0));
        assert_eq!(plan_alignment(10.0, 4.99), AudioPlan::LoopTrim);
    }

    #[test]
    fn test_zero_audio_duration_trim() {
        assert_eq!(plan_alignment(10.0, 0.0), AudioPlan::Trim);
    }
}
