//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg invocations with one or more inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// (pre-input args, input path) pairs, in order
    inputs: Vec<(Vec<String>, PathBuf)>,
    /// Output arguments (after all inputs)
    output_args: Vec<String>,
    output: PathBuf,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            log_level: "error".to_string(),
        }
    }

    /// Add an input file with no pre-input arguments.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(path, Vec::<String>::new())
    }

    /// Add an input file preceded by the given arguments.
    pub fn input_with_args<I, S>(mut self, path: impl AsRef<Path>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push((
            args.into_iter().map(Into::into).collect(),
            path.as_ref().to_path_buf(),
        ));
        self
    }

    /// Add an output argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.arg("-c:v").arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.arg("-preset").arg(preset)
    }

    pub fn crf(self, crf: u32) -> Self {
        self.arg("-crf").arg(crf.to_string())
    }

    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Build the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];

        for (input_args, path) in &self.inputs {
            args.extend(input_args.clone());
            args.push("-i".to_string());
            args.push(path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Run an FFmpeg command to completion, killing it if cancellation is
/// signalled while it runs.
pub async fn run_ffmpeg(
    cmd: &FfmpegCommand,
    cancel_rx: Option<&watch::Receiver<bool>>,
) -> MediaResult<()> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let args = cmd.build_args();
    debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain stderr concurrently so the process never blocks on a full pipe
    let stderr_handle = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            use tokio::io::AsyncReadExt;
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).to_string()
        })
    });

    let status = if let Some(cancel_rx) = cancel_rx {
        let mut cancel_rx = cancel_rx.clone();
        loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if *cancel_rx.borrow() {
                        info!("FFmpeg cancelled, killing process");
                        let _ = child.kill().await;
                        return Err(MediaError::Cancelled);
                    }
                    if changed.is_err() {
                        // Sender gone without signalling; just wait it out
                        break child.wait().await?;
                    }
                }
                status = child.wait() => break status?,
            }
        }
    } else {
        child.wait().await?
    };

    if status.success() {
        Ok(())
    } else {
        let stderr = match stderr_handle {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(stderr),
            status.code(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_single_input() {
        let cmd = FfmpegCommand::new("/tmp/out.mp4")
            .input("/tmp/in.mp4")
            .video_codec("libx264")
            .preset("veryfast")
            .crf(23);
        let args = cmd.build_args();
        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w == ["-i", "/tmp/in.mp4"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_input_pre_args_precede_input() {
        let cmd = FfmpegCommand::new("/tmp/out.mp4")
            .input("/tmp/video.mp4")
            .input_with_args("/tmp/audio.aac", ["-stream_loop", "-1"]);
        let args = cmd.build_args();
        let loop_pos = args.iter().position(|a| a == "-stream_loop");
        let audio_pos = args.iter().position(|a| a == "/tmp/audio.aac");
        assert!(loop_pos.is_some());
        assert!(loop_pos < audio_pos);
    }
}
