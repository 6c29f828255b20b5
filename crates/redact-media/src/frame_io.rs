//! Raw frame streaming over FFmpeg pipes.
//!
//! Frames move through the pipeline as packed RGB24: the decoder spawns
//! `ffmpeg ... -f rawvideo -pix_fmt rgb24 -` and pulls fixed-size frames
//! from stdout; the encoder feeds the same format into a second FFmpeg
//! process that writes the intermediate video-only H.264 file.

use image::RgbImage;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Sequential pull of decoded frames from a video file.
pub struct FrameDecoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: JoinHandle<String>,
    width: u32,
    height: u32,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Open a decoder for `path` at the container's native size and rate.
    pub async fn open(path: impl AsRef<Path>, width: u32, height: u32) -> MediaResult<Self> {
        let path = path.as_ref();
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        if width == 0 || height == 0 {
            return Err(MediaError::decode_failed(format!(
                "Zero-sized frame dimensions for {}",
                path.display()
            )));
        }

        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::decode_failed(format!("Failed to spawn FFmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::decode_failed("Failed to capture FFmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::decode_failed("Failed to capture FFmpeg stderr"))?;

        // Drain stderr concurrently so FFmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut out = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut out).await;
            out
        });

        debug!("Frame decoder opened: {} ({}x{})", path.display(), width, height);

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            width,
            height,
            buf: vec![0u8; (width * height * 3) as usize],
        })
    }

    /// Read the next frame, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut filled = 0usize;
        while filled < self.buf.len() {
            let n = self.stdout.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        if filled < self.buf.len() {
            return Err(MediaError::decode_failed(format!(
                "Truncated frame: got {} of {} bytes",
                filled,
                self.buf.len()
            )));
        }

        RgbImage::from_raw(self.width, self.height, self.buf.clone())
            .ok_or_else(|| MediaError::decode_failed("Failed to build frame buffer"))
            .map(Some)
    }

    /// Wait for the decoder process, surfacing FFmpeg errors.
    pub async fn finish(mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        let stderr = self.stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(MediaError::decode_failed(format!(
                "FFmpeg decode exited with {:?}: {}",
                status.code(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Kill the decoder process, used on cancellation paths.
    pub async fn abort(mut self) {
        let _ = self.child.kill().await;
        self.stderr_task.abort();
    }
}

/// Sequential push of frames into an intermediate video-only file.
pub struct FrameEncoder {
    child: Child,
    stdin: ChildStdin,
    width: u32,
    height: u32,
}

impl FrameEncoder {
    /// Open an encoder writing H.264/yuv420p at the given size and rate.
    pub async fn create(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        preset: &str,
        crf: u32,
    ) -> MediaResult<Self> {
        let path = path.as_ref();
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{width}x{height}"),
                "-r",
                &format!("{fps:.6}"),
                "-i",
                "-",
                "-an",
                "-c:v",
                "libx264",
                "-preset",
                preset,
                "-crf",
                &crf.to_string(),
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::encode_failed(format!("Failed to spawn FFmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::encode_failed("Failed to capture FFmpeg stdin"))?;

        debug!(
            "Frame encoder opened: {} ({}x{} @ {:.3} fps)",
            path.display(),
            width,
            height,
            fps
        );

        Ok(Self {
            child,
            stdin,
            width,
            height,
        })
    }

    /// Write one frame. The frame must match the encoder dimensions.
    pub async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MediaError::encode_failed(format!(
                "Frame size {}x{} does not match encoder {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        self.stdin
            .write_all(frame.as_raw())
            .await
            .map_err(|e| MediaError::encode_failed(format!("Write to FFmpeg failed: {e}")))
    }

    /// Close the stream and wait for FFmpeg to finalize the file.
    pub async fn finish(self) -> MediaResult<()> {
        let FrameEncoder {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| MediaError::encode_failed(format!("FFmpeg wait failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::encode_failed(format!(
                "FFmpeg encode exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    /// Kill the encoder process, used on cancellation paths.
    pub async fn abort(self) {
        let FrameEncoder {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        let _ = child.kill().await;
    }
}
