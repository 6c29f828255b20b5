//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    /// Input video cannot be opened or contains no frames.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Output writer could not be created or rejected a frame.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// One detector layer failed for one frame. Recovered locally; the
    /// frame proceeds with the remaining layers' output.
    #[error("Detector layer failed: {0}")]
    DetectorFailed(String),

    /// Audio muxing failed; callers fall back to video-only transcode.
    #[error("Audio mux failed: {0}")]
    AudioMuxFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a detector failure error.
    pub fn detector_failed(message: impl Into<String>) -> Self {
        Self::DetectorFailed(message.into())
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a decode failure error.
    pub fn decode_failed(message: impl Into<String>) -> Self {
        Self::DecodeFailed(message.into())
    }

    /// Create an encode failure error.
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error is a cooperative cancellation, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
