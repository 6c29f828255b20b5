//! Video redaction pipeline: multi-layer region detection fusion,
//! temporal fallback tracking, pattern rendering, and the verification
//! rescan, built on FFmpeg for frame I/O and ONNX Runtime for
//! inference.

pub mod command;
pub mod detect;
pub mod error;
pub mod finalize;
pub mod frame_io;
pub mod fs_utils;
pub mod fusion;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod render;
pub mod rescan;

pub use command::{run_ffmpeg, FfmpegCommand};
pub use detect::{
    ColorBlobDetector, DetectorLayer, OnnxDetector, OnnxDetectorConfig, RawDetection,
    ScriptedDetector, TrackedDetector,
};
pub use error::{MediaError, MediaResult};
pub use finalize::{finalize_video, plan_alignment, AudioPlan, EncodeSettings};
pub use frame_io::{FrameDecoder, FrameEncoder};
pub use fusion::{FusionEngine, FusionOutcome, SourceBreakdown};
pub use pipeline::{redact_video, PipelineContext};
pub use probe::{probe_video, VideoInfo};
pub use progress::{ProgressSender, ProgressStage, ProgressUpdate};
pub use render::redact_regions;
pub use rescan::{rescan_video, RescanOutcome, RescanPass};
