//! Worker configuration.

use std::path::PathBuf;

use redact_models::{RedactionConfig, RedactionPattern};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory scanned for input videos
    pub input_dir: PathBuf,
    /// Directory receiving redacted outputs
    pub output_dir: PathBuf,
    /// ONNX weights for the primary (tracked) and secondary layers
    pub primary_model: PathBuf,
    /// Separate weights for the stateless secondary layer; defaults to
    /// the primary weights
    pub secondary_model: PathBuf,
    /// Optional tertiary classifier weights; layer disabled when unset
    pub tertiary_model: Option<PathBuf>,
    /// Optional external audio track muxed onto every output
    pub external_audio: Option<PathBuf>,
    /// Interval between progress log lines, in milliseconds
    pub progress_poll_ms: u64,
    /// Fusion and rendering parameters
    pub redaction: RedactionConfig,
}

impl WorkerConfig {
    /// Assemble config from environment variables. Fails when required
    /// paths are missing; detection parameters all have defaults.
    pub fn from_env() -> WorkerResult<Self> {
        let input_dir = required_path("REDACT_INPUT_DIR")?;
        let output_dir = required_path("REDACT_OUTPUT_DIR")?;
        let primary_model = required_path("REDACT_PRIMARY_MODEL")?;
        let secondary_model = optional_path("REDACT_SECONDARY_MODEL")
            .unwrap_or_else(|| primary_model.clone());
        let tertiary_model = optional_path("REDACT_TERTIARY_MODEL");
        let external_audio = optional_path("REDACT_EXTERNAL_AUDIO");

        let mut redaction = RedactionConfig::default();
        if let Ok(raw) = std::env::var("REDACT_PATTERN") {
            redaction.pattern = raw
                .parse::<RedactionPattern>()
                .map_err(WorkerError::ConfigError)?;
        }
        redaction.max_lost_frames = env_parse("REDACT_MAX_LOST_FRAMES", redaction.max_lost_frames);
        redaction.iou_threshold = env_parse("REDACT_IOU_THRESHOLD", redaction.iou_threshold);
        redaction.min_confidence = env_parse("REDACT_MIN_CONFIDENCE", redaction.min_confidence);
        redaction.min_confidence_tertiary = env_parse(
            "REDACT_MIN_CONFIDENCE_TERTIARY",
            redaction.min_confidence_tertiary,
        );
        redaction.tracker_reset_interval = env_parse(
            "REDACT_TRACKER_RESET_INTERVAL",
            redaction.tracker_reset_interval,
        );
        redaction.rescan_enabled = env_parse("REDACT_RESCAN", redaction.rescan_enabled);

        Ok(Self {
            input_dir,
            output_dir,
            primary_model,
            secondary_model,
            tertiary_model,
            external_audio,
            progress_poll_ms: env_parse("REDACT_PROGRESS_POLL_MS", 500),
            redaction,
        })
    }
}

fn required_path(var: &str) -> WorkerResult<PathBuf> {
    std::env::var(var)
        .map(PathBuf::from)
        .map_err(|_| WorkerError::config_error(format!("{var} must be set")))
}

fn optional_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
