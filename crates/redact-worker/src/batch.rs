//! Sequential batch processing.
//!
//! Videos go through one at a time to bound detector memory. A failed
//! video is skipped with a reason and the batch continues; cancellation
//! stops the batch outright and discards partial output.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use redact_media::detect::OnnxDetectorConfig;
use redact_media::{
    redact_video, rescan_video, FusionEngine, MediaError, OnnxDetector, PipelineContext,
    ProgressSender, ProgressUpdate, RescanOutcome, RescanPass, TrackedDetector,
};
use redact_models::{BatchSummary, VideoOutcome};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Runs one batch over the configured input directory.
pub struct BatchRunner {
    config: WorkerConfig,
}

impl BatchRunner {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Process every video in the input directory, one after another.
    pub async fn run(&self, cancel_rx: watch::Receiver<bool>) -> WorkerResult<BatchSummary> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let inputs = discover_inputs(&self.config.input_dir).await?;
        if inputs.is_empty() {
            return Err(WorkerError::NoInputs(
                self.config.input_dir.display().to_string(),
            ));
        }
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, count = inputs.len(), "Starting batch");

        let (progress_tx, progress_rx) = ProgressSender::channel(PROGRESS_CHANNEL_CAPACITY);
        let poller = tokio::spawn(poll_progress(
            progress_rx,
            Duration::from_millis(self.config.progress_poll_ms),
        ));

        let mut summary = BatchSummary::default();
        for input in inputs {
            if *cancel_rx.borrow() {
                summary.cancelled = true;
                break;
            }

            let output = self.output_path(&input);
            match self
                .process_one(&input, &output, &progress_tx, &cancel_rx)
                .await
            {
                Ok(outcome) => summary.record(outcome),
                Err(WorkerError::Media(MediaError::Cancelled)) => {
                    warn!(input = %input.display(), "Cancelled mid-video, stopping batch");
                    let _ = tokio::fs::remove_file(&output).await;
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(input = %input.display(), error = %e, "Video skipped");
                    let _ = tokio::fs::remove_file(&output).await;
                    summary.record(VideoOutcome::skipped(input, e.to_string()));
                }
            }
        }

        drop(progress_tx);
        let _ = poller.await;

        let elapsed = Utc::now() - started_at;
        info!(
            %run_id,
            processed = summary.processed,
            skipped = summary.skipped,
            rescan_fixed_frames = summary.rescan_fixed_frames,
            cancelled = summary.cancelled,
            elapsed_secs = elapsed.num_seconds(),
            "Batch finished"
        );
        self.write_summary(&summary).await;
        Ok(summary)
    }

    /// Best-effort machine-readable record next to the outputs.
    async fn write_summary(&self, summary: &BatchSummary) {
        let path = self.config.output_dir.join("summary.json");
        match serde_json::to_vec_pretty(summary) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    warn!(path = %path.display(), error = %e, "Failed to write batch summary");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize batch summary"),
        }
    }

    async fn process_one(
        &self,
        input: &Path,
        output: &Path,
        progress: &ProgressSender,
        cancel_rx: &watch::Receiver<bool>,
    ) -> WorkerResult<VideoOutcome> {
        let ctx = PipelineContext {
            config: &self.config.redaction,
            progress: Some(progress),
            cancel_rx: Some(cancel_rx),
            external_audio: self.config.external_audio.as_deref(),
        };

        let mut engine = self.build_engine()?;
        let frames = redact_video(input, output, &mut engine, &ctx).await?;

        let mut outcome = VideoOutcome::processed(input.to_path_buf(), output.to_path_buf(), frames);
        if self.config.redaction.rescan_enabled {
            let mut pass = self.build_rescan_pass()?;
            fold_rescan(&mut outcome, rescan_video(output, &mut pass, &ctx).await)?;
        }

        Ok(outcome)
    }

    /// Fresh detector stack for one video's session.
    fn build_engine(&self) -> WorkerResult<FusionEngine> {
        let redaction = &self.config.redaction;

        let primary = OnnxDetector::new(
            OnnxDetectorConfig::explicit_regions(
                self.config.primary_model.to_string_lossy().into_owned(),
                redaction.min_confidence,
            ),
            "primary",
        )?;
        let secondary = OnnxDetector::new(
            OnnxDetectorConfig::explicit_regions(
                self.config.secondary_model.to_string_lossy().into_owned(),
                redaction.min_confidence,
            ),
            "secondary",
        )?;
        let tertiary = self.build_tertiary()?;

        Ok(FusionEngine::new(
            Box::new(TrackedDetector::new(Box::new(primary))),
            Some(Box::new(secondary)),
            tertiary,
            redaction.clone(),
        ))
    }

    fn build_rescan_pass(&self) -> WorkerResult<RescanPass> {
        let secondary = OnnxDetector::new(
            OnnxDetectorConfig::explicit_regions(
                self.config.secondary_model.to_string_lossy().into_owned(),
                self.config.redaction.min_confidence,
            ),
            "rescan_secondary",
        )?;
        Ok(RescanPass::new(Box::new(secondary), self.build_tertiary()?))
    }

    fn build_tertiary(&self) -> WorkerResult<Option<Box<dyn redact_media::DetectorLayer>>> {
        let Some(model) = self.config.tertiary_model.as_ref() else {
            return Ok(None);
        };
        // A missing tertiary model disables the layer; only the
        // primary/secondary weights are required.
        let detector = match OnnxDetector::new(
            OnnxDetectorConfig::exposure_classes(
                model.to_string_lossy().into_owned(),
                self.config.redaction.min_confidence_tertiary,
            ),
            "tertiary",
        ) {
            Ok(detector) => detector,
            Err(MediaError::ModelNotFound(path)) => {
                warn!(model = %path, "Tertiary model not found, layer disabled");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(Box::new(detector)))
    }

    /// Output name: input stem plus an `_mc` suffix, always mp4.
    fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.config.output_dir.join(format!("{stem}_mc.mp4"))
    }
}

/// Fold a rescan result into an already-processed outcome.
///
/// The redacted output is finalized before the rescan starts, so a
/// failed verification pass keeps that file and reports the video as
/// processed with nothing patched. Cancellation still aborts.
fn fold_rescan(
    outcome: &mut VideoOutcome,
    result: Result<RescanOutcome, MediaError>,
) -> WorkerResult<()> {
    match result {
        Ok(rescan) => outcome.rescan_fixed = rescan.fixed_frames,
        Err(MediaError::Cancelled) => return Err(MediaError::Cancelled.into()),
        Err(e) => {
            warn!(input = %outcome.input.display(), error = %e, "Rescan failed, keeping redacted output");
            outcome.rescan_fixed = 0;
        }
    }
    Ok(())
}

/// Collect video files from a directory, sorted for stable order.
async fn discover_inputs(dir: &Path) -> WorkerResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut inputs = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            continue;
        };
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            inputs.push(path);
        }
    }

    inputs.sort();
    Ok(inputs)
}

/// Log progress at a fixed cadence with non-blocking receives. The
/// worker never waits on this task; a lagging poller just sees fewer
/// samples.
async fn poll_progress(mut rx: mpsc::Receiver<ProgressUpdate>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;

        let mut latest: Option<ProgressUpdate> = None;
        let disconnected = loop {
            match rx.try_recv() {
                Ok(update) => latest = Some(update),
                Err(mpsc::error::TryRecvError::Empty) => break false,
                Err(mpsc::error::TryRecvError::Disconnected) => break true,
            }
        };

        if let Some(update) = latest {
            info!(
                stage = ?update.stage,
                frame = update.frame_index,
                total = update.total_frames,
                percent = format!("{:.1}", update.percent()),
                fixed = update.fixed_count,
                "Progress"
            );
        }
        if disconnected {
            return;
        }
    }
}
