//! Outcome reporting for batch runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of processing one input video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoOutcome {
    pub input: PathBuf,
    /// Final output path; `None` when the video was skipped
    pub output: Option<PathBuf>,
    /// Frames written to the output
    pub frames: u64,
    /// Frames patched by the verification rescan
    pub rescan_fixed: u64,
    /// Reason the video was skipped, if it was
    pub skip_reason: Option<String>,
}

impl VideoOutcome {
    /// Successful outcome.
    pub fn processed(input: PathBuf, output: PathBuf, frames: u64) -> Self {
        Self {
            input,
            output: Some(output),
            frames,
            rescan_fixed: 0,
            skip_reason: None,
        }
    }

    /// Skip-and-continue outcome with a reported reason.
    pub fn skipped(input: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            input,
            output: None,
            frames: 0,
            rescan_fixed: 0,
            skip_reason: Some(reason.into()),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.output.is_some()
    }
}

/// Final summary of one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    /// Total frames patched across all rescans
    pub rescan_fixed_frames: u64,
    /// Whether the batch stopped early due to cancellation
    pub cancelled: bool,
    pub outcomes: Vec<VideoOutcome>,
}

impl BatchSummary {
    /// Fold one video outcome into the summary.
    pub fn record(&mut self, outcome: VideoOutcome) {
        if outcome.is_processed() {
            self.processed += 1;
        } else {
            self.skipped += 1;
        }
        self.rescan_fixed_frames += outcome.rescan_fixed;
        self.outcomes.push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary::default();
        summary.record(VideoOutcome::processed(
            "a.mp4".into(),
            "out/a_mc.mp4".into(),
            300,
        ));
        summary.record(VideoOutcome::skipped("b.mp4".into(), "cannot open"));

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.outcomes.len(), 2);
    }

    #[test]
    fn test_rescan_fixed_accumulates() {
        let mut summary = BatchSummary::default();
        let mut outcome = VideoOutcome::processed("a.mp4".into(), "a_mc.mp4".into(), 10);
        outcome.rescan_fixed = 4;
        summary.record(outcome);
        assert_eq!(summary.rescan_fixed_frames, 4);
    }
}
