//! Progress reporting between the pipeline and its poller.
//!
//! The worker pushes throttled updates into a bounded channel; the
//! consumer polls it at its own cadence with non-blocking receives.
//! Detection latency never waits on a slow consumer: when the channel
//! is full, updates are dropped.

use tokio::sync::mpsc;

/// Stage of processing an update refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Redacting,
    Rescanning,
    Finalizing,
}

/// One progress sample.
#[derive(Debug, Clone, Copy)]
pub struct ProgressUpdate {
    pub stage: ProgressStage,
    pub frame_index: u64,
    pub total_frames: u64,
    /// Frames patched so far, rescan stage only
    pub fixed_count: Option<u64>,
}

impl ProgressUpdate {
    pub fn percent(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        (self.frame_index as f64 / self.total_frames as f64 * 100.0).min(100.0)
    }
}

const REPORT_EVERY: u64 = 10;

/// Throttled sender: reports the first frame, every tenth frame, and
/// the last frame.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ProgressSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Report a frame if it falls on the throttle cadence.
    pub fn frame(&self, stage: ProgressStage, frame_index: u64, total_frames: u64, fixed_count: Option<u64>) {
        let is_last = total_frames > 0 && frame_index + 1 >= total_frames;
        if frame_index % REPORT_EVERY != 0 && !is_last {
            return;
        }
        // Dropped when the consumer lags; the next sample supersedes it
        let _ = self.tx.try_send(ProgressUpdate {
            stage,
            frame_index,
            total_frames,
            fixed_count,
        });
    }
}
