//! Progress reporting.
//!
//! Transcoding a long clip can take minutes. A [`ProgressCallback`] attached
//! through [`TranscodeOptions::with_progress`](crate::TranscodeOptions::with_progress)
//! is told how many frames have been encoded so far and, when the input
//! container records a frame count, how far along the run is.
//!
//! Callbacks observe only. There is no way to stop a transcode once it has
//! started.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A snapshot of transcode progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames handed to the encoder so far.
    pub current: u64,
    /// Total frames expected, if the input records it.
    pub total: Option<u64>,
    /// Completion percentage from 0.0 to 100.0, if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the frame loop started.
    pub elapsed: Duration,
    /// Estimated time remaining, from throughput so far.
    pub estimated_remaining: Option<Duration>,
}

/// Receives progress updates during a transcode.
///
/// Invoked synchronously on the thread running the transcode, so
/// implementations should return quickly.
pub trait ProgressCallback: Send + Sync {
    /// Called every `batch_size` frames and once more at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Counts frames and fires the callback at the configured cadence.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>, batch_size: u64) -> Self {
        Self {
            callback,
            total: total.filter(|&t| t > 0),
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    /// Record one encoded frame.
    pub(crate) fn advance(&mut self) {
        self.current += 1;
        self.since_last_report += 1;

        if self.since_last_report >= self.batch_size {
            self.report();
            self.since_last_report = 0;
        }
    }

    /// Emit a final report regardless of cadence.
    pub(crate) fn finish(&mut self) {
        self.report();
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed();

        // Frame counts from containers are estimates; never report past 100%.
        let percentage = self
            .total
            .map(|t| (self.current.min(t) as f32 / t as f32) * 100.0);

        let estimated_remaining = match self.total {
            Some(total) if self.current > 0 => {
                let remaining = total.saturating_sub(self.current);
                Some(elapsed.mul_f64(remaining as f64 / self.current as f64))
            }
            _ => None,
        };

        self.callback.on_progress(&ProgressInfo {
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
        });
    }
}
