//! Capture windows for assembling sample batches.
//!
//! The capture collaborator asks for a window of a given duration; the
//! requested duration is clamped to the policy bounds before any sample is
//! accepted. Samples are collected until one arrives at or past the window
//! end.

use crate::capture::types::{CaptureError, HeartRateSample, SampleBatch};
use crate::config::CaptureDurationBounds;
use chrono::{DateTime, Duration, Utc};

/// A time window collecting heart-rate samples.
#[derive(Debug, Clone)]
pub struct CaptureWindow {
    /// Duration actually used after clamping
    duration: Duration,
    /// Start time, set by the first accepted sample
    start: Option<DateTime<Utc>>,
    /// Samples collected so far
    samples: Vec<HeartRateSample>,
    /// Whether a sample past the window end has been seen
    complete: bool,
}

impl CaptureWindow {
    /// Create a window for `requested_secs`, clamped to `bounds`.
    pub fn new(requested_secs: u64, bounds: &CaptureDurationBounds) -> Self {
        let secs = bounds.clamp(requested_secs);
        Self {
            duration: Duration::seconds(secs as i64),
            start: None,
            samples: Vec::new(),
            complete: false,
        }
    }

    /// Duration of this window in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration.num_milliseconds() as f64 / 1000.0
    }

    /// End of the window, once the first sample has fixed its start.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.start.map(|start| start + self.duration)
    }

    /// Add a sample. Returns `true` once the window is complete.
    ///
    /// A sample at or past the window end completes the window and is not
    /// included in it.
    pub fn push(&mut self, sample: HeartRateSample) -> bool {
        if self.complete {
            return true;
        }

        let start = *self.start.get_or_insert(sample.timestamp);
        if sample.timestamp >= start + self.duration {
            self.complete = true;
            return true;
        }

        self.samples.push(sample);
        false
    }

    /// Mark the window complete (e.g. the sensor stream ended early).
    pub fn close(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Turn the collected samples into a batch.
    pub fn into_batch(self) -> Result<SampleBatch, CaptureError> {
        SampleBatch::new(self.samples)
    }
}
