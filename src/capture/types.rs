//! Heart-rate sample types handed over by the capture collaborator.
//!
//! Values are raw sensor output. Nothing here sanitizes them; that is the
//! job of the quality validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single heart-rate reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// Heart rate in beats per minute (unsanitized)
    pub bpm: f64,
    /// When the sensor produced the reading
    pub timestamp: DateTime<Utc>,
}

impl HeartRateSample {
    pub fn new(bpm: f64, timestamp: DateTime<Utc>) -> Self {
        Self { bpm, timestamp }
    }

    /// Create a sample stamped with the current time.
    pub fn now(bpm: f64) -> Self {
        Self {
            bpm,
            timestamp: Utc::now(),
        }
    }
}

/// An ordered, non-empty batch of samples from one capture window.
///
/// Batches are consumed once by the validator and feature extractor and are
/// not retained afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<HeartRateSample>", into = "Vec<HeartRateSample>")]
pub struct SampleBatch {
    samples: Vec<HeartRateSample>,
}

impl SampleBatch {
    /// Build a batch, preserving insertion order.
    pub fn new(samples: Vec<HeartRateSample>) -> Result<Self, CaptureError> {
        if samples.is_empty() {
            return Err(CaptureError::EmptyBatch);
        }
        Ok(Self { samples })
    }

    /// Build a batch from bare BPM values spaced `interval_ms` apart.
    pub fn from_values(
        values: &[f64],
        start: DateTime<Utc>,
        interval_ms: i64,
    ) -> Result<Self, CaptureError> {
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, &bpm)| {
                let offset = chrono::Duration::milliseconds(interval_ms * i as i64);
                HeartRateSample::new(bpm, start + offset)
            })
            .collect();
        Self::new(samples)
    }

    pub fn samples(&self) -> &[HeartRateSample] {
        &self.samples
    }

    /// BPM values in capture order.
    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.bpm).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.samples[0].timestamp
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.samples[self.samples.len() - 1].timestamp
    }
}

impl TryFrom<Vec<HeartRateSample>> for SampleBatch {
    type Error = CaptureError;

    fn try_from(samples: Vec<HeartRateSample>) -> Result<Self, Self::Error> {
        Self::new(samples)
    }
}

impl From<SampleBatch> for Vec<HeartRateSample> {
    fn from(batch: SampleBatch) -> Self {
        batch.samples
    }
}

/// Errors raised while assembling or replaying a capture.
#[derive(Debug)]
pub enum CaptureError {
    /// A batch must contain at least one sample
    EmptyBatch,
    /// The replay collector is already streaming
    AlreadyRunning,
    /// A recording could not be read
    Io(String),
    /// A recording could not be parsed
    Parse(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::EmptyBatch => write!(f, "Sample batch is empty"),
            CaptureError::AlreadyRunning => write!(f, "Collector is already running"),
            CaptureError::Io(e) => write!(f, "IO error: {e}"),
            CaptureError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_rejected() {
        assert!(matches!(
            SampleBatch::new(Vec::new()),
            Err(CaptureError::EmptyBatch)
        ));
    }

    #[test]
    fn test_from_values_preserves_order() {
        let start = Utc::now();
        let batch = SampleBatch::from_values(&[70.0, 71.0, 69.5], start, 50).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.values(), vec![70.0, 71.0, 69.5]);
        assert_eq!(batch.first_timestamp(), start);
        assert_eq!(
            batch.last_timestamp(),
            start + chrono::Duration::milliseconds(100)
        );
    }

    #[test]
    fn test_batch_deserialization_rejects_empty() {
        let result: Result<SampleBatch, _> = serde_json::from_str("[]");
        assert!(result.is_err());
    }
}
