//! Feature extraction from validated heart-rate batches.
//!
//! Heart-rate values are converted to beat intervals (ms) for the
//! successive-difference descriptors (RMSSD, pNN50). Level and spread
//! descriptors (mean, min, max, SDNN, triangular index) are computed on the
//! BPM values themselves. Output is a pure function of the sample sequence.

use crate::capture::SampleBatch;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Successive interval difference (ms) counted by pNN50.
pub const NN50_THRESHOLD_MS: f64 = 50.0;

/// Normalization scales shared with the similarity scorer.
pub const RMSSD_SCALE: f64 = 50.0;
pub const SDNN_SCALE: f64 = 75.0;
pub const PNN50_SCALE: f64 = 0.3;
pub const MEAN_HR_SCALE: f64 = 30.0;
pub const TRIANGULAR_INDEX_SCALE: f64 = 0.5;
pub const OVERALL_VARIABILITY_SCALE: f64 = 1.0;

/// Spread below which a vector is treated as a flat line.
pub const FLAT_SDNN_BPM: f64 = 0.5;
pub const FLAT_RMSSD_MS: f64 = 2.0;

/// Fixed-size descriptor set for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Mean heart rate (BPM)
    pub mean_hr: f64,
    /// Lowest heart rate (BPM)
    pub min_hr: f64,
    /// Highest heart rate (BPM)
    pub max_hr: f64,
    /// Population standard deviation of heart rate (BPM)
    pub sdnn: f64,
    /// Root mean square of successive interval differences (ms)
    pub rmssd: f64,
    /// Fraction of successive interval differences above 50 ms
    pub pnn50: f64,
    /// (max - min) / mean
    pub triangular_index: f64,
    /// Mean of RMSSD, SDNN and pNN50 each divided by its scale
    pub overall_variability: f64,
}

impl FeatureVector {
    /// Descriptor values in a fixed order, paired with their names.
    pub fn descriptors(&self) -> [(&'static str, f64); 8] {
        [
            ("mean_hr", self.mean_hr),
            ("min_hr", self.min_hr),
            ("max_hr", self.max_hr),
            ("sdnn", self.sdnn),
            ("rmssd", self.rmssd),
            ("pnn50", self.pnn50),
            ("triangular_index", self.triangular_index),
            ("overall_variability", self.overall_variability),
        ]
    }

    /// Every descriptor finite and non-negative, pNN50 within [0, 1].
    pub fn is_valid(&self) -> bool {
        self.descriptors()
            .iter()
            .all(|(_, v)| v.is_finite() && *v >= 0.0)
            && self.pnn50 <= 1.0
    }

    /// True for a flat-line artifact: spread and beat-to-beat variation both
    /// below anything a pulse produces.
    pub fn is_zero_variability(&self) -> bool {
        self.sdnn < FLAT_SDNN_BPM && self.rmssd < FLAT_RMSSD_MS
    }
}

/// Feature extraction errors.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureError {
    /// No finite, positive heart-rate value in the batch
    NoUsableSamples,
    /// A descriptor came out non-finite or out of bounds
    InvalidVector(String),
}

impl std::fmt::Display for FeatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureError::NoUsableSamples => write!(f, "No usable heart-rate samples"),
            FeatureError::InvalidVector(e) => write!(f, "Invalid feature vector: {e}"),
        }
    }
}

impl std::error::Error for FeatureError {}

/// Extract the feature vector of a batch that passed validation.
///
/// Non-finite and non-positive readings (sensor dropouts the validator
/// tolerated) are skipped.
pub fn extract_features(batch: &SampleBatch) -> Result<FeatureVector, FeatureError> {
    let values: Vec<f64> = batch
        .samples()
        .iter()
        .map(|s| s.bpm)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();

    if values.is_empty() {
        return Err(FeatureError::NoUsableSamples);
    }

    let vector = compute_vector(&values);
    if !vector.is_valid() {
        return Err(FeatureError::InvalidVector(format!("{vector:?}")));
    }
    Ok(vector)
}

fn compute_vector(values: &[f64]) -> FeatureVector {
    let mean_hr = values.iter().mean();
    let (min_hr, max_hr) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if values.len() < 2 {
        return FeatureVector {
            mean_hr,
            min_hr,
            max_hr,
            sdnn: 0.0,
            rmssd: 0.0,
            pnn50: 0.0,
            triangular_index: 0.0,
            overall_variability: 0.0,
        };
    }

    let sdnn = values.iter().population_std_dev();

    let intervals: Vec<f64> = values.iter().map(|bpm| 60_000.0 / bpm).collect();
    let successive: Vec<f64> = intervals.windows(2).map(|w| w[1] - w[0]).collect();

    let rmssd = successive.iter().map(|d| d * d).mean().sqrt();
    let pnn50 = successive
        .iter()
        .filter(|d| d.abs() > NN50_THRESHOLD_MS)
        .count() as f64
        / successive.len() as f64;

    let triangular_index = if max_hr > min_hr {
        (max_hr - min_hr) / mean_hr
    } else {
        0.0
    };

    let overall_variability =
        (rmssd / RMSSD_SCALE + sdnn / SDNN_SCALE + pnn50 / PNN50_SCALE) / 3.0;

    FeatureVector {
        mean_hr,
        min_hr,
        max_hr,
        sdnn,
        rmssd,
        pnn50,
        triangular_index,
        overall_variability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quality::tests::realistic_values;
    use chrono::Utc;

    fn batch(values: &[f64]) -> SampleBatch {
        SampleBatch::from_values(values, Utc::now(), 40).unwrap()
    }

    #[test]
    fn test_single_sample_has_zero_variability() {
        let features = extract_features(&batch(&[72.0])).unwrap();
        assert_eq!(features.mean_hr, 72.0);
        assert_eq!(features.min_hr, 72.0);
        assert_eq!(features.max_hr, 72.0);
        assert_eq!(features.sdnn, 0.0);
        assert_eq!(features.rmssd, 0.0);
        assert_eq!(features.pnn50, 0.0);
        assert_eq!(features.triangular_index, 0.0);
        assert!(features.is_zero_variability());
    }

    #[test]
    fn test_stuck_sensor_counts_as_flat() {
        let mut values = vec![75.0; 300];
        values[150] = 76.0;
        let features = extract_features(&batch(&values)).unwrap();
        assert!(features.sdnn > 0.0 && features.rmssd > 0.0);
        assert!(features.is_zero_variability());

        let real = extract_features(&batch(&realistic_values(300, 120.0, 2.0))).unwrap();
        assert!(!real.is_zero_variability());
    }

    #[test]
    fn test_two_samples() {
        // 60 BPM -> 1000 ms, 75 BPM -> 800 ms
        let features = extract_features(&batch(&[60.0, 75.0])).unwrap();
        assert!((features.mean_hr - 67.5).abs() < 1e-12);
        assert!((features.sdnn - 7.5).abs() < 1e-12);
        assert!((features.rmssd - 200.0).abs() < 1e-9);
        assert_eq!(features.pnn50, 1.0);
        assert!((features.triangular_index - 15.0 / 67.5).abs() < 1e-12);
    }

    #[test]
    fn test_small_differences_do_not_count_for_pnn50() {
        // 75 -> 76 BPM is about 10.5 ms
        let features = extract_features(&batch(&[75.0, 76.0, 75.0, 76.0])).unwrap();
        assert_eq!(features.pnn50, 0.0);
        assert!(features.rmssd > 10.0 && features.rmssd < 11.0);
    }

    #[test]
    fn test_dropouts_are_skipped() {
        let features = extract_features(&batch(&[70.0, f64::NAN, 0.0, 72.0])).unwrap();
        assert_eq!(features.min_hr, 70.0);
        assert_eq!(features.max_hr, 72.0);
        assert!(features.is_valid());
    }

    #[test]
    fn test_no_usable_samples() {
        assert_eq!(
            extract_features(&batch(&[f64::NAN, -1.0])),
            Err(FeatureError::NoUsableSamples)
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let b = batch(&realistic_values(300, 75.0, 8.0));
        let first = extract_features(&b).unwrap();
        let second = extract_features(&b).unwrap();
        assert_eq!(first, second);
        assert!(first.is_valid());
        assert!(first.sdnn > 7.0 && first.sdnn < 9.0);
    }

    #[test]
    fn test_invalid_vector_detection() {
        let mut features = extract_features(&batch(&realistic_values(50, 75.0, 8.0))).unwrap();
        assert!(features.is_valid());
        features.rmssd = f64::NAN;
        assert!(!features.is_valid());
        features.rmssd = 10.0;
        features.pnn50 = 1.5;
        assert!(!features.is_valid());
    }
}
