//! Signal quality validation for raw heart-rate batches.
//!
//! A batch is checked structurally first (sample count, flat line,
//! physiological band). Structurally sound batches are then scored on seven
//! weighted components and rejected when the combined score is too low.
//! Validation is a pure function of the batch and the policy.

use crate::capture::SampleBatch;
use crate::config::AuthPolicy;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Physiologically plausible heart-rate band (BPM).
pub const MIN_PLAUSIBLE_BPM: f64 = 40.0;
pub const MAX_PLAUSIBLE_BPM: f64 = 200.0;

const NO_PULSE_HINT: &str = "No pulse detected; reposition the sensor and try again";

/// Number of segments used for the consistency check.
const CONSISTENCY_SEGMENTS: usize = 10;

/// Relative segment deviation that drives consistency to zero is 1/this.
const CONSISTENCY_SENSITIVITY: f64 = 5.0;

/// Signal-to-noise ratio mapped to a zero score.
const SNR_FLOOR: f64 = 2.0;

/// Signal-to-noise ratio mapped to a full score.
const SNR_TARGET: f64 = 10.0;

/// Mean absolute successive difference (BPM) below which HRV looks degenerate.
const HRV_MIN_MEAN_DIFF: f64 = 0.5;

/// Mean absolute successive difference (BPM) below which there is no pulse
/// variability at all, only a stuck reading.
const HRV_DEGENERATE_MEAN_DIFF: f64 = 0.1;

/// Share of unchanged successive readings above which the signal is stuck.
const HRV_MAX_UNCHANGED_RATIO: f64 = 0.9;

/// Mean absolute successive difference (BPM) above which HRV looks like noise.
const HRV_MAX_MEAN_DIFF: f64 = 15.0;

/// Successive jump (BPM) counted as instability.
const STABILITY_MAX_JUMP: f64 = 20.0;

/// Reasons a batch is not acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFailure {
    InsufficientSamples,
    OutOfRange,
    NoVariation,
    ExcessiveNoise,
    BelowQualityThreshold,
}

impl std::fmt::Display for QualityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            QualityFailure::InsufficientSamples => "insufficient samples",
            QualityFailure::OutOfRange => "heart rate out of range",
            QualityFailure::NoVariation => "no signal variation",
            QualityFailure::ExcessiveNoise => "excessive noise",
            QualityFailure::BelowQualityThreshold => "quality below threshold",
        };
        f.write_str(text)
    }
}

/// Named components of the combined quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityComponent {
    SampleCount,
    Range,
    SignalQuality,
    Consistency,
    HrvSanity,
    Completeness,
    Stability,
}

impl QualityComponent {
    pub const ALL: [QualityComponent; 7] = [
        QualityComponent::SampleCount,
        QualityComponent::Range,
        QualityComponent::SignalQuality,
        QualityComponent::Consistency,
        QualityComponent::HrvSanity,
        QualityComponent::Completeness,
        QualityComponent::Stability,
    ];

    /// Weight in the combined score. Weights sum to 1.
    pub fn weight(self) -> f64 {
        match self {
            QualityComponent::SampleCount => 0.15,
            QualityComponent::Range => 0.15,
            QualityComponent::SignalQuality => 0.25,
            QualityComponent::Consistency => 0.15,
            QualityComponent::HrvSanity => 0.15,
            QualityComponent::Completeness => 0.10,
            QualityComponent::Stability => 0.05,
        }
    }

    fn recommendation(self) -> &'static str {
        match self {
            QualityComponent::SampleCount => "Extend the capture so more samples are collected",
            QualityComponent::Range => "Make sure the sensor sits snugly against the skin",
            QualityComponent::SignalQuality => "Hold still during the capture",
            QualityComponent::Consistency => "Stay at rest for the whole capture window",
            QualityComponent::HrvSanity => "Relax and breathe normally while capturing",
            QualityComponent::Completeness => "Keep the sensor in contact for the whole capture",
            QualityComponent::Stability => "Avoid sudden movements while capturing",
        }
    }
}

/// Outcome of validating one batch. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub is_acceptable: bool,
    /// Combined score in [0, 1]; 0 for structural rejections
    pub score: f64,
    pub failure_reason: Option<QualityFailure>,
    pub subscores: BTreeMap<QualityComponent, f64>,
    /// Advisory messages, most important first
    pub recommendations: Vec<String>,
}

impl QualityReport {
    fn rejected(
        reason: QualityFailure,
        score: f64,
        subscores: BTreeMap<QualityComponent, f64>,
        recommendations: Vec<String>,
    ) -> Self {
        Self {
            is_acceptable: false,
            score,
            failure_reason: Some(reason),
            subscores,
            recommendations,
        }
    }

    pub fn subscore(&self, component: QualityComponent) -> Option<f64> {
        self.subscores.get(&component).copied()
    }
}

/// Thresholds the validator applies.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityPolicy {
    pub min_samples: usize,
    pub minimum_score: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Fraction of samples that must fall inside the plausible band
    pub min_in_range_ratio: f64,
    /// Mean value over mean absolute deviation below which the batch is noise
    pub min_signal_to_noise: f64,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::enrollment(&AuthPolicy::default())
    }
}

impl QualityPolicy {
    /// Enrollment-grade policy.
    pub fn enrollment(policy: &AuthPolicy) -> Self {
        Self {
            min_samples: policy.min_samples,
            minimum_score: policy.quality_minimum_score,
            min_bpm: MIN_PLAUSIBLE_BPM,
            max_bpm: MAX_PLAUSIBLE_BPM,
            min_in_range_ratio: 0.75,
            min_signal_to_noise: 3.0,
        }
    }

    /// Quick-check policy with the lower sample floor.
    pub fn quick_check(policy: &AuthPolicy) -> Self {
        Self {
            min_samples: policy.quick_check_min_samples,
            ..Self::enrollment(policy)
        }
    }

    fn in_band(&self, bpm: f64) -> bool {
        bpm.is_finite() && bpm >= self.min_bpm && bpm <= self.max_bpm
    }
}

/// Scores and accepts or rejects raw sample batches.
#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    policy: QualityPolicy,
}

impl QualityValidator {
    pub fn new(policy: QualityPolicy) -> Self {
        Self { policy }
    }

    /// Validator with the quick-check sample floor.
    pub fn quick_check(policy: &AuthPolicy) -> Self {
        Self::new(QualityPolicy::quick_check(policy))
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    pub fn validate(&self, batch: &SampleBatch) -> QualityReport {
        let policy = &self.policy;
        let values = batch.values();
        let n = values.len();
        let mut subscores = BTreeMap::new();

        let target_count = (policy.min_samples as f64 * 1.5).max(1.0);
        subscores.insert(
            QualityComponent::SampleCount,
            (n as f64 / target_count).min(1.0),
        );

        if n < policy.min_samples {
            return QualityReport::rejected(
                QualityFailure::InsufficientSamples,
                0.0,
                subscores,
                vec![QualityComponent::SampleCount.recommendation().to_string()],
            );
        }

        // Readings the sensor could physically have produced.
        let readings: Vec<f64> = values
            .iter()
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        let completeness = readings.len() as f64 / n as f64;
        subscores.insert(QualityComponent::Completeness, completeness);

        if readings.is_empty() {
            return QualityReport::rejected(
                QualityFailure::OutOfRange,
                0.0,
                subscores,
                vec![QualityComponent::Range.recommendation().to_string()],
            );
        }

        if readings.iter().all(|&v| v == readings[0]) {
            return QualityReport::rejected(
                QualityFailure::NoVariation,
                0.0,
                subscores,
                vec![
                    NO_PULSE_HINT.to_string(),
                    QualityComponent::Range.recommendation().to_string(),
                ],
            );
        }

        let mean = readings.iter().mean();
        let in_range_ratio =
            values.iter().filter(|&&v| policy.in_band(v)).count() as f64 / n as f64;
        subscores.insert(QualityComponent::Range, in_range_ratio);

        if mean < policy.min_bpm
            || mean > policy.max_bpm
            || in_range_ratio < policy.min_in_range_ratio
        {
            return QualityReport::rejected(
                QualityFailure::OutOfRange,
                0.0,
                subscores,
                vec![QualityComponent::Range.recommendation().to_string()],
            );
        }

        let mean_abs_dev = readings.iter().map(|v| (v - mean).abs()).mean();
        let snr = mean / mean_abs_dev;
        subscores.insert(
            QualityComponent::SignalQuality,
            ((snr - SNR_FLOOR) / (SNR_TARGET - SNR_FLOOR)).clamp(0.0, 1.0),
        );
        subscores.insert(
            QualityComponent::Consistency,
            segment_consistency(&readings, mean),
        );

        let diffs: Vec<f64> = readings.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
        subscores.insert(QualityComponent::HrvSanity, hrv_sanity(&diffs));

        if hrv_is_degenerate(&diffs) {
            return QualityReport::rejected(
                QualityFailure::NoVariation,
                0.0,
                subscores,
                vec![
                    NO_PULSE_HINT.to_string(),
                    QualityComponent::HrvSanity.recommendation().to_string(),
                ],
            );
        }

        let stability = if diffs.is_empty() {
            0.0
        } else {
            diffs.iter().filter(|&&d| d <= STABILITY_MAX_JUMP).count() as f64 / diffs.len() as f64
        };
        subscores.insert(QualityComponent::Stability, stability);

        let score = QualityComponent::ALL
            .iter()
            .map(|c| c.weight() * subscores.get(c).copied().unwrap_or(0.0))
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let recommendations = recommendations_for(&subscores);

        if snr < policy.min_signal_to_noise {
            let mut recommendations = recommendations;
            let hold_still = QualityComponent::SignalQuality.recommendation().to_string();
            if !recommendations.contains(&hold_still) {
                recommendations.insert(0, hold_still);
            }
            return QualityReport::rejected(
                QualityFailure::ExcessiveNoise,
                score,
                subscores,
                recommendations,
            );
        }

        if score < policy.minimum_score {
            return QualityReport::rejected(
                QualityFailure::BelowQualityThreshold,
                score,
                subscores,
                recommendations,
            );
        }

        QualityReport {
            is_acceptable: true,
            score,
            failure_reason: None,
            subscores,
            recommendations,
        }
    }
}

/// Compare each segment mean to the global mean.
fn segment_consistency(readings: &[f64], mean: f64) -> f64 {
    let chunk = readings.len().div_ceil(CONSISTENCY_SEGMENTS).max(1);
    let deviations: Vec<f64> = readings
        .chunks(chunk)
        .map(|segment| (segment.iter().mean() - mean).abs() / mean)
        .collect();
    let avg_deviation = deviations.iter().mean();
    (1.0 - avg_deviation * CONSISTENCY_SENSITIVITY).clamp(0.0, 1.0)
}

/// Successive differences should be present but not chaotic.
fn hrv_sanity(diffs: &[f64]) -> f64 {
    if diffs.is_empty() {
        return 0.0;
    }
    let mean_diff = diffs.iter().mean();
    if mean_diff < HRV_MIN_MEAN_DIFF {
        mean_diff / HRV_MIN_MEAN_DIFF
    } else if mean_diff <= HRV_MAX_MEAN_DIFF {
        1.0
    } else {
        (1.0 - (mean_diff - HRV_MAX_MEAN_DIFF) / (2.0 * HRV_MAX_MEAN_DIFF)).max(0.0)
    }
}

/// A stuck sensor with the odd glitch: in band and not perfectly flat, but
/// without beat-to-beat variation.
fn hrv_is_degenerate(diffs: &[f64]) -> bool {
    if diffs.is_empty() {
        return true;
    }
    let unchanged = diffs.iter().filter(|&&d| d == 0.0).count() as f64 / diffs.len() as f64;
    diffs.iter().mean() < HRV_DEGENERATE_MEAN_DIFF || unchanged > HRV_MAX_UNCHANGED_RATIO
}

fn recommendations_for(subscores: &BTreeMap<QualityComponent, f64>) -> Vec<String> {
    let mut weak: Vec<(QualityComponent, f64)> = subscores
        .iter()
        .filter(|(_, &score)| score < 0.5)
        .map(|(&c, &score)| (c, score))
        .collect();
    // Weakest first
    weak.sort_by(|a, b| a.1.total_cmp(&b.1));
    weak.into_iter()
        .map(|(c, _)| c.recommendation().to_string())
        .collect()
}
