//! Weighted similarity between two feature vectors.
//!
//! Each descriptor contributes `max(0, 1 - |a - b| / scale)` and the
//! contributions are combined with fixed weights. The computation is
//! deterministic, symmetric in its arguments and yields exactly 1.0 for
//! identical vectors with non-zero variability.

use crate::core::features::{
    FeatureVector, MEAN_HR_SCALE, OVERALL_VARIABILITY_SCALE, PNN50_SCALE, RMSSD_SCALE,
    SDNN_SCALE, TRIANGULAR_INDEX_SCALE,
};

/// Descriptors that take part in scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descriptor {
    Rmssd,
    Sdnn,
    MeanHr,
    Pnn50,
    TriangularIndex,
    OverallVariability,
}

impl Descriptor {
    pub fn name(self) -> &'static str {
        match self {
            Descriptor::Rmssd => "rmssd",
            Descriptor::Sdnn => "sdnn",
            Descriptor::MeanHr => "mean_hr",
            Descriptor::Pnn50 => "pnn50",
            Descriptor::TriangularIndex => "triangular_index",
            Descriptor::OverallVariability => "overall_variability",
        }
    }

    pub fn read(self, v: &FeatureVector) -> f64 {
        match self {
            Descriptor::Rmssd => v.rmssd,
            Descriptor::Sdnn => v.sdnn,
            Descriptor::MeanHr => v.mean_hr,
            Descriptor::Pnn50 => v.pnn50,
            Descriptor::TriangularIndex => v.triangular_index,
            Descriptor::OverallVariability => v.overall_variability,
        }
    }

    /// Variability descriptors are meaningless for a flat-line signal.
    pub fn is_variability(self) -> bool {
        !matches!(self, Descriptor::MeanHr)
    }
}

/// Normalization scale and weight of one descriptor.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWeight {
    pub descriptor: Descriptor,
    pub scale: f64,
    pub weight: f64,
}

impl DescriptorWeight {
    const fn new(descriptor: Descriptor, scale: f64, weight: f64) -> Self {
        Self {
            descriptor,
            scale,
            weight,
        }
    }
}

/// Default weighting. RMSSD and SDNN carry 65% of the score.
pub const DEFAULT_WEIGHTS: [DescriptorWeight; 6] = [
    DescriptorWeight::new(Descriptor::Rmssd, RMSSD_SCALE, 0.35),
    DescriptorWeight::new(Descriptor::Sdnn, SDNN_SCALE, 0.30),
    DescriptorWeight::new(Descriptor::MeanHr, MEAN_HR_SCALE, 0.15),
    DescriptorWeight::new(Descriptor::Pnn50, PNN50_SCALE, 0.10),
    DescriptorWeight::new(Descriptor::TriangularIndex, TRIANGULAR_INDEX_SCALE, 0.05),
    DescriptorWeight::new(Descriptor::OverallVariability, OVERALL_VARIABILITY_SCALE, 0.05),
];

/// Errors raised by the scorer.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityError {
    /// A vector with NaN/Inf or out-of-bound descriptors
    InvalidVector(&'static str),
}

impl std::fmt::Display for SimilarityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityError::InvalidVector(which) => {
                write!(f, "Invalid {which} feature vector")
            }
        }
    }
}

impl std::error::Error for SimilarityError {}

/// Per-descriptor breakdown of a score.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityBreakdown {
    pub confidence: f64,
    pub components: Vec<(Descriptor, f64)>,
}

/// Deterministic weighted-descriptor scorer.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    weights: Vec<DescriptorWeight>,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS.to_vec(),
        }
    }
}

impl SimilarityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confidence in [0, 1] that `current` comes from the same person as `stored`.
    pub fn score(
        &self,
        stored: &FeatureVector,
        current: &FeatureVector,
    ) -> Result<f64, SimilarityError> {
        self.breakdown(stored, current).map(|b| b.confidence)
    }

    /// Score with the per-descriptor similarities.
    pub fn breakdown(
        &self,
        stored: &FeatureVector,
        current: &FeatureVector,
    ) -> Result<SimilarityBreakdown, SimilarityError> {
        if !stored.is_valid() {
            return Err(SimilarityError::InvalidVector("stored"));
        }
        if !current.is_valid() {
            return Err(SimilarityError::InvalidVector("current"));
        }

        // A flat line on either side makes variability comparisons meaningless.
        let flat = stored.is_zero_variability() || current.is_zero_variability();

        let mut components = Vec::with_capacity(self.weights.len());
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        for entry in &self.weights {
            let similarity = if flat && entry.descriptor.is_variability() {
                0.0
            } else {
                let a = entry.descriptor.read(stored);
                let b = entry.descriptor.read(current);
                (1.0 - (a - b).abs() / entry.scale).max(0.0)
            };
            components.push((entry.descriptor, similarity));
            weighted += entry.weight * similarity;
            total_weight += entry.weight;
        }

        // Dividing by the summed weights keeps identical vectors at exactly 1.0.
        let confidence = if total_weight > 0.0 {
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(SimilarityBreakdown {
            confidence,
            components,
        })
    }
}
