//! Core biometric pipeline.
//!
//! This module contains:
//! - Signal quality validation of raw sample batches
//! - Feature extraction (HRV and statistical descriptors)
//! - The versioned template codec
//! - Weighted similarity scoring
//! - Security-level policy, sessions and the decision engine

pub mod engine;
pub mod features;
pub mod policy;
pub mod quality;
pub mod session;
pub mod similarity;
pub mod template;

// Re-export commonly used types
pub use engine::{
    AuthEngine, Clock, EngineError, EngineState, EnrollmentResult, ManualClock, SystemClock,
};
pub use features::{extract_features, FeatureError, FeatureVector};
pub use policy::{Decision, SecurityLevel, Thresholds};
pub use quality::{
    QualityComponent, QualityFailure, QualityPolicy, QualityReport, QualityValidator,
};
pub use session::{AttemptRecord, AuthenticationOutcome, AuthenticationSession, SessionState};
pub use similarity::{Descriptor, SimilarityError, SimilarityScorer};
pub use template::{Template, TemplateError, TemplateMetadata, TemplateRecord};
