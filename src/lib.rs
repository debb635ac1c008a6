//! Synheart HR Auth - heart-rate biometric enrollment and authentication.
//!
//! A buffered batch of heart-rate samples is validated, reduced to a fixed
//! feature vector, and either sealed as an identity's template (enrollment)
//! or scored against the stored template (authentication). A session state
//! machine applies the security-level policy to each score.
//!
//! # Guarantees
//!
//! - **Deterministic**: scoring uses fixed weights, never randomness
//! - **Sealed at rest**: templates are stored only as AES-256-GCM blobs
//! - **No raw retention**: sample batches are discarded after feature extraction
//! - **Capture problems are not identity failures**: quality rejections never
//!   count toward lockout
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Synheart HR Auth                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Capture   │──▶│   Quality   │──▶│  Features   │       │
//! │  │  (replay)   │   │  Validator  │   │ (HRV stats) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                         │        │          │
//! │                          enrollment ◀───┘        └──▶ auth  │
//! │                                ▼                      ▼     │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Audit     │◀──│   Engine    │◀──│ Similarity  │       │
//! │  │    Log      │   │ (sessions)  │   │   Scorer    │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                          │ ▲                                │
//! │                          ▼ │                                │
//! │                    ┌─────────────┐                          │
//! │                    │   Vault     │ codec + sealer + store   │
//! │                    └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use synheart_hr_auth::{
//!     capture::load_batch, core::AuthEngine, storage::{AesGcmSealer, MemoryStore, TemplateVault},
//!     Config,
//! };
//!
//! let config = Config::default();
//! let vault = TemplateVault::new(MemoryStore::new(), AesGcmSealer::generate());
//! let mut engine = AuthEngine::new(&config, vault).expect("valid policy");
//!
//! let batch = load_batch(Path::new("enroll.csv"), 40).expect("readable capture");
//! let result = engine.complete_enrollment("alice", &batch, None);
//! assert!(result.success);
//!
//! let attempt = load_batch(Path::new("attempt.csv"), 40).expect("readable capture");
//! println!("{}", engine.complete_authentication("alice", &attempt));
//! ```

pub mod audit;
pub mod capture;
pub mod config;
pub mod core;
pub mod storage;

// Re-export key types at crate root for convenience
pub use audit::{AuditLog, AuditStats, SharedAuditLog};
pub use capture::{CaptureError, HeartRateSample, SampleBatch};
pub use config::{AuthPolicy, Config, ConfigError};
pub use core::{
    AuthEngine, AuthenticationOutcome, EngineError, EngineState, FeatureVector, QualityReport,
    QualityValidator, SecurityLevel, SimilarityScorer, Template,
};
pub use storage::{AesGcmSealer, FileStore, MemoryStore, TemplateVault};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy notice shown by the CLI.
pub const PRIVACY_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              SYNHEART HR AUTH - PRIVACY NOTICE                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  ✓ WHAT IS STORED:                                               ║
║    • One sealed feature template per enrolled identity           ║
║    • Aggregate counts of enrollments and attempts                ║
║                                                                  ║
║  ✗ WHAT IS NEVER STORED:                                         ║
║    • Raw heart-rate samples                                      ║
║    • Templates in plaintext                                      ║
║    • Per-attempt scores                                          ║
║                                                                  ║
║  All processing happens locally.                                 ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_notice_contents() {
        assert!(PRIVACY_NOTICE.contains("PRIVACY"));
        assert!(PRIVACY_NOTICE.contains("NEVER STORED"));
        assert!(PRIVACY_NOTICE.contains("Raw heart-rate samples"));
    }
}
