//! End-to-end enrollment and authentication flows.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use synheart_hr_auth::audit::create_shared_log;
use synheart_hr_auth::config::Config;
use synheart_hr_auth::core::{
    AuthEngine, AuthenticationOutcome, EngineError, EngineState, ManualClock, QualityFailure,
    SecurityLevel, SessionState,
};
use synheart_hr_auth::storage::{AesGcmSealer, FileStore, MemoryStore, TemplateVault};
use synheart_hr_auth::SampleBatch;

/// Deterministic in-band signal with mean `center` and standard deviation `sd`.
fn signal(n: usize, center: f64, sd: f64) -> SampleBatch {
    let half_width = sd * 3f64.sqrt();
    let values: Vec<f64> = (0..n)
        .map(|i| {
            let u = ((i * 62) % 97) as f64 / 96.0;
            center + half_width * (2.0 * u - 1.0)
        })
        .collect();
    SampleBatch::from_values(&values, Utc::now(), 40).unwrap()
}

fn owner() -> SampleBatch {
    signal(300, 75.0, 8.0)
}

fn stranger() -> SampleBatch {
    signal(300, 120.0, 2.0)
}

fn memory_engine() -> (AuthEngine<MemoryStore, AesGcmSealer>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let vault = TemplateVault::new(MemoryStore::new(), AesGcmSealer::generate());
    let engine = AuthEngine::new(&Config::default(), vault)
        .unwrap()
        .with_clock(clock.clone());
    (engine, clock)
}

fn enrolled_engine() -> (AuthEngine<MemoryStore, AesGcmSealer>, Arc<ManualClock>) {
    let (mut engine, clock) = memory_engine();
    let result = engine.complete_enrollment("alice", &owner(), None);
    assert!(result.success, "enrollment failed: {:?}", result.error);
    (engine, clock)
}

#[test]
fn test_failed_enrollment_creates_nothing() {
    let (mut engine, _) = memory_engine();
    let flat = SampleBatch::from_values(&[75.0; 300], Utc::now(), 40).unwrap();

    let result = engine.complete_enrollment("alice", &flat, None);

    assert!(!result.success);
    assert!(result.template_id.is_none());
    assert!(!result.quality.unwrap().is_acceptable);
    assert_eq!(engine.state("alice"), EngineState::Idle);
    assert!(!engine.vault().is_enrolled("alice"));
}

#[test]
fn test_authenticate_without_enrollment() {
    let (mut engine, _) = memory_engine();

    assert_eq!(
        engine.complete_authentication("bob", &owner()),
        AuthenticationOutcome::Error("no enrollment found".to_string())
    );
    assert!(matches!(
        engine.begin_authentication("bob"),
        Err(EngineError::NotEnrolled)
    ));
}

#[test]
fn test_same_capture_is_approved_with_full_confidence() {
    let (mut engine, _) = enrolled_engine();

    assert_eq!(
        engine.complete_authentication("alice", &owner()),
        AuthenticationOutcome::Approved(1.0)
    );

    let template = engine.template("alice").unwrap();
    assert_eq!(template.authentication_count(), 1);
    assert!(template.last_authenticated_at().is_some());
    assert_eq!(
        engine.session("alice").unwrap().state(),
        SessionState::Approved
    );

    // Terminal sessions reject further attempts.
    assert_eq!(
        engine.complete_authentication("alice", &owner()),
        AuthenticationOutcome::Error("session closed".to_string())
    );
    assert_eq!(engine.template("alice").unwrap().authentication_count(), 1);
}

#[test]
fn test_new_session_after_approval() {
    let (mut engine, _) = enrolled_engine();
    engine.complete_authentication("alice", &owner());
    engine.end_session("alice");

    assert!(engine.complete_authentication("alice", &owner()).is_approved());
    assert_eq!(engine.template("alice").unwrap().authentication_count(), 2);
}

#[test]
fn test_similar_capture_requests_retry() {
    let (mut engine, _) = enrolled_engine();

    let outcome = engine.complete_authentication("alice", &signal(300, 78.0, 7.0));

    assert!(
        matches!(outcome, AuthenticationOutcome::RetryRequested(_)),
        "{outcome:?}"
    );
    assert_eq!(engine.template("alice").unwrap().authentication_count(), 0);
}

#[test]
fn test_three_denials_lock_the_session() {
    let (mut engine, _) = enrolled_engine();
    let audit = create_shared_log();
    let mut engine = engine.with_audit_log(audit.clone());

    let outcomes: Vec<_> = (0..3)
        .map(|_| engine.complete_authentication("alice", &stranger()))
        .collect();

    assert_eq!(
        outcomes,
        vec![
            AuthenticationOutcome::Denied("identity mismatch".to_string()),
            AuthenticationOutcome::Denied("identity mismatch".to_string()),
            AuthenticationOutcome::Denied("max attempts reached".to_string()),
        ]
    );
    assert_eq!(
        engine.session("alice").unwrap().state(),
        SessionState::LockedOut
    );

    // Even a perfect match is refused now.
    assert_eq!(
        engine.complete_authentication("alice", &owner()),
        AuthenticationOutcome::Error("session closed".to_string())
    );

    let stats = audit.stats();
    assert_eq!(stats.denials, 3);
    assert_eq!(stats.lockouts, 1);
    assert_eq!(stats.approvals, 0);
}

#[test]
fn test_quality_rejections_do_not_count_toward_lockout() {
    let (mut engine, _) = enrolled_engine();
    let short = signal(100, 75.0, 8.0);

    for _ in 0..4 {
        assert!(matches!(
            engine.complete_authentication("alice", &short),
            AuthenticationOutcome::RetryRequested(_)
        ));
    }
    assert!(engine.complete_authentication("alice", &stranger()).is_denied());
    assert!(engine.complete_authentication("alice", &stranger()).is_denied());

    let session = engine.session("alice").unwrap();
    assert_eq!(session.denied_count(), 2);
    assert_eq!(session.attempts().len(), 6);
    assert!(session.attempts()[0].similarity_score.is_none());
    assert_eq!(session.state(), SessionState::Active);

    assert_eq!(
        engine.complete_authentication("alice", &stranger()),
        AuthenticationOutcome::Denied("max attempts reached".to_string())
    );
}

#[test]
fn test_session_times_out() {
    let (mut engine, clock) = enrolled_engine();
    engine.begin_authentication("alice").unwrap();

    clock.advance(Duration::from_secs(299));
    assert!(matches!(
        engine.complete_authentication("alice", &signal(300, 78.0, 7.0)),
        AuthenticationOutcome::RetryRequested(_)
    ));

    clock.advance(Duration::from_secs(2));
    assert_eq!(
        engine.complete_authentication("alice", &owner()),
        AuthenticationOutcome::Error("session expired".to_string())
    );
    assert_eq!(engine.template("alice").unwrap().authentication_count(), 0);
}

#[test]
fn test_one_session_per_identity() {
    let (mut engine, _) = enrolled_engine();
    engine.begin_authentication("alice").unwrap();

    assert!(matches!(
        engine.begin_authentication("alice"),
        Err(EngineError::AuthenticationInProgress)
    ));
    assert_eq!(
        engine.begin_authentication("alice").unwrap_err().to_string(),
        "authentication already in progress"
    );
}

#[test]
fn test_lockout_cooldown() {
    let (mut engine, clock) = enrolled_engine();
    for _ in 0..3 {
        engine.complete_authentication("alice", &stranger());
    }
    engine.end_session("alice");

    let outcome = engine.complete_authentication("alice", &owner());
    assert!(
        matches!(&outcome, AuthenticationOutcome::Error(m) if m.starts_with("locked out until")),
        "{outcome:?}"
    );

    clock.advance(Duration::from_secs(60));
    assert_eq!(
        engine.complete_authentication("alice", &owner()),
        AuthenticationOutcome::Approved(1.0)
    );
}

#[test]
fn test_reenrollment_replaces_template() {
    let (mut engine, _) = enrolled_engine();
    let first_id = engine.template("alice").unwrap().id();

    let result = engine.complete_enrollment("alice", &stranger(), Some(SecurityLevel::High));
    assert!(result.success);
    assert_ne!(result.template_id, Some(first_id));

    let template = engine.template("alice").unwrap();
    assert_eq!(template.security_level(), SecurityLevel::High);
    assert_eq!(template.authentication_count(), 0);

    assert!(engine.complete_authentication("alice", &owner()).is_denied());
    engine.end_session("alice");
    assert_eq!(
        engine.complete_authentication("alice", &stranger()),
        AuthenticationOutcome::Approved(1.0)
    );
}

#[test]
fn test_templates_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("template.key");
    let templates = dir.path().join("templates");

    let open = || {
        let vault = TemplateVault::new(
            FileStore::new(&templates).unwrap(),
            AesGcmSealer::load_or_create(&key_path).unwrap(),
        );
        AuthEngine::new(&Config::default(), vault).unwrap()
    };

    let mut engine = open();
    assert!(engine.complete_enrollment("alice", &owner(), None).success);
    drop(engine);

    let mut engine = open();
    assert_eq!(engine.state("alice"), EngineState::Enrolled);
    assert_eq!(
        engine.complete_authentication("alice", &owner()),
        AuthenticationOutcome::Approved(1.0)
    );

    let mut engine = open();
    assert_eq!(engine.template("alice").unwrap().authentication_count(), 1);
    engine.delete_enrollment("alice").unwrap();
    assert!(!templates.join("alice.sealed").exists());
}

#[test]
fn test_tampered_template_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let vault = TemplateVault::new(
        FileStore::new(dir.path()).unwrap(),
        AesGcmSealer::generate(),
    );
    let mut engine = AuthEngine::new(&Config::default(), vault).unwrap();
    assert!(engine.complete_enrollment("alice", &owner(), None).success);
    engine.begin_authentication("alice").unwrap();

    let path = dir.path().join("alice.sealed");
    let mut bytes = std::fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x5a;
    std::fs::write(&path, bytes).unwrap();

    match engine.complete_authentication("alice", &owner()) {
        AuthenticationOutcome::Error(message) => assert!(message.contains("tampered")),
        other => panic!("expected an error, got {other:?}"),
    }
    assert_eq!(
        engine.session("alice").unwrap().state(),
        SessionState::Failed
    );
}

/// A sensor stuck at one value with a single glitch.
fn stuck(level: f64, glitch: f64) -> SampleBatch {
    let mut values = vec![level; 300];
    values[150] = glitch;
    SampleBatch::from_values(&values, Utc::now(), 40).unwrap()
}

#[test]
fn test_stuck_sensor_cannot_enroll_or_match() {
    let (mut engine, _) = memory_engine();

    let result =
        engine.complete_enrollment("alice", &stuck(75.0, 76.0), Some(SecurityLevel::Maximum));
    assert!(!result.success);
    assert_eq!(
        result.quality.unwrap().failure_reason,
        Some(QualityFailure::NoVariation)
    );
    assert!(!engine.vault().is_enrolled("alice"));

    let result = engine.complete_enrollment("alice", &owner(), Some(SecurityLevel::Maximum));
    assert!(result.success);
    let outcome = engine.complete_authentication("alice", &stuck(80.0, 80.5));
    assert!(
        matches!(outcome, AuthenticationOutcome::RetryRequested(_)),
        "{outcome:?}"
    );
    assert_eq!(engine.session("alice").unwrap().denied_count(), 0);
}
