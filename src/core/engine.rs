//! Authentication decision engine.
//!
//! The engine owns enrollment and session lifecycle for every identity it
//! sees. It takes its collaborators (policy, template vault, clock, audit
//! log) at construction and never reaches for global state.
//!
//! ```text
//!   Idle ──begin_enrollment──▶ Enrolling ──complete_enrollment──▶ Enrolled
//!     └──────────────complete_enrollment─────────────────────────────┘
//!
//!   Enrolled ──begin/complete_authentication──▶ Authenticating
//!        ▲                                          │
//!        └─── end_session / terminal outcome ◀──────┘
//! ```

use crate::audit::{create_shared_log, SharedAuditLog};
use crate::capture::SampleBatch;
use crate::config::{AuthPolicy, Config, ConfigError};
use crate::core::features::extract_features;
use crate::core::policy::{Decision, SecurityLevel};
use crate::core::quality::{QualityPolicy, QualityReport, QualityValidator};
use crate::core::session::{
    AttemptRecord, AuthenticationOutcome, AuthenticationSession, SessionState,
};
use crate::core::similarity::{SimilarityError, SimilarityScorer};
use crate::core::template::{Template, TemplateError};
use crate::storage::{validate_identity, Sealer, SecureStore, TemplateVault};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = add_duration(*now, by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-identity engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Enrolling,
    Enrolled,
    Authenticating,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            EngineState::Idle => "idle",
            EngineState::Enrolling => "enrolling",
            EngineState::Enrolled => "enrolled",
            EngineState::Authenticating => "authenticating",
        };
        f.write_str(text)
    }
}

/// Protocol misuse and collaborator failures.
#[derive(Debug)]
pub enum EngineError {
    InvalidIdentity(String),
    NotEnrolled,
    AuthenticationInProgress,
    EnrollmentInProgress,
    SessionExpired,
    SessionClosed,
    LockedOut(DateTime<Utc>),
    Template(TemplateError),
    Similarity(SimilarityError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidIdentity(id) => write!(f, "invalid identity '{id}'"),
            EngineError::NotEnrolled => write!(f, "no enrollment found"),
            EngineError::AuthenticationInProgress => {
                write!(f, "authentication already in progress")
            }
            EngineError::EnrollmentInProgress => write!(f, "enrollment in progress"),
            EngineError::SessionExpired => write!(f, "session expired"),
            EngineError::SessionClosed => write!(f, "session closed"),
            EngineError::LockedOut(until) => write!(f, "locked out until {}", until.to_rfc3339()),
            EngineError::Template(e) => write!(f, "{e}"),
            EngineError::Similarity(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TemplateError> for EngineError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::TemplateNotFound(_) => EngineError::NotEnrolled,
            other => EngineError::Template(other),
        }
    }
}

/// Result of an enrollment call.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentResult {
    pub success: bool,
    pub template_id: Option<Uuid>,
    /// Present whenever the batch reached the validator
    pub quality: Option<QualityReport>,
    pub error: Option<String>,
}

impl EnrollmentResult {
    fn committed(template_id: Uuid, quality: QualityReport) -> Self {
        Self {
            success: true,
            template_id: Some(template_id),
            quality: Some(quality),
            error: None,
        }
    }

    fn rejected(quality: Option<QualityReport>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            template_id: None,
            quality,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    enrolling: bool,
    session: Option<AuthenticationSession>,
    locked_until: Option<DateTime<Utc>>,
}

/// Enrollment and authentication decision engine.
pub struct AuthEngine<S, T> {
    policy: AuthPolicy,
    default_level: SecurityLevel,
    validator: QualityValidator,
    scorer: SimilarityScorer,
    vault: TemplateVault<S, T>,
    identities: HashMap<String, IdentityState>,
    audit: SharedAuditLog,
    clock: Arc<dyn Clock>,
    device_id: Option<String>,
}

impl<S: SecureStore, T: Sealer> AuthEngine<S, T> {
    /// Build an engine over `vault`. Fails when the configured policy is invalid.
    pub fn new(config: &Config, vault: TemplateVault<S, T>) -> Result<Self, ConfigError> {
        config.policy.validate()?;
        let device_id = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().to_string());

        Ok(Self {
            validator: QualityValidator::new(QualityPolicy::enrollment(&config.policy)),
            policy: config.policy.clone(),
            default_level: config.security_level,
            scorer: SimilarityScorer::new(),
            vault,
            identities: HashMap::new(),
            audit: create_shared_log(),
            clock: Arc::new(SystemClock),
            device_id,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_log(mut self, audit: SharedAuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_scorer(mut self, scorer: SimilarityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Replace the policy. Open sessions keep the values they started with.
    pub fn set_policy(&mut self, policy: AuthPolicy) -> Result<(), ConfigError> {
        policy.validate()?;
        self.validator = QualityValidator::new(QualityPolicy::enrollment(&policy));
        self.policy = policy;
        Ok(())
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn audit(&self) -> &SharedAuditLog {
        &self.audit
    }

    pub fn vault(&self) -> &TemplateVault<S, T> {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut TemplateVault<S, T> {
        &mut self.vault
    }

    pub fn state(&self, identity_id: &str) -> EngineState {
        if let Some(entry) = self.identities.get(identity_id) {
            if entry.enrolling {
                return EngineState::Enrolling;
            }
            if entry.session.as_ref().is_some_and(|s| !s.is_terminal()) {
                return EngineState::Authenticating;
            }
        }
        if self.vault.is_enrolled(identity_id) {
            EngineState::Enrolled
        } else {
            EngineState::Idle
        }
    }

    pub fn session(&self, identity_id: &str) -> Option<&AuthenticationSession> {
        self.identities
            .get(identity_id)
            .and_then(|entry| entry.session.as_ref())
    }

    pub fn template(&self, identity_id: &str) -> Result<Template, EngineError> {
        Ok(self.vault.load(identity_id)?)
    }

    pub fn locked_until(&self, identity_id: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.identities
            .get(identity_id)
            .and_then(|entry| entry.locked_until)
            .filter(|until| now < *until)
    }

    // ------------------------------------------------------------------
    // Enrollment
    // ------------------------------------------------------------------

    /// Mark an enrollment as started. Authentication for the identity is
    /// refused until it completes or is cancelled.
    pub fn begin_enrollment(&mut self, identity_id: &str) -> Result<(), EngineError> {
        self.check_can_enroll(identity_id)?;
        self.identities
            .entry(identity_id.to_string())
            .or_default()
            .enrolling = true;
        tracing::debug!(identity = identity_id, "enrollment started");
        Ok(())
    }

    pub fn cancel_enrollment(&mut self, identity_id: &str) -> bool {
        match self.identities.get_mut(identity_id) {
            Some(entry) if entry.enrolling => {
                entry.enrolling = false;
                tracing::debug!(identity = identity_id, "enrollment cancelled");
                true
            }
            _ => false,
        }
    }

    /// Validate, extract and store a template, replacing any previous one.
    ///
    /// Nothing is written unless every step succeeds.
    pub fn complete_enrollment(
        &mut self,
        identity_id: &str,
        batch: &SampleBatch,
        security_level: Option<SecurityLevel>,
    ) -> EnrollmentResult {
        if let Err(e) = self.check_can_enroll(identity_id) {
            self.audit.record_enrollment_rejected();
            return EnrollmentResult::rejected(None, e.to_string());
        }

        let report = self.validator.validate(batch);
        if !report.is_acceptable {
            let message = quality_message(&report);
            tracing::info!(
                identity = identity_id,
                score = report.score,
                "enrollment rejected: {}",
                message
            );
            self.audit.record_enrollment_rejected();
            return EnrollmentResult::rejected(Some(report), message);
        }

        let vector = match extract_features(batch) {
            Ok(v) => v,
            Err(e) => {
                tracing::info!(identity = identity_id, "enrollment rejected: {}", e);
                self.audit.record_enrollment_rejected();
                return EnrollmentResult::rejected(Some(report), e.to_string());
            }
        };

        let level = security_level.unwrap_or(self.default_level);
        let template = Template::new(
            identity_id,
            vector,
            level,
            self.clock.now(),
            self.device_id.clone(),
        );

        if let Err(e) = self.vault.save(&template) {
            tracing::warn!(identity = identity_id, "failed to store template: {}", e);
            self.audit.record_error();
            return EnrollmentResult::rejected(Some(report), e.to_string());
        }

        // Re-enrollment supersedes the old template, its sessions and any lockout.
        let entry = self.identities.entry(identity_id.to_string()).or_default();
        entry.enrolling = false;
        entry.session = None;
        entry.locked_until = None;

        self.audit.record_enrollment_completed();
        tracing::info!(
            identity = identity_id,
            template_id = %template.id(),
            security_level = %level,
            quality = report.score,
            "enrollment committed"
        );
        EnrollmentResult::committed(template.id(), report)
    }

    /// Destroy the stored template and any session state.
    pub fn delete_enrollment(&mut self, identity_id: &str) -> Result<(), EngineError> {
        validate_identity(identity_id)
            .map_err(|_| EngineError::InvalidIdentity(identity_id.to_string()))?;
        self.vault.remove(identity_id)?;
        self.identities.remove(identity_id);
        tracing::info!(identity = identity_id, "enrollment deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Open a new session explicitly.
    ///
    /// Fails while a live session exists; terminal or expired sessions are
    /// replaced.
    pub fn begin_authentication(&mut self, identity_id: &str) -> Result<Uuid, EngineError> {
        let template = self.check_can_authenticate(identity_id)?;
        let now = self.clock.now();

        if let Some(session) = self.session(identity_id) {
            if !session.is_terminal() && !session.is_expired(now) {
                return Err(EngineError::AuthenticationInProgress);
            }
        }

        let session = self.open_session(identity_id, &template, now)?;
        let id = session.id();
        self.identities
            .entry(identity_id.to_string())
            .or_default()
            .session = Some(session);
        Ok(id)
    }

    /// Run one attempt against the identity's session, opening one if none exists.
    pub fn complete_authentication(
        &mut self,
        identity_id: &str,
        batch: &SampleBatch,
    ) -> AuthenticationOutcome {
        match self.authenticate(identity_id, batch) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(identity = identity_id, "authentication error: {}", e);
                self.audit.record_error();
                AuthenticationOutcome::Error(e.to_string())
            }
        }
    }

    /// Discard the identity's session. A lockout cooldown survives.
    pub fn end_session(&mut self, identity_id: &str) -> Option<AuthenticationSession> {
        let session = self
            .identities
            .get_mut(identity_id)
            .and_then(|entry| entry.session.take());
        if let Some(ref s) = session {
            tracing::debug!(identity = identity_id, session = %s.id(), "session ended");
        }
        session
    }

    fn authenticate(
        &mut self,
        identity_id: &str,
        batch: &SampleBatch,
    ) -> Result<AuthenticationOutcome, EngineError> {
        let mut template = match self.check_can_authenticate(identity_id) {
            Ok(template) => template,
            Err(e) => {
                if matches!(e, EngineError::Template(_)) {
                    self.fail_session(identity_id);
                }
                return Err(e);
            }
        };
        let now = self.clock.now();

        let existing = self
            .identities
            .get_mut(identity_id)
            .and_then(|entry| entry.session.take());
        let mut session = match existing {
            Some(session) => session,
            None => self.open_session(identity_id, &template, now)?,
        };

        let result = self.run_attempt(&mut session, &mut template, batch, now);

        let entry = self.identities.entry(identity_id.to_string()).or_default();
        if session.state() == SessionState::LockedOut && entry.locked_until.is_none() {
            entry.locked_until = Some(add_duration(now, self.policy.lockout_cooldown));
        }
        entry.session = Some(session);

        result
    }

    fn run_attempt(
        &mut self,
        session: &mut AuthenticationSession,
        template: &mut Template,
        batch: &SampleBatch,
        now: DateTime<Utc>,
    ) -> Result<AuthenticationOutcome, EngineError> {
        if session.is_terminal() {
            return Err(if session.state() == SessionState::Expired {
                EngineError::SessionExpired
            } else {
                EngineError::SessionClosed
            });
        }
        if session.is_expired(now) {
            session.set_state(SessionState::Expired);
            tracing::info!(
                identity = session.identity_id(),
                session = %session.id(),
                "session expired"
            );
            return Err(EngineError::SessionExpired);
        }

        // Capture problems are never identity-negative.
        let report = self.validator.validate(batch);
        if !report.is_acceptable {
            return Ok(self.request_retry(session, now, None, quality_message(&report)));
        }
        let current = match extract_features(batch) {
            Ok(v) => v,
            Err(e) => return Ok(self.request_retry(session, now, None, e.to_string())),
        };

        let confidence = match self.scorer.score(template.feature_vector(), &current) {
            Ok(c) => c,
            Err(e) => {
                session.set_state(SessionState::Failed);
                return Err(EngineError::Similarity(e));
            }
        };

        let outcome = match session.thresholds().classify(confidence) {
            Decision::Approve => {
                template.record_authentication(now);
                if let Err(e) = self.vault.save(template) {
                    session.set_state(SessionState::Failed);
                    return Err(EngineError::Template(e));
                }
                session.set_state(SessionState::Approved);
                self.audit.record_approval();
                tracing::info!(
                    identity = session.identity_id(),
                    confidence,
                    count = template.authentication_count(),
                    "authentication approved"
                );
                AuthenticationOutcome::Approved(confidence)
            }
            Decision::Retry => {
                let message = format!(
                    "confidence {confidence:.2} below approval threshold {:.2}, try again",
                    session.thresholds().approve
                );
                return Ok(self.request_retry(session, now, Some(confidence), message));
            }
            Decision::Deny if session.next_denial_locks() => {
                session.set_state(SessionState::LockedOut);
                self.audit.record_denial();
                self.audit.record_lockout();
                tracing::warn!(
                    identity = session.identity_id(),
                    confidence,
                    attempts = session.denied_count() + 1,
                    "session locked out"
                );
                AuthenticationOutcome::Denied("max attempts reached".to_string())
            }
            Decision::Deny => {
                self.audit.record_denial();
                tracing::info!(
                    identity = session.identity_id(),
                    confidence,
                    "authentication denied"
                );
                AuthenticationOutcome::Denied("identity mismatch".to_string())
            }
        };

        session.record(AttemptRecord::new(now, Some(confidence), outcome.clone()));
        Ok(outcome)
    }

    /// Close a live session after its template could not be read.
    fn fail_session(&mut self, identity_id: &str) {
        let session = self
            .identities
            .get_mut(identity_id)
            .and_then(|entry| entry.session.as_mut())
            .filter(|s| !s.is_terminal());
        if let Some(session) = session {
            session.set_state(SessionState::Failed);
            tracing::warn!(identity = identity_id, session = %session.id(), "session failed");
        }
    }

    fn request_retry(
        &self,
        session: &mut AuthenticationSession,
        now: DateTime<Utc>,
        confidence: Option<f64>,
        message: String,
    ) -> AuthenticationOutcome {
        self.audit.record_retry();
        tracing::info!(
            identity = session.identity_id(),
            confidence = ?confidence,
            "retry requested: {}",
            message
        );
        let outcome = AuthenticationOutcome::RetryRequested(message);
        session.record(AttemptRecord::new(now, confidence, outcome.clone()));
        outcome
    }

    fn open_session(
        &self,
        identity_id: &str,
        template: &Template,
        now: DateTime<Utc>,
    ) -> Result<AuthenticationSession, EngineError> {
        if let Some(until) = self.identities.get(identity_id).and_then(|e| e.locked_until) {
            if now < until {
                return Err(EngineError::LockedOut(until));
            }
        }

        let session =
            AuthenticationSession::new(identity_id, now, &self.policy, template.security_level());
        self.audit.record_session_started();
        tracing::debug!(
            identity = identity_id,
            session = %session.id(),
            security_level = %session.security_level(),
            "session opened"
        );
        Ok(session)
    }

    fn check_can_enroll(&self, identity_id: &str) -> Result<(), EngineError> {
        validate_identity(identity_id)
            .map_err(|_| EngineError::InvalidIdentity(identity_id.to_string()))?;
        let now = self.clock.now();
        if let Some(session) = self.session(identity_id) {
            if !session.is_terminal() && !session.is_expired(now) {
                return Err(EngineError::AuthenticationInProgress);
            }
        }
        Ok(())
    }

    /// Common preconditions; returns the stored template.
    fn check_can_authenticate(&mut self, identity_id: &str) -> Result<Template, EngineError> {
        validate_identity(identity_id)
            .map_err(|_| EngineError::InvalidIdentity(identity_id.to_string()))?;
        if self
            .identities
            .get(identity_id)
            .is_some_and(|entry| entry.enrolling)
        {
            return Err(EngineError::EnrollmentInProgress);
        }

        let now = self.clock.now();
        if let Some(entry) = self.identities.get_mut(identity_id) {
            if entry.locked_until.is_some_and(|until| now >= until) {
                entry.locked_until = None;
            }
        }

        Ok(self.vault.load(identity_id)?)
    }
}

fn quality_message(report: &QualityReport) -> String {
    let reason = report
        .failure_reason
        .map(|r| r.to_string())
        .unwrap_or_else(|| "capture rejected".to_string());
    match report.recommendations.first() {
        Some(hint) => format!("{reason}: {hint}"),
        None => reason,
    }
}

fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quality::tests::realistic_values;
    use crate::storage::{AesGcmSealer, MemoryStore};

    type TestEngine = AuthEngine<MemoryStore, AesGcmSealer>;

    fn engine(clock: Arc<ManualClock>) -> TestEngine {
        let vault = TemplateVault::new(MemoryStore::new(), AesGcmSealer::generate());
        AuthEngine::new(&Config::default(), vault)
            .unwrap()
            .with_clock(clock)
    }

    fn batch(center: f64, sd: f64, n: usize) -> SampleBatch {
        SampleBatch::from_values(&realistic_values(n, center, sd), Utc::now(), 40).unwrap()
    }

    fn enrolled(clock: Arc<ManualClock>) -> TestEngine {
        let mut engine = engine(clock);
        let result = engine.complete_enrollment("alice", &batch(75.0, 8.0, 300), None);
        assert!(result.success, "{:?}", result.error);
        engine
    }

    #[test]
    fn test_state_transitions() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = engine(clock);
        assert_eq!(engine.state("alice"), EngineState::Idle);

        engine.begin_enrollment("alice").unwrap();
        assert_eq!(engine.state("alice"), EngineState::Enrolling);

        engine.complete_enrollment("alice", &batch(75.0, 8.0, 300), Some(SecurityLevel::High));
        assert_eq!(engine.state("alice"), EngineState::Enrolled);
        assert_eq!(
            engine.template("alice").unwrap().security_level(),
            SecurityLevel::High
        );

        engine.begin_authentication("alice").unwrap();
        assert_eq!(engine.state("alice"), EngineState::Authenticating);

        engine.end_session("alice");
        assert_eq!(engine.state("alice"), EngineState::Enrolled);
    }

    #[test]
    fn test_rejected_enrollment_keeps_current_state() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = engine(clock);
        engine.begin_enrollment("alice").unwrap();

        let flat = SampleBatch::from_values(&[75.0; 300], Utc::now(), 40).unwrap();
        let result = engine.complete_enrollment("alice", &flat, None);

        assert!(!result.success);
        assert!(result.quality.is_some());
        assert_eq!(engine.state("alice"), EngineState::Enrolling);
        assert!(engine.cancel_enrollment("alice"));
        assert_eq!(engine.state("alice"), EngineState::Idle);
        assert_eq!(engine.audit().stats().enrollments_rejected, 1);
    }

    #[test]
    fn test_authentication_blocked_during_enrollment() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = enrolled(clock);
        engine.begin_enrollment("alice").unwrap();

        assert_eq!(
            engine.complete_authentication("alice", &batch(75.0, 8.0, 300)),
            AuthenticationOutcome::Error("enrollment in progress".to_string())
        );
    }

    #[test]
    fn test_enrollment_blocked_during_authentication() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = enrolled(clock);
        engine.begin_authentication("alice").unwrap();

        let result = engine.complete_enrollment("alice", &batch(75.0, 8.0, 300), None);
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("authentication already in progress")
        );
    }

    #[test]
    fn test_borderline_score_requests_retry() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = enrolled(clock);

        let outcome = engine.complete_authentication("alice", &batch(78.0, 7.0, 300));
        assert!(matches!(outcome, AuthenticationOutcome::RetryRequested(_)));

        let session = engine.session("alice").unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.denied_count(), 0);
        assert!(session.attempts()[0].similarity_score.is_some());
    }

    #[test]
    fn test_lockout_sets_cooldown() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let mut engine = enrolled(clock.clone());
        let stranger = batch(120.0, 2.0, 300);

        for _ in 0..2 {
            assert_eq!(
                engine.complete_authentication("alice", &stranger),
                AuthenticationOutcome::Denied("identity mismatch".to_string())
            );
        }
        assert_eq!(
            engine.complete_authentication("alice", &stranger),
            AuthenticationOutcome::Denied("max attempts reached".to_string())
        );
        assert_eq!(engine.session("alice").unwrap().state(), SessionState::LockedOut);
        assert!(engine.locked_until("alice").is_some());

        engine.end_session("alice");
        assert!(matches!(
            engine.begin_authentication("alice"),
            Err(EngineError::LockedOut(_))
        ));

        clock.advance(Duration::from_secs(61));
        assert!(engine.begin_authentication("alice").is_ok());
        assert!(engine.locked_until("alice").is_none());
    }

    #[test]
    fn test_expired_session_needs_a_new_one() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = enrolled(clock.clone());
        let same = batch(75.0, 8.0, 300);

        engine.begin_authentication("alice").unwrap();
        clock.advance(Duration::from_secs(301));

        for _ in 0..2 {
            assert_eq!(
                engine.complete_authentication("alice", &same),
                AuthenticationOutcome::Error("session expired".to_string())
            );
        }

        engine.begin_authentication("alice").unwrap();
        assert_eq!(
            engine.complete_authentication("alice", &same),
            AuthenticationOutcome::Approved(1.0)
        );
    }

    #[test]
    fn test_reenrollment_clears_lockout() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = enrolled(clock);
        let stranger = batch(120.0, 2.0, 300);
        for _ in 0..3 {
            engine.complete_authentication("alice", &stranger);
        }
        assert!(engine.locked_until("alice").is_some());

        let result = engine.complete_enrollment("alice", &stranger, None);
        assert!(result.success);
        assert!(engine.locked_until("alice").is_none());
        assert!(engine.session("alice").is_none());
    }

    #[test]
    fn test_delete_enrollment() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = enrolled(clock);

        engine.delete_enrollment("alice").unwrap();
        assert_eq!(engine.state("alice"), EngineState::Idle);
        assert!(matches!(
            engine.delete_enrollment("alice"),
            Err(EngineError::NotEnrolled)
        ));
    }

    #[test]
    fn test_invalid_identity() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = engine(clock);
        assert!(matches!(
            engine.begin_enrollment("../x"),
            Err(EngineError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_invalid_policy_rejected_at_construction() {
        let mut config = Config::default();
        config.policy.max_attempts = 0;
        let vault = TemplateVault::new(MemoryStore::new(), AesGcmSealer::generate());

        assert!(matches!(
            AuthEngine::new(&config, vault),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_stored_flat_template_never_approves() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut engine = engine(clock.clone());

        // A template written outside the validator, from a stuck sensor.
        let mut stuck = vec![75.0; 300];
        stuck[150] = 76.0;
        let vector =
            extract_features(&SampleBatch::from_values(&stuck, Utc::now(), 40).unwrap()).unwrap();
        let template = Template::new("alice", vector, SecurityLevel::Maximum, clock.now(), None);
        engine.vault_mut().save(&template).unwrap();

        let mut other = vec![80.0; 300];
        other[150] = 80.5;
        let other = SampleBatch::from_values(&other, Utc::now(), 40).unwrap();
        assert!(matches!(
            engine.complete_authentication("alice", &other),
            AuthenticationOutcome::RetryRequested(_)
        ));

        assert_eq!(
            engine.complete_authentication("alice", &batch(75.0, 8.0, 300)),
            AuthenticationOutcome::Denied("identity mismatch".to_string())
        );
        assert_eq!(engine.template("alice").unwrap().authentication_count(), 0);
    }

    #[test]
    fn test_manual_clock() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(10));
    }
}
