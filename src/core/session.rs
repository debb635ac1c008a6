//! Authentication sessions and attempt records.

use crate::config::AuthPolicy;
use crate::core::policy::{SecurityLevel, Thresholds};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Result of one authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AuthenticationOutcome {
    /// Confidence met the approve threshold
    Approved(f64),
    /// Identity mismatch, or the lockout reason on the final attempt
    Denied(String),
    /// Capture-quality problem or a borderline score
    RetryRequested(String),
    /// Storage, crypto or protocol failure
    Error(String),
}

impl AuthenticationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, AuthenticationOutcome::Approved(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, AuthenticationOutcome::Denied(_))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AuthenticationOutcome::Approved(_) => "approved",
            AuthenticationOutcome::Denied(_) => "denied",
            AuthenticationOutcome::RetryRequested(_) => "retry_requested",
            AuthenticationOutcome::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for AuthenticationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthenticationOutcome::Approved(c) => write!(f, "Approved (confidence {c:.3})"),
            AuthenticationOutcome::Denied(r) => write!(f, "Denied: {r}"),
            AuthenticationOutcome::RetryRequested(m) => write!(f, "Retry requested: {m}"),
            AuthenticationOutcome::Error(m) => write!(f, "Error: {m}"),
        }
    }
}

/// One evaluated attempt. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub timestamp: DateTime<Utc>,
    /// Absent when the capture was rejected before scoring
    pub similarity_score: Option<f64>,
    pub outcome: AuthenticationOutcome,
}

impl AttemptRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        similarity_score: Option<f64>,
        outcome: AuthenticationOutcome,
    ) -> Self {
        Self {
            timestamp,
            similarity_score,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Approved,
    LockedOut,
    /// A storage or crypto failure ended the session
    Failed,
    Expired,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

/// A single identity's authentication session.
///
/// Policy values are captured when the session opens and do not change for
/// its lifetime.
#[derive(Debug, Clone)]
pub struct AuthenticationSession {
    id: Uuid,
    identity_id: String,
    started_at: DateTime<Utc>,
    attempts: Vec<AttemptRecord>,
    state: SessionState,
    max_attempts: u32,
    timeout: Duration,
    security_level: SecurityLevel,
    thresholds: Thresholds,
}

impl AuthenticationSession {
    pub fn new(
        identity_id: impl Into<String>,
        started_at: DateTime<Utc>,
        policy: &AuthPolicy,
        security_level: SecurityLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id: identity_id.into(),
            started_at,
            attempts: Vec::new(),
            state: SessionState::Active,
            max_attempts: policy.max_attempts,
            timeout: policy.session_timeout,
            security_level,
            thresholds: policy.thresholds_for(security_level),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// True once strictly more than `timeout` has passed since the session opened.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (now - self.started_at).to_std() {
            Ok(elapsed) => elapsed > self.timeout,
            // Clock went backwards
            Err(_) => false,
        }
    }

    /// Denied attempts so far. Quality retries do not count.
    pub fn denied_count(&self) -> u32 {
        self.attempts
            .iter()
            .filter(|a| a.outcome.is_denied())
            .count() as u32
    }

    /// Whether one more denial locks the session.
    pub fn next_denial_locks(&self) -> bool {
        self.denied_count() + 1 >= self.max_attempts
    }

    pub(crate) fn record(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }
}
