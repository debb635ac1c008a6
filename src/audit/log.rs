//! Aggregate audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for the decision engine.
#[derive(Debug)]
pub struct AuditLog {
    enrollments_completed: AtomicU64,
    enrollments_rejected: AtomicU64,
    sessions_started: AtomicU64,
    approvals: AtomicU64,
    retries: AtomicU64,
    denials: AtomicU64,
    lockouts: AtomicU64,
    errors: AtomicU64,
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            enrollments_completed: AtomicU64::new(0),
            enrollments_rejected: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            approvals: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            denials: AtomicU64::new(0),
            lockouts: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log backed by a JSON file, seeded from it if present.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous audit stats");
        }

        log
    }

    pub fn record_enrollment_completed(&self) {
        self.enrollments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrollment_rejected(&self) {
        self.enrollments_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_approval(&self) {
        self.approvals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denial(&self) {
        self.denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lockout(&self) {
        self.lockouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            enrollments_completed: self.enrollments_completed.load(Ordering::Relaxed),
            enrollments_rejected: self.enrollments_rejected.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            approvals: self.approvals.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            lockouts: self.lockouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }

    /// Human-readable summary for the `status` command.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Audit Statistics:\n\
             - Enrollments completed: {}\n\
             - Enrollments rejected: {}\n\
             - Authentication sessions: {}\n\
             - Approved attempts: {}\n\
             - Retry requests: {}\n\
             - Denied attempts: {}\n\
             - Lockouts: {}\n\
             - Errors: {}\n\
             \n\
             Privacy:\n\
             - Templates are stored sealed (AES-256-GCM)\n\
             - Raw heart-rate samples are never persisted",
            stats.enrollments_completed,
            stats.enrollments_rejected,
            stats.sessions_started,
            stats.approvals,
            stats.retries,
            stats.denials,
            stats.lockouts,
            stats.errors,
        )
    }

    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                enrollments_completed: stats.enrollments_completed,
                enrollments_rejected: stats.enrollments_rejected,
                sessions_started: stats.sessions_started,
                approvals: stats.approvals,
                retries: stats.retries,
                denials: stats.denials,
                lockouts: stats.lockouts,
                errors: stats.errors,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let persisted: PersistedStats =
            serde_json::from_str(&content).map_err(std::io::Error::other)?;

        self.enrollments_completed
            .store(persisted.enrollments_completed, Ordering::Relaxed);
        self.enrollments_rejected
            .store(persisted.enrollments_rejected, Ordering::Relaxed);
        self.sessions_started
            .store(persisted.sessions_started, Ordering::Relaxed);
        self.approvals.store(persisted.approvals, Ordering::Relaxed);
        self.retries.store(persisted.retries, Ordering::Relaxed);
        self.denials.store(persisted.denials, Ordering::Relaxed);
        self.lockouts.store(persisted.lockouts, Ordering::Relaxed);
        self.errors.store(persisted.errors, Ordering::Relaxed);
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.enrollments_completed,
            &self.enrollments_rejected,
            &self.sessions_started,
            &self.approvals,
            &self.retries,
            &self.denials,
            &self.lockouts,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub enrollments_completed: u64,
    pub enrollments_rejected: u64,
    pub sessions_started: u64,
    pub approvals: u64,
    pub retries: u64,
    pub denials: u64,
    pub lockouts: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    enrollments_completed: u64,
    enrollments_rejected: u64,
    sessions_started: u64,
    approvals: u64,
    retries: u64,
    denials: u64,
    lockouts: u64,
    errors: u64,
    last_updated: DateTime<Utc>,
}

/// Audit log shared between the engine and its caller.
pub type SharedAuditLog = Arc<AuditLog>;

pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let log = AuditLog::new();
        log.record_session_started();
        log.record_denial();
        log.record_denial();
        log.record_approval();

        let stats = log.stats();
        assert_eq!(stats.sessions_started, 1);
        assert_eq!(stats.denials, 2);
        assert_eq!(stats.approvals, 1);
        assert_eq!(stats.lockouts, 0);
    }

    #[test]
    fn test_reset() {
        let log = AuditLog::new();
        log.record_enrollment_completed();
        log.record_error();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.enrollments_completed, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit_stats.json");

        let log = AuditLog::with_persistence(path.clone());
        log.record_enrollment_completed();
        log.record_lockout();
        log.save().unwrap();

        let reloaded = AuditLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.enrollments_completed, 1);
        assert_eq!(stats.lockouts, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = AuditLog::new().summary();
        assert!(summary.contains("Enrollments completed"));
        assert!(summary.contains("Lockouts"));
        assert!(summary.contains("never persisted"));
    }
}
