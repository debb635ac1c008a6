//! Audit counters for enrollment and authentication activity.
//!
//! Only aggregate counts are kept. No identity ids, scores, or heart-rate
//! values are ever written here.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, AuditLog, AuditStats, SharedAuditLog,
};
