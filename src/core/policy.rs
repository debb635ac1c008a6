//! Security levels and their decision thresholds.

use serde::{Deserialize, Serialize};

/// Named policy bundle fixing the approve/retry confidence thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
    Maximum,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::Low,
        SecurityLevel::Medium,
        SecurityLevel::High,
        SecurityLevel::Maximum,
    ];

    /// Built-in thresholds, used unless the configuration overrides them.
    pub fn default_thresholds(self) -> Thresholds {
        match self {
            SecurityLevel::Low => Thresholds::new(0.70, 0.55),
            SecurityLevel::Medium => Thresholds::new(0.80, 0.65),
            SecurityLevel::High => Thresholds::new(0.88, 0.75),
            SecurityLevel::Maximum => Thresholds::new(0.95, 0.85),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityLevel::Low => "low",
            SecurityLevel::Medium => "medium",
            SecurityLevel::High => "high",
            SecurityLevel::Maximum => "maximum",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(SecurityLevel::Low),
            "medium" => Ok(SecurityLevel::Medium),
            "high" => Ok(SecurityLevel::High),
            "maximum" | "max" => Ok(SecurityLevel::Maximum),
            other => Err(format!("unknown security level '{other}'")),
        }
    }
}

/// Confidence thresholds. Invariant: `0 < retry < approve < 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Confidence at or above which an attempt is approved
    pub approve: f64,
    /// Confidence at or above which a non-approved attempt may retry
    pub retry: f64,
}

impl Thresholds {
    pub const fn new(approve: f64, retry: f64) -> Self {
        Self { approve, retry }
    }

    pub fn is_valid(&self) -> bool {
        self.retry > 0.0 && self.approve < 1.0 && self.approve > self.retry
    }

    /// Map a confidence onto the three decision bands.
    pub fn classify(&self, confidence: f64) -> Decision {
        if confidence >= self.approve {
            Decision::Approve
        } else if confidence >= self.retry {
            Decision::Retry
        } else {
            Decision::Deny
        }
    }
}

/// Band a confidence falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Retry,
    Deny,
}
