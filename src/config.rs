//! Configuration for the heart-rate authenticator.
//!
//! All policy values are data. The engine reads them once per enrollment or
//! authentication session.

use crate::core::policy::{SecurityLevel, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Security level applied to new enrollments
    pub security_level: SecurityLevel,

    /// Authentication policy
    pub policy: AuthPolicy,

    /// Path for sealed templates, the sealing key and audit statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-hr-auth");

        Self {
            security_level: SecurityLevel::Medium,
            policy: AuthPolicy::default(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-hr-auth")
            .join("config.json")
    }

    /// Directory holding one sealed template per identity.
    pub fn templates_path(&self) -> PathBuf {
        self.data_path.join("templates")
    }

    /// File holding the hex-encoded sealing key.
    pub fn key_path(&self) -> PathBuf {
        self.data_path.join("template.key")
    }

    /// File holding persisted audit statistics.
    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit_stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.templates_path())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()
    }
}

/// Policy surface consumed by the validator and the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPolicy {
    /// Minimum sample count for enrollment-grade captures
    pub min_samples: usize,

    /// Minimum sample count for quick quality checks
    pub quick_check_min_samples: usize,

    /// Bounds on the capture duration the collaborator may request
    pub capture_duration: CaptureDurationBounds,

    /// Combined quality score below which a batch is rejected
    pub quality_minimum_score: f64,

    /// Approve/retry thresholds per security level
    pub thresholds: ThresholdTable,

    /// Denied attempts that lock a session
    pub max_attempts: u32,

    /// Session lifetime measured from its first attempt
    #[serde(with = "duration_serde")]
    pub session_timeout: Duration,

    /// Time after a lockout before a new session may start
    #[serde(with = "duration_serde")]
    pub lockout_cooldown: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            min_samples: 200,
            quick_check_min_samples: 60,
            capture_duration: CaptureDurationBounds::default(),
            quality_minimum_score: 0.65,
            thresholds: ThresholdTable::default(),
            max_attempts: 3,
            session_timeout: Duration::from_secs(300), // 5 minutes
            lockout_cooldown: Duration::from_secs(60),
        }
    }
}

impl AuthPolicy {
    /// Thresholds for a security level.
    pub fn thresholds_for(&self, level: SecurityLevel) -> Thresholds {
        self.thresholds.get(level)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_samples == 0 || self.quick_check_min_samples == 0 {
            return Err(ConfigError::Invalid(
                "sample floors must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality_minimum_score) {
            return Err(ConfigError::Invalid(format!(
                "quality_minimum_score {} outside [0, 1]",
                self.quality_minimum_score
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.capture_duration.min_secs == 0
            || self.capture_duration.min_secs > self.capture_duration.max_secs
        {
            return Err(ConfigError::Invalid(format!(
                "invalid capture duration bounds {}..{}",
                self.capture_duration.min_secs, self.capture_duration.max_secs
            )));
        }
        for level in SecurityLevel::ALL {
            let t = self.thresholds.get(level);
            if !t.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "thresholds for {level} must satisfy 0 < retry < approve < 1 \
                     (got approve {}, retry {})",
                    t.approve, t.retry
                )));
            }
        }
        Ok(())
    }
}

/// Allowed capture durations in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDurationBounds {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for CaptureDurationBounds {
    fn default() -> Self {
        Self {
            min_secs: 6,
            max_secs: 16,
        }
    }
}

impl CaptureDurationBounds {
    pub fn clamp(&self, requested_secs: u64) -> u64 {
        requested_secs.clamp(self.min_secs, self.max_secs.max(self.min_secs))
    }
}

/// Thresholds for every security level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub low: Thresholds,
    pub medium: Thresholds,
    pub high: Thresholds,
    pub maximum: Thresholds,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            low: SecurityLevel::Low.default_thresholds(),
            medium: SecurityLevel::Medium.default_thresholds(),
            high: SecurityLevel::High.default_thresholds(),
            maximum: SecurityLevel::Maximum.default_thresholds(),
        }
    }
}

impl ThresholdTable {
    pub fn get(&self, level: SecurityLevel) -> Thresholds {
        match level {
            SecurityLevel::Low => self.low,
            SecurityLevel::Medium => self.medium,
            SecurityLevel::High => self.high,
            SecurityLevel::Maximum => self.maximum,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security_level, SecurityLevel::Medium);
        assert_eq!(config.policy.min_samples, 200);
        assert_eq!(config.policy.max_attempts, 3);
        assert_eq!(config.policy.session_timeout, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"session_timeout\":300"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.policy.thresholds, config.policy.thresholds);
        assert_eq!(parsed.policy.lockout_cooldown, Duration::from_secs(60));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut policy = AuthPolicy::default();
        policy.thresholds.high = Thresholds {
            approve: 0.7,
            retry: 0.8,
        };
        assert!(matches!(policy.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let policy = AuthPolicy {
            max_attempts: 0,
            ..AuthPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_capture_bounds_clamp() {
        let bounds = CaptureDurationBounds::default();
        assert_eq!(bounds.clamp(1), 6);
        assert_eq!(bounds.clamp(12), 12);
        assert_eq!(bounds.clamp(30), 16);
    }
}
