//! Synheart HR Auth CLI
//!
//! Heart-rate biometric enrollment and authentication from recorded captures.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use synheart_hr_auth::{
    audit::{create_shared_log_with_persistence, SharedAuditLog},
    capture::{CaptureWindow, ReplayCollector, ReplayConfig, DEFAULT_SAMPLE_INTERVAL_MS},
    config::{AuthPolicy, Config},
    core::{AuthEngine, AuthenticationOutcome, QualityValidator, SecurityLevel},
    storage::{AesGcmSealer, FileStore, TemplateVault},
    SampleBatch, PRIVACY_NOTICE, VERSION,
};
use tracing_subscriber::EnvFilter;

type Engine = AuthEngine<FileStore, AesGcmSealer>;

#[derive(Parser)]
#[command(name = "synheart-auth")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Heart-rate biometric enrollment and authentication", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from a recorded capture
    Enroll {
        /// Identity to enroll
        #[arg(long)]
        identity: String,

        /// Recorded capture (JSON or CSV)
        #[arg(long)]
        input: PathBuf,

        /// Security level (low, medium, high, maximum); defaults to the configured level
        #[arg(long)]
        security_level: Option<SecurityLevel>,

        /// Capture window in seconds, clamped to the configured bounds
        #[arg(long, default_value = "16")]
        duration: u64,

        /// Spacing in milliseconds for samples without timestamps
        #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_MS)]
        interval_ms: i64,
    },

    /// Authenticate an identity; each input file is one attempt in one session
    Authenticate {
        /// Identity to authenticate
        #[arg(long)]
        identity: String,

        /// Recorded captures, one per attempt
        #[arg(long, num_args = 1.., required = true)]
        input: Vec<PathBuf>,

        /// Capture window in seconds, clamped to the configured bounds
        #[arg(long, default_value = "16")]
        duration: u64,

        /// Spacing in milliseconds for samples without timestamps
        #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_MS)]
        interval_ms: i64,
    },

    /// Run a quick quality check on a capture and print the report
    Check {
        /// Recorded capture (JSON or CSV)
        #[arg(long)]
        input: PathBuf,

        /// Spacing in milliseconds for samples without timestamps
        #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_MS)]
        interval_ms: i64,
    },

    /// Delete an identity's enrollment
    Delete {
        #[arg(long)]
        identity: String,
    },

    /// Show enrolled identities and audit statistics
    Status,

    /// Display the privacy notice
    Privacy,

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    match cli.command {
        Commands::Enroll {
            identity,
            input,
            security_level,
            duration,
            interval_ms,
        } => cmd_enroll(&config, &identity, &input, security_level, duration, interval_ms),
        Commands::Authenticate {
            identity,
            input,
            duration,
            interval_ms,
        } => cmd_authenticate(&config, &identity, &input, duration, interval_ms),
        Commands::Check { input, interval_ms } => cmd_check(&config, &input, interval_ms),
        Commands::Delete { identity } => cmd_delete(&config, &identity),
        Commands::Status => cmd_status(&config),
        Commands::Privacy => {
            println!("{PRIVACY_NOTICE}");
            Ok(())
        }
        Commands::Config => cmd_config(&config),
    }
}

fn cmd_enroll(
    config: &Config,
    identity: &str,
    input: &Path,
    security_level: Option<SecurityLevel>,
    duration: u64,
    interval_ms: i64,
) -> anyhow::Result<()> {
    let (mut engine, audit) = open_engine(config)?;

    println!("Synheart HR Auth v{VERSION}");
    println!();
    println!("Enrolling '{identity}' from {input:?}");

    engine.begin_enrollment(identity)?;
    let batch = match capture(input, duration, interval_ms, &config.policy) {
        Ok(batch) => batch,
        Err(e) => {
            engine.cancel_enrollment(identity);
            return Err(e);
        }
    };
    println!("  Captured {} samples", batch.len());

    let result = engine.complete_enrollment(identity, &batch, security_level);
    save_audit(&audit);

    if let Some(ref report) = result.quality {
        println!("  Quality score: {:.3}", report.score);
        for hint in &report.recommendations {
            println!("    - {hint}");
        }
    }

    if !result.success {
        engine.cancel_enrollment(identity);
        bail!(
            "enrollment rejected: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    if let Some(id) = result.template_id {
        println!("  Template: {id}");
    }
    println!("Enrollment complete.");
    Ok(())
}

fn cmd_authenticate(
    config: &Config,
    identity: &str,
    inputs: &[PathBuf],
    duration: u64,
    interval_ms: i64,
) -> anyhow::Result<()> {
    let (mut engine, audit) = open_engine(config)?;
    let session_id = engine.begin_authentication(identity)?;
    println!("Authenticating '{identity}' (session {session_id})");

    let approved = run_attempts(
        &mut engine,
        &audit,
        identity,
        inputs,
        duration,
        interval_ms,
        &config.policy,
    )?;
    if !approved {
        bail!("authentication not approved");
    }
    if let Ok(template) = engine.template(identity) {
        println!(
            "Approved. Successful authentications: {}",
            template.authentication_count()
        );
    }
    Ok(())
}

/// One attempt per input in the open session. The session is closed and the
/// audit log flushed even when a capture cannot be read.
fn run_attempts(
    engine: &mut Engine,
    audit: &SharedAuditLog,
    identity: &str,
    inputs: &[PathBuf],
    duration: u64,
    interval_ms: i64,
    policy: &AuthPolicy,
) -> anyhow::Result<bool> {
    let mut approved = false;
    let mut capture_error = None;
    for (attempt, input) in inputs.iter().enumerate() {
        let batch = match capture(input, duration, interval_ms, policy) {
            Ok(batch) => batch,
            Err(e) => {
                capture_error = Some(e);
                break;
            }
        };
        let outcome = engine.complete_authentication(identity, &batch);
        println!("  Attempt {}: {outcome}", attempt + 1);

        approved = outcome.is_approved();
        if engine.session(identity).map_or(true, |s| s.is_terminal())
            || matches!(outcome, AuthenticationOutcome::Error(_))
        {
            break;
        }
    }

    engine.end_session(identity);
    save_audit(audit);

    match capture_error {
        Some(e) => Err(e),
        None => Ok(approved),
    }
}

fn cmd_check(config: &Config, input: &Path, interval_ms: i64) -> anyhow::Result<()> {
    let batch = synheart_hr_auth::capture::load_batch(input, interval_ms)
        .with_context(|| format!("failed to read {input:?}"))?;
    let report = QualityValidator::quick_check(&config.policy).validate(&batch);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_delete(config: &Config, identity: &str) -> anyhow::Result<()> {
    let (mut engine, _audit) = open_engine(config)?;
    engine.delete_enrollment(identity)?;
    println!("Enrollment for '{identity}' deleted.");
    Ok(())
}

fn cmd_status(config: &Config) -> anyhow::Result<()> {
    println!("Synheart HR Auth Status");
    println!("=======================");
    println!();

    println!("Configuration:");
    println!("  Security level: {}", config.security_level);
    let thresholds = config.policy.thresholds_for(config.security_level);
    println!(
        "  Thresholds: approve {:.2}, retry {:.2}",
        thresholds.approve, thresholds.retry
    );
    println!("  Max attempts: {}", config.policy.max_attempts);
    println!(
        "  Session timeout: {}s",
        config.policy.session_timeout.as_secs()
    );
    println!();

    let mut identities: Vec<String> = std::fs::read_dir(config.templates_path())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|e| e == "sealed").unwrap_or(false))
                .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
                .collect()
        })
        .unwrap_or_default();
    identities.sort();

    if identities.is_empty() {
        println!("No enrolled identities.");
    } else {
        println!("Enrolled identities:");
        for id in &identities {
            println!("  {id}");
        }
    }
    println!();

    let audit = create_shared_log_with_persistence(config.audit_path());
    println!("{}", audit.summary());
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn open_engine(config: &Config) -> anyhow::Result<(Engine, SharedAuditLog)> {
    config.ensure_directories()?;
    let store = FileStore::new(config.templates_path())?;
    let sealer = AesGcmSealer::load_or_create(&config.key_path())?;
    let audit = create_shared_log_with_persistence(config.audit_path());

    let engine = AuthEngine::new(config, TemplateVault::new(store, sealer))
        .context("invalid authentication policy")?
        .with_audit_log(audit.clone());
    Ok((engine, audit))
}

/// Replay a recording through a capture window.
fn capture(
    path: &Path,
    duration: u64,
    interval_ms: i64,
    policy: &AuthPolicy,
) -> anyhow::Result<SampleBatch> {
    let mut collector = ReplayCollector::new(ReplayConfig {
        path: path.to_path_buf(),
        sample_interval_ms: interval_ms,
    });
    collector
        .start()
        .with_context(|| format!("failed to read {path:?}"))?;

    let window = CaptureWindow::new(duration, &policy.capture_duration);
    let batch = collector.fill_window(window)?;
    collector.stop();
    Ok(batch)
}

fn save_audit(audit: &SharedAuditLog) {
    if let Err(e) = audit.save() {
        tracing::warn!("Could not save audit stats: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn signal(n: usize, center: f64, sd: f64) -> Vec<f64> {
        let half_width = sd * 3f64.sqrt();
        (0..n)
            .map(|i| {
                let u = ((i * 62) % 97) as f64 / 96.0;
                center + half_width * (2.0 * u - 1.0)
            })
            .collect()
    }

    #[test]
    fn test_unreadable_capture_still_saves_audit() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit.json");
        let audit = create_shared_log_with_persistence(audit_path.clone());
        let vault = TemplateVault::new(
            FileStore::new(dir.path().join("templates")).unwrap(),
            AesGcmSealer::generate(),
        );
        let mut engine = AuthEngine::new(&Config::default(), vault)
            .unwrap()
            .with_audit_log(audit.clone());

        let owner = SampleBatch::from_values(&signal(300, 75.0, 8.0), Utc::now(), 40).unwrap();
        assert!(engine.complete_enrollment("alice", &owner, None).success);

        let close = dir.path().join("close.csv");
        let lines: Vec<String> = signal(300, 78.0, 7.0).iter().map(|v| v.to_string()).collect();
        std::fs::write(&close, lines.join("\n")).unwrap();
        let inputs = vec![close, dir.path().join("missing.csv")];

        let policy = AuthPolicy::default();
        let result = run_attempts(&mut engine, &audit, "alice", &inputs, 16, 40, &policy);

        assert!(result.is_err());
        assert!(engine.session("alice").is_none());
        let saved = create_shared_log_with_persistence(audit_path).stats();
        assert_eq!(saved.retries, 1);
        assert_eq!(saved.sessions_started, 1);
    }
}
