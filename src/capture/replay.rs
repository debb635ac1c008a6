//! Replay of recorded heart-rate captures.
//!
//! Stands in for wearable hardware: a recording is loaded from disk and
//! streamed sample by sample over a channel, the same way a live sensor
//! collector would hand samples to the consumer.
//!
//! Two recording formats are accepted:
//! - JSON: an array of `{"bpm": .., "timestamp": ".."}` objects
//! - CSV: one sample per line, either `bpm` or `rfc3339_timestamp,bpm`

use crate::capture::types::{CaptureError, HeartRateSample, SampleBatch};
use crate::capture::window::CaptureWindow;
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{bounded, Receiver};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Default spacing for CSV recordings without timestamps (25 Hz).
pub const DEFAULT_SAMPLE_INTERVAL_MS: i64 = 40;

/// Configuration for the replay collector.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Recording to replay
    pub path: PathBuf,
    /// Spacing applied to samples that carry no timestamp
    pub sample_interval_ms: i64,
}

impl ReplayConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
        }
    }
}

/// Streams a recorded capture through a channel.
pub struct ReplayCollector {
    config: ReplayConfig,
    receiver: Option<Receiver<HeartRateSample>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReplayCollector {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            receiver: None,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Load the recording and start streaming it.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let samples = load_recording(&self.config.path, self.config.sample_interval_ms)?;
        let (sender, receiver) = bounded(1_024);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let handle = std::thread::spawn(move || {
            for sample in samples {
                if !running.load(Ordering::SeqCst) || sender.send(sample).is_err() {
                    break;
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        self.receiver = Some(receiver);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop streaming. Samples already in the channel stay readable.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Drop the receiver first so a blocked sender wakes up.
        self.receiver = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for samples, if streaming has started.
    pub fn receiver(&self) -> Option<&Receiver<HeartRateSample>> {
        self.receiver.as_ref()
    }

    /// Drain the stream into `window` until it completes or the stream ends.
    pub fn fill_window(&self, mut window: CaptureWindow) -> Result<SampleBatch, CaptureError> {
        if let Some(receiver) = &self.receiver {
            for sample in receiver.iter() {
                if window.push(sample) {
                    break;
                }
            }
        }
        window.close();
        window.into_batch()
    }
}

impl Drop for ReplayCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Load a recording into a batch without going through a channel.
pub fn load_batch(path: &Path, sample_interval_ms: i64) -> Result<SampleBatch, CaptureError> {
    SampleBatch::new(load_recording(path, sample_interval_ms)?)
}

fn load_recording(
    path: &Path,
    sample_interval_ms: i64,
) -> Result<Vec<HeartRateSample>, CaptureError> {
    let content = std::fs::read_to_string(path).map_err(|e| CaptureError::Io(e.to_string()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
        || content.trim_start().starts_with('[');

    if is_json {
        serde_json::from_str(&content).map_err(|e| CaptureError::Parse(e.to_string()))
    } else {
        parse_csv(&content, Utc::now(), sample_interval_ms)
    }
}

fn parse_csv(
    content: &str,
    start: DateTime<Utc>,
    sample_interval_ms: i64,
) -> Result<Vec<HeartRateSample>, CaptureError> {
    let mut samples = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let (timestamp, bpm_field) = match fields.as_slice() {
            [bpm] => (
                start + Duration::milliseconds(sample_interval_ms * samples.len() as i64),
                *bpm,
            ),
            [ts, bpm] => {
                // Header rows are skipped
                if bpm.eq_ignore_ascii_case("bpm") {
                    continue;
                }
                let ts = DateTime::parse_from_rfc3339(ts)
                    .map_err(|e| CaptureError::Parse(format!("line {}: {e}", line_no + 1)))?;
                (ts.with_timezone(&Utc), *bpm)
            }
            _ => {
                return Err(CaptureError::Parse(format!(
                    "line {}: expected 1 or 2 fields, got {}",
                    line_no + 1,
                    fields.len()
                )))
            }
        };

        if bpm_field.eq_ignore_ascii_case("bpm") {
            continue;
        }
        let bpm: f64 = bpm_field
            .parse()
            .map_err(|e| CaptureError::Parse(format!("line {}: {e}", line_no + 1)))?;
        samples.push(HeartRateSample::new(bpm, timestamp));
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureDurationBounds;
    use std::io::Write;

    #[test]
    fn test_parse_csv_values_only() {
        let start = Utc::now();
        let samples = parse_csv("bpm\n70\n72.5\n\n71\n", start, 40).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].bpm, 72.5);
        assert_eq!(samples[2].timestamp, start + Duration::milliseconds(80));
    }

    #[test]
    fn test_parse_csv_with_timestamps() {
        let content = "timestamp,bpm\n2024-01-22T10:00:00Z,70\n2024-01-22T10:00:01Z,71\n";
        let samples = parse_csv(content, Utc::now(), 40).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(
            samples[1].timestamp.to_rfc3339(),
            "2024-01-22T10:00:01+00:00"
        );
    }

    #[test]
    fn test_parse_csv_rejects_garbage() {
        assert!(parse_csv("70\nabc\n", Utc::now(), 40).is_err());
        assert!(parse_csv("1,2,3\n", Utc::now(), 40).is_err());
    }

    #[test]
    fn test_replay_fills_window() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        for i in 0..400 {
            writeln!(file, "{}", 70.0 + (i % 7) as f64).unwrap();
        }

        let mut collector = ReplayCollector::new(ReplayConfig::new(file.path()));
        collector.start().unwrap();

        let bounds = CaptureDurationBounds {
            min_secs: 6,
            max_secs: 16,
        };
        // 8 seconds at 25 Hz
        let batch = collector
            .fill_window(CaptureWindow::new(8, &bounds))
            .unwrap();
        assert_eq!(batch.len(), 200);

        collector.stop();
        assert!(!collector.is_running());
    }
}
