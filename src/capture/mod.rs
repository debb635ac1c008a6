//! Capture-side types for the heart-rate authenticator.
//!
//! Sensor polling lives outside this crate. This module defines what the
//! capture collaborator hands over (a [`SampleBatch`]), how a capture window
//! is bounded, and a replay collector that streams recorded captures.

pub mod replay;
pub mod types;
pub mod window;

// Re-export commonly used types
pub use replay::{load_batch, ReplayCollector, ReplayConfig, DEFAULT_SAMPLE_INTERVAL_MS};
pub use types::{CaptureError, HeartRateSample, SampleBatch};
pub use window::CaptureWindow;
