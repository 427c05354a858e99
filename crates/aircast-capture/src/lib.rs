//! Loopback audio capture boundary for aircast.
//!
//! The streaming core only ever sees this crate's types: a capture backend
//! is started with a [`CaptureConfig`], returns the effective [`AudioFormat`],
//! and thereafter delivers raw PCM buffers through an [`AudioSink`] callback
//! from its own thread until stopped. Platform backends (WASAPI, PipeWire)
//! live behind the same trait; the in-tree [`ToneCapture`] backend synthesizes
//! a test tone and is what the CLI and the integration tests run against.

mod backend;
mod error;
mod format;
mod tone;

pub use backend::{AudioSink, CaptureBackend};
pub use error::CaptureError;
pub use format::{AudioFormat, CaptureConfig, EndpointInfo, SampleEncoding};
pub use tone::ToneCapture;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Default capture sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Default number of capture channels.
pub const DEFAULT_CHANNELS: u16 = 2;

/// Duration of one delivered buffer in milliseconds.
pub const BUFFER_INTERVAL_MS: u64 = 10;
