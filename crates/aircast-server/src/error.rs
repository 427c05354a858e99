//! Error types for the server module.

use thiserror::Error;

use aircast_capture::CaptureError;

/// Errors surfaced by the server lifecycle.
///
/// Per-session faults (transport, protocol, liveness) never appear here;
/// they are contained to the affected session.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` called while the server is not stopped.
    #[error("Server already running")]
    AlreadyRunning,

    /// Bind host could not be parsed.
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    /// The capture collaborator failed to start.
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Socket bind or other IO failure during startup.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
