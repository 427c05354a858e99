//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture endpoint not found.
    #[error("Capture endpoint not found: {0}")]
    EndpointNotFound(String),

    /// Requested format cannot be produced by this backend.
    #[error("Capture format not supported: {0}")]
    FormatNotSupported(String),

    /// Capture already started.
    #[error("Capture already started")]
    AlreadyStarted,

    /// Capture device failed mid-stream.
    #[error("Capture device lost: {0}")]
    DeviceLost(String),

    /// Backend-specific failure.
    #[error("Capture backend error: {0}")]
    Backend(String),
}
