//! Error types for the protocol module.

use thiserror::Error;

/// Errors that can occur while decoding protocol frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Command tag not recognized.
    #[error("Unknown command tag: {0}")]
    UnknownCommand(u32),

    /// Frame shorter than its fixed-size layout requires.
    #[error("Frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Block align must be positive to segment audio.
    #[error("Invalid block align: {0}")]
    InvalidBlockAlign(u16),
}
