//! Streaming session manager and audio broadcast pipeline.
//!
//! This crate is the core of aircast: it registers clients over a TCP
//! control channel, fills in their UDP data endpoints from one-shot
//! registration datagrams, supervises per-session liveness with pushed
//! heartbeats, and fans captured PCM out to every registered peer in
//! MTU-sized, frame-aligned segments.
//!
//! Concurrency model: one current-thread tokio runtime per running server,
//! on a dedicated network thread. The session registry is only mutated from
//! tasks on that runtime; the capture thread crosses into it exclusively by
//! posting buffers onto the broadcast channel.

mod addr;
mod broadcast;
mod control;
mod data;
mod error;
mod heartbeat;
mod server;
mod session;

pub use addr::local_addresses;
pub use broadcast::CapturedBuffer;
pub use error::ServerError;
pub use server::{Server, ServerState};
pub use session::{ConnId, Session, SessionId, SessionRegistry};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
