//! Wire protocol for the aircast streaming server.
//!
//! Two channels share one port number:
//! - **Control (TCP)**: a fixed-size binary command protocol. Every command
//!   starts with a 4-byte little-endian tag; responses are encoded as one
//!   contiguous buffer so a logical reply is always a single write.
//! - **Data (UDP)**: clients register with a single 4-byte session id
//!   datagram; the server answers with nothing and thereafter streams raw
//!   PCM segments to the registered endpoint.

mod command;
mod error;
mod segment;

pub use command::{
    decode_registration, encode_format_response, encode_heartbeat, encode_start_play_response,
    Command,
};
pub use error::ProtocolError;
pub use segment::{max_segment_size, segment};

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Size in bytes of a command tag on the wire.
pub const TAG_SIZE: usize = 4;

/// Assumed path MTU in bytes.
pub const MTU: usize = 1492;

/// IPv4 header size in bytes.
pub const IPV4_HEADER_SIZE: usize = 20;

/// UDP header size in bytes.
pub const UDP_HEADER_SIZE: usize = 8;

/// Largest UDP payload that fits the assumed MTU.
pub const MAX_UDP_PAYLOAD: usize = MTU - IPV4_HEADER_SIZE - UDP_HEADER_SIZE;

/// Default server port for both the control and data channels.
pub const DEFAULT_PORT: u16 = 65530;

/// Cadence at which the server probes playing peers, in seconds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 3;

/// A peer silent for longer than this is considered dead, in seconds.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 5;
