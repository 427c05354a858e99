//! Control-channel commands and frame codecs.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::TAG_SIZE;

/// A control-channel command tag.
///
/// Tags flow client→server as 4-byte little-endian requests; `Heartbeat`
/// also flows server→client as a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// Reserved. Never valid on the wire.
    None = 0,
    /// Request the serialized capture format descriptor.
    GetFormat = 1,
    /// Request a streaming session; the reply carries the session id.
    StartPlay = 2,
    /// Liveness probe, no body, no required reply.
    Heartbeat = 3,
}

impl Command {
    /// The tag value as written on the wire.
    pub fn tag(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Command {
    type Error = ProtocolError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Command::GetFormat),
            2 => Ok(Command::StartPlay),
            3 => Ok(Command::Heartbeat),
            // Tag 0 exists in the enum but a client must never send it.
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// Encode the `get_format` response: `[tag=1][size:u32][format bytes]`.
///
/// Returned as one contiguous buffer so the reply never interleaves with
/// other writes on the same socket.
pub fn encode_format_response(format: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_SIZE + 4 + format.len());
    buf.put_u32_le(Command::GetFormat.tag());
    buf.put_u32_le(format.len() as u32);
    buf.put_slice(format);
    buf.freeze()
}

/// Encode the `start_play` response: `[tag=2][id:i32]`.
///
/// An id greater than zero means success; zero means the connection already
/// has a playing session.
pub fn encode_start_play_response(id: i32) -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_SIZE + 4);
    buf.put_u32_le(Command::StartPlay.tag());
    buf.put_i32_le(id);
    buf.freeze()
}

/// Encode a heartbeat probe: `[tag=3]`, no body.
pub fn encode_heartbeat() -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_SIZE);
    buf.put_u32_le(Command::Heartbeat.tag());
    buf.freeze()
}

/// Decode a data-channel registration datagram.
///
/// The payload is exactly one little-endian `i32` session id. Anything
/// shorter is rejected; trailing bytes are ignored.
pub fn decode_registration(payload: &[u8]) -> Result<i32, ProtocolError> {
    if payload.len() < 4 {
        return Err(ProtocolError::Truncated {
            expected: 4,
            actual: payload.len(),
        });
    }
    let mut id = [0u8; 4];
    id.copy_from_slice(&payload[..4]);
    Ok(i32::from_le_bytes(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_tag_round_trip() {
        for cmd in [Command::GetFormat, Command::StartPlay, Command::Heartbeat] {
            assert_eq!(Command::try_from(cmd.tag()).unwrap(), cmd);
        }
    }

    #[test]
    fn test_none_tag_rejected() {
        assert!(matches!(
            Command::try_from(0),
            Err(ProtocolError::UnknownCommand(0))
        ));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(matches!(
            Command::try_from(42),
            Err(ProtocolError::UnknownCommand(42))
        ));
    }

    #[test]
    fn test_format_response_layout() {
        let resp = encode_format_response(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(&resp[0..4], &1u32.to_le_bytes());
        assert_eq!(&resp[4..8], &3u32.to_le_bytes());
        assert_eq!(&resp[8..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_start_play_response_layout() {
        let resp = encode_start_play_response(7);
        assert_eq!(&resp[0..4], &2u32.to_le_bytes());
        assert_eq!(&resp[4..8], &7i32.to_le_bytes());
    }

    #[test]
    fn test_heartbeat_is_bare_tag() {
        let resp = encode_heartbeat();
        assert_eq!(resp.as_ref(), &3u32.to_le_bytes());
    }

    #[test]
    fn test_decode_registration() {
        assert_eq!(decode_registration(&5i32.to_le_bytes()).unwrap(), 5);
        // Trailing bytes are ignored.
        assert_eq!(decode_registration(&[1, 0, 0, 0, 0xFF]).unwrap(), 1);
        assert!(decode_registration(&[1, 0]).is_err());
    }
}
