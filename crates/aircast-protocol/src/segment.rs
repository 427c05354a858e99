//! MTU-aware segmentation of captured PCM buffers.
//!
//! A captured buffer is split into datagram-sized segments before broadcast.
//! A segment must never split a sample frame: its size is always a multiple
//! of `block_align` (channels × bytes per sample), except the final remainder
//! segment which is still frame-aligned because the input is.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::{ProtocolResult, MAX_UDP_PAYLOAD};

/// Largest segment size for the given block align.
///
/// The MTU budget (1464 bytes of UDP payload) rounded down to a whole number
/// of sample frames.
pub fn max_segment_size(block_align: u16) -> ProtocolResult<usize> {
    if block_align == 0 {
        return Err(ProtocolError::InvalidBlockAlign(block_align));
    }
    Ok(MAX_UDP_PAYLOAD - MAX_UDP_PAYLOAD % block_align as usize)
}

/// Split a captured buffer into MTU-bounded, frame-aligned segments.
///
/// Segments are zero-copy slices of the input. Concatenating them reproduces
/// the input exactly; every segment except possibly the last has length
/// `max_segment_size(block_align)`, and the last is the positive remainder.
/// An empty buffer yields no segments.
pub fn segment(data: &Bytes, block_align: u16) -> ProtocolResult<Vec<Bytes>> {
    let max_seg = max_segment_size(block_align)?;

    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::with_capacity(data.len() / max_seg + 1);
    let mut begin = 0;
    while begin < data.len() {
        let end = usize::min(begin + max_seg, data.len());
        segments.push(data.slice(begin..end));
        begin = end;
    }
    Ok(segments)
}
