//! Audio format descriptor and capture configuration.

use serde::{Deserialize, Serialize};

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// 32-bit float, the shared-mode mix format on most hosts.
    #[default]
    F32,

    /// Unsigned 8-bit integer.
    U8,

    /// Signed 16-bit integer.
    S16,

    /// Signed 24-bit integer, packed in 3 bytes.
    S24,

    /// Signed 32-bit integer.
    S32,
}

impl SampleEncoding {
    /// Bits per sample for this encoding.
    pub fn bits_per_sample(self) -> u16 {
        match self {
            Self::U8 => 8,
            Self::S16 => 16,
            Self::S24 => 24,
            Self::F32 | Self::S32 => 32,
        }
    }

    /// Tag value used in the serialized format descriptor.
    pub fn tag(self) -> u32 {
        match self {
            Self::F32 => 1,
            Self::U8 => 2,
            Self::S16 => 3,
            Self::S24 => 4,
            Self::S32 => 5,
        }
    }
}

/// The effective capture format, fixed once capture starts.
///
/// Clients obtain the serialized form via `get_format` and use
/// [`AudioFormat::block_align`] to reconstruct frame boundaries in the raw
/// datagrams, which carry no header of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample encoding.
    pub encoding: SampleEncoding,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Byte size of one indivisible sample frame (all channels).
    pub fn block_align(&self) -> u16 {
        self.channels * self.encoding.bits_per_sample() / 8
    }

    /// Serialize to the versioned descriptor blob sent to clients.
    ///
    /// Layout, all little-endian u32: version (currently 1), encoding tag,
    /// channel count, sample rate.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&self.encoding.tag().to_le_bytes());
        buf.extend_from_slice(&u32::from(self.channels).to_le_bytes());
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf
    }
}

/// Requested capture parameters.
///
/// `None`/default fields ask the backend for its device defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture endpoint id; `None` selects the default endpoint.
    pub endpoint_id: Option<String>,

    /// Requested sample encoding.
    pub encoding: SampleEncoding,

    /// Requested channel count.
    pub channels: u16,

    /// Requested sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint_id: None,
            encoding: SampleEncoding::F32,
            channels: crate::DEFAULT_CHANNELS,
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
        }
    }
}

/// A capture endpoint as shown to front ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Stable endpoint identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Whether this is the host's default endpoint.
    pub is_default: bool,
}
