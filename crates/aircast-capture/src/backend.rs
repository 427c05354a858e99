//! The capture backend trait.

use bytes::Bytes;

use crate::format::{AudioFormat, CaptureConfig, EndpointInfo};
use crate::CaptureResult;

/// Callback receiving captured PCM buffers.
///
/// Invoked from the backend's capture thread with the raw buffer and its
/// block align. The callback must not block; the consumer is expected to
/// hand the buffer off to its own execution context.
pub type AudioSink = Box<dyn FnMut(Bytes, u16) + Send>;

/// A loopback audio capture backend.
///
/// One backend drives one capture session at a time. `start` returns the
/// effective format (which may differ from the requested config when the
/// device imposes its own) and begins delivering buffers through the sink
/// until `stop` joins the capture thread.
pub trait CaptureBackend: Send {
    /// Begin capturing with the requested configuration.
    fn start(&mut self, config: &CaptureConfig, sink: AudioSink) -> CaptureResult<AudioFormat>;

    /// Stop capturing and join the capture thread. Idempotent.
    fn stop(&mut self);

    /// Enumerate capture endpoints for front ends.
    fn list_endpoints(&self) -> CaptureResult<Vec<EndpointInfo>>;

    /// Id of the host's default capture endpoint.
    fn default_endpoint_id(&self) -> CaptureResult<String>;
}
