//! Broadcast pipeline: capture handoff, segmentation, and UDP fan-out.
//!
//! The capture thread never touches the registry or the socket. Its sink
//! callback posts each buffer onto an unbounded channel; this task, running
//! on the server runtime, segments the buffer and issues one best-effort
//! send per segment per registered peer.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace, warn};

use aircast_protocol::segment;

use crate::server::NetContext;

/// One captured PCM buffer handed across the capture/runtime boundary.
#[derive(Debug)]
pub struct CapturedBuffer {
    /// Raw interleaved PCM bytes.
    pub data: Bytes,

    /// Byte size of one indivisible sample frame.
    pub block_align: u16,
}

pub(crate) async fn broadcast_loop(
    ctx: Arc<NetContext>,
    mut audio_rx: mpsc::UnboundedReceiver<CapturedBuffer>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let buffer = tokio::select! {
            _ = shutdown.changed() => break,
            buffer = audio_rx.recv() => buffer,
        };

        let Some(buffer) = buffer else {
            // The capture collaborator dropped its sender: the audio source
            // is dead. Take the whole server down instead of staying up as
            // a silent zombie.
            error!("Capture source stopped, shutting down server");
            let _ = ctx.shutdown.send(true);
            break;
        };

        if buffer.data.is_empty() {
            continue;
        }

        // No sessions at all: skip segmentation entirely.
        if ctx.registry.is_empty() {
            continue;
        }

        let segments = match segment(&buffer.data, buffer.block_align) {
            Ok(segments) => segments,
            Err(e) => {
                warn!(error = %e, "Dropping unsegmentable capture buffer");
                continue;
            }
        };

        for seg in &segments {
            // Fresh snapshot per segment; a peer registering mid-buffer
            // picks up the remaining segments.
            let targets = ctx.registry.udp_targets();
            for target in &targets {
                // Fire and forget; a failed send must not affect other
                // peers or segments.
                if let Err(e) = ctx.udp.send_to(seg, *target).await {
                    trace!(%target, error = %e, "UDP send failed");
                }
            }
        }
    }

    debug!("Broadcast loop stopped");
}
