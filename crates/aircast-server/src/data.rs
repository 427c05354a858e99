//! Data-channel registration: the UDP receive loop.
//!
//! Registration is one-shot and fire-and-forget. A client sends its session
//! id as a 4-byte datagram; the source address becomes that session's data
//! endpoint. No acknowledgment is sent, and a re-sent registration simply
//! overwrites the stored endpoint.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use aircast_protocol::decode_registration;

use crate::server::NetContext;

pub(crate) async fn registration_loop(ctx: Arc<NetContext>, mut shutdown: watch::Receiver<bool>) {
    // Registration datagrams are 4 bytes; anything longer is truncated and
    // the tail ignored.
    let mut buf = [0u8; 16];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = ctx.udp.recv_from(&mut buf) => {
                match received {
                    Ok((len, source)) => match decode_registration(&buf[..len]) {
                        Ok(id) => {
                            // Unknown ids are logged inside the registry.
                            ctx.registry.set_udp_endpoint(id, source);
                        }
                        Err(e) => {
                            warn!(%source, error = %e, "Malformed registration datagram");
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "UDP receive failed");
                        break;
                    }
                }
            }
        }
    }

    debug!("UDP registration loop stopped");
}
