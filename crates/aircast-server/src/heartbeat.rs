//! Heartbeat supervision for playing sessions.
//!
//! The probe is server-driven: UDP delivery gives no transport-level
//! liveness signal, and a client that vanished without FIN leaves the TCP
//! half-connection looking healthy, so a pushed heartbeat is the only
//! disconnect detector. One supervisor task runs per playing session.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, trace};

use aircast_protocol::{encode_heartbeat, HEARTBEAT_INTERVAL_SECS, HEARTBEAT_TIMEOUT_SECS};

use crate::control::SharedWriter;
use crate::server::NetContext;
use crate::session::{ConnId, SessionId};

/// Probe the session every 3 seconds; evict it after a missed 5-second
/// liveness window or a failed probe write.
///
/// Terminates silently when the session has already left the registry
/// (membership is checked each cycle, never raw socket state), so a
/// concurrent close by the control task needs no coordination here.
pub(crate) async fn supervise(
    conn_id: ConnId,
    session_id: SessionId,
    ctx: Arc<NetContext>,
    writer: SharedWriter,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);
    let timeout = Duration::from_secs(HEARTBEAT_TIMEOUT_SECS);
    let probe = encode_heartbeat();

    trace!(session_id, "Heartbeat supervisor started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        let stale = match ctx.registry.is_stale(conn_id, timeout) {
            Some(stale) => stale,
            None => {
                trace!(session_id, "Session already gone, supervisor exiting");
                break;
            }
        };

        if stale {
            ctx.registry.evict(conn_id, "heartbeat timeout");
            break;
        }

        if let Err(e) = writer.lock().await.write_all(&probe).await {
            trace!(session_id, error = %e, "Heartbeat write failed");
            ctx.registry.evict(conn_id, "heartbeat write failed");
            break;
        }
    }

    debug!(session_id, "Heartbeat supervisor stopped");
}
