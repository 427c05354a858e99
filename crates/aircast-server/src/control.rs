//! Control-channel handling: the TCP accept loop and the per-connection
//! command loop.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, trace, warn};

use aircast_protocol::{encode_start_play_response, Command, TAG_SIZE};

use crate::heartbeat;
use crate::server::NetContext;
use crate::session::ConnId;

/// Write half of a control connection, shared between the command loop and
/// the heartbeat supervisor. Replies are single contiguous buffers, so
/// holding the lock per write keeps logical writes from interleaving.
pub(crate) type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// Accept control connections until shutdown, one task per connection.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    ctx: Arc<NetContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        info!(%peer_addr, "Accepted control connection");
                        // Command replies are small; don't let Nagle sit on them.
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer_addr, error = %e, "set_nodelay failed");
                        }
                        tokio::spawn(connection_loop(
                            stream,
                            peer_addr,
                            Arc::clone(&ctx),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        break;
                    }
                }
            }
        }
    }
    debug!("Accept loop stopped");
}

/// Read/react loop for one control connection.
///
/// Any transport error, protocol violation, or eviction (by the heartbeat
/// supervisor or server shutdown) ends the loop; dropping the socket halves
/// closes the connection.
async fn connection_loop(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<NetContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let conn_id = ctx.registry.allocate_conn_id();
    let (mut reader, writer) = stream.into_split();
    let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(writer));
    let closed = Arc::new(Notify::new());

    loop {
        let mut tag_buf = [0u8; TAG_SIZE];
        tokio::select! {
            _ = closed.notified() => {
                trace!(%peer_addr, "Control loop woken by eviction");
                break;
            }
            _ = shutdown.changed() => break,
            read = reader.read_exact(&mut tag_buf) => {
                if let Err(e) = read {
                    trace!(%peer_addr, error = %e, "Control read ended");
                    break;
                }
                let tag = u32::from_le_bytes(tag_buf);
                let proceed = match Command::try_from(tag) {
                    Ok(Command::GetFormat) => {
                        handle_get_format(&ctx, &writer, peer_addr).await
                    }
                    Ok(Command::StartPlay) => {
                        handle_start_play(&ctx, conn_id, peer_addr, &writer, &closed, &shutdown)
                            .await
                    }
                    Ok(Command::Heartbeat) => {
                        ctx.registry.touch(conn_id);
                        true
                    }
                    Ok(Command::None) | Err(_) => {
                        error!(%peer_addr, tag, "Invalid command");
                        false
                    }
                };
                if !proceed {
                    break;
                }
            }
        }
    }

    ctx.registry.evict(conn_id, "connection closed");
    let _ = writer.lock().await.shutdown().await;
    debug!(%peer_addr, "Control connection closed");
}

async fn handle_get_format(ctx: &NetContext, writer: &SharedWriter, peer_addr: SocketAddr) -> bool {
    trace!(%peer_addr, "get_format");
    write_reply(writer, &ctx.format_response).await
}

async fn handle_start_play(
    ctx: &Arc<NetContext>,
    conn_id: ConnId,
    peer_addr: SocketAddr,
    writer: &SharedWriter,
    closed: &Arc<Notify>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    match ctx.registry.add(conn_id, peer_addr, Arc::clone(closed)) {
        Some(id) => {
            trace!(%peer_addr, id, "start_play");
            if !write_reply(writer, &encode_start_play_response(id)).await {
                return false;
            }
            tokio::spawn(heartbeat::supervise(
                conn_id,
                id,
                Arc::clone(ctx),
                Arc::clone(writer),
                shutdown.clone(),
            ));
            true
        }
        None => {
            // Explicit "already playing" reply; the existing session is
            // left untouched.
            warn!(%peer_addr, "start_play on already playing connection");
            write_reply(writer, &encode_start_play_response(0)).await
        }
    }
}

/// Write one logical reply. Returns false on failure, which the caller
/// treats exactly like a read failure.
async fn write_reply(writer: &SharedWriter, reply: &Bytes) -> bool {
    if let Err(e) = writer.lock().await.write_all(reply).await {
        trace!(error = %e, "Control write failed");
        return false;
    }
    true
}
