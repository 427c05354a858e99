//! Server lifecycle controller.
//!
//! One running server owns a current-thread tokio runtime on a dedicated
//! network thread; every socket operation happens on that runtime. The
//! capture collaborator runs on its own thread and reaches the runtime only
//! through the broadcast channel.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument};

use aircast_capture::{CaptureBackend, CaptureConfig};
use aircast_protocol::encode_format_response;

use crate::broadcast::{self, CapturedBuffer};
use crate::control;
use crate::data;
use crate::session::SessionRegistry;
use crate::{ServerError, ServerResult};

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not running.
    Stopped,

    /// Binding sockets and starting capture.
    Starting,

    /// Accepting clients and broadcasting.
    Running,

    /// Tearing down.
    Stopping,
}

impl ServerState {
    /// Simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }
}

/// Shared context for the network tasks of one server run.
pub(crate) struct NetContext {
    /// Active sessions. Shared with the owning [`Server`] so session ids
    /// stay monotonic across start/stop cycles.
    pub registry: Arc<SessionRegistry>,

    /// Pre-encoded `get_format` reply; the format is immutable once capture
    /// has started.
    pub format_response: Bytes,

    /// The single data-channel socket, shared by the registration loop and
    /// all broadcast sends.
    pub udp: Arc<UdpSocket>,

    /// Lets tasks take the whole server down (dead capture source).
    pub shutdown: watch::Sender<bool>,
}

/// The aircast streaming server.
///
/// Host-facing surface consumed by front ends: [`Server::start`],
/// [`Server::stop`], [`Server::wait`], plus [`crate::local_addresses`] for
/// picking a bind address.
pub struct Server {
    capture: Mutex<Box<dyn CaptureBackend>>,
    registry: Arc<SessionRegistry>,
    state: Mutex<ServerState>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    net_thread: Mutex<Option<JoinHandle<()>>>,
    bound: Mutex<Option<(SocketAddr, SocketAddr)>>,
}

impl Server {
    /// Create a stopped server around a capture backend.
    pub fn new(capture: Box<dyn CaptureBackend>) -> Self {
        Self {
            capture: Mutex::new(capture),
            registry: Arc::new(SessionRegistry::new()),
            state: Mutex::new(ServerState::Stopped),
            shutdown: Mutex::new(None),
            net_thread: Mutex::new(None),
            bound: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Actual bound (control, data) addresses while running. Useful when
    /// binding to port 0.
    pub fn local_endpoints(&self) -> Option<(SocketAddr, SocketAddr)> {
        *self.bound.lock()
    }

    /// Number of playing sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Bind both channels on `host:port`, start capture, and spawn the
    /// network loops.
    ///
    /// Fails atomically: on any bind or capture error every resource
    /// acquired so far is released and the server is left `Stopped`.
    /// Calling `start` while not stopped is a caller error.
    #[instrument(name = "server_start", skip(self, capture_config))]
    pub fn start(&self, host: &str, port: u16, capture_config: &CaptureConfig) -> ServerResult<()> {
        {
            let mut state = self.state.lock();
            if *state != ServerState::Stopped {
                return Err(ServerError::AlreadyRunning);
            }
            *state = ServerState::Starting;
        }

        match self.start_inner(host, port, capture_config) {
            Ok(()) => {
                *self.state.lock() = ServerState::Running;
                info!("Server started");
                Ok(())
            }
            Err(e) => {
                // Partial resources were dropped on the error path; make
                // sure capture is not left running.
                self.finalize();
                Err(e)
            }
        }
    }

    fn start_inner(&self, host: &str, port: u16, capture_config: &CaptureConfig) -> ServerResult<()> {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(host.to_string()))?;
        let addr = SocketAddr::new(ip, port);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // Bind both channels up front so a taken port fails the whole start.
        let (listener, udp) = runtime.block_on(async {
            let listener = TcpListener::bind(addr).await?;
            let udp = UdpSocket::bind(addr).await?;
            Ok::<_, std::io::Error>((listener, udp))
        })?;
        let control_addr = listener.local_addr()?;
        let data_addr = udp.local_addr()?;
        info!(%control_addr, "tcp listen success");
        info!(%data_addr, "udp listen success");

        let (audio_tx, audio_rx) = mpsc::unbounded_channel::<CapturedBuffer>();

        // The sink runs on the capture thread; it only posts the buffer
        // across into the runtime and returns.
        let format = self.capture.lock().start(
            capture_config,
            Box::new(move |data, block_align| {
                let _ = audio_tx.send(CapturedBuffer { data, block_align });
            }),
        )?;
        info!(?format, "Capture started");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = Arc::new(NetContext {
            registry: Arc::clone(&self.registry),
            format_response: encode_format_response(&format.to_bytes()),
            udp: Arc::new(udp),
            shutdown: shutdown_tx.clone(),
        });

        let net_thread = thread::Builder::new()
            .name("aircast-net".into())
            .spawn(move || {
                runtime.block_on(async {
                    let accept = tokio::spawn(control::accept_loop(
                        listener,
                        Arc::clone(&ctx),
                        shutdown_rx.clone(),
                    ));
                    let registration = tokio::spawn(data::registration_loop(
                        Arc::clone(&ctx),
                        shutdown_rx.clone(),
                    ));
                    let broadcast = tokio::spawn(broadcast::broadcast_loop(
                        Arc::clone(&ctx),
                        audio_rx,
                        shutdown_rx,
                    ));
                    let _ = tokio::join!(accept, registration, broadcast);
                });
                // Dropping the runtime here cancels any remaining
                // per-connection and heartbeat tasks, closing their sockets.
                debug!("Network thread exiting");
            })?;

        *self.shutdown.lock() = Some(shutdown_tx);
        *self.net_thread.lock() = Some(net_thread);
        *self.bound.lock() = Some((control_addr, data_addr));
        Ok(())
    }

    /// Stop the server: signal all loops, join the network thread, stop
    /// capture, and clear the registry. Idempotent when already stopped,
    /// and returns only once teardown is complete, even when a concurrent
    /// [`Server::wait`] owns the thread join.
    #[instrument(name = "server_stop", skip(self))]
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                ServerState::Stopped => {
                    debug!("Server already stopped");
                    return;
                }
                ServerState::Stopping => {
                    drop(state);
                    self.wait_until_stopped();
                    return;
                }
                _ => *state = ServerState::Stopping,
            }
        }

        info!("Stopping server");

        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(true);
        }

        match self.net_thread.lock().take() {
            Some(handle) => {
                let _ = handle.join();
                self.finalize();
                info!("Server stopped");
            }
            // A concurrent wait() owns the join and finalizes teardown.
            None => self.wait_until_stopped(),
        }
    }

    /// Block until the server reaches `Stopped`, via [`Server::stop`] from
    /// another control surface or a fatal capture failure.
    ///
    /// Whoever takes the network thread handle joins it and then performs
    /// the teardown, so a capture source dying on its own also lands the
    /// server in `Stopped` with capture halted and the registry empty.
    pub fn wait(&self) {
        let handle = self.net_thread.lock().take();
        match handle {
            Some(handle) => {
                let _ = handle.join();
                {
                    let mut state = self.state.lock();
                    if matches!(*state, ServerState::Starting | ServerState::Running) {
                        // No stop() was issued: the net thread exited on
                        // its own after the broadcast task lost its
                        // capture source. Finish the stop here.
                        info!("Network thread exited, completing shutdown");
                        *state = ServerState::Stopping;
                    }
                }
                self.finalize();
                info!("Server stopped");
            }
            None => self.wait_until_stopped(),
        }
    }

    /// Release everything a run holds and mark the server `Stopped`.
    /// Runs at most once per run: from the failed-start path, or from the
    /// single caller that joined the network thread.
    fn finalize(&self) {
        self.capture.lock().stop();
        self.registry.clear();
        *self.shutdown.lock() = None;
        *self.bound.lock() = None;
        *self.state.lock() = ServerState::Stopped;
    }

    fn wait_until_stopped(&self) {
        while *self.state.lock() != ServerState::Stopped {
            thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_capture::ToneCapture;

    #[test]
    fn test_state_names() {
        assert_eq!(ServerState::Stopped.name(), "Stopped");
        assert_eq!(ServerState::Running.name(), "Running");
    }

    #[test]
    fn test_invalid_host_rejected() {
        let server = Server::new(Box::new(ToneCapture::new()));
        let err = server.start("not-a-host", 0, &CaptureConfig::default());
        assert!(matches!(err, Err(ServerError::InvalidAddress(_))));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let server = Server::new(Box::new(ToneCapture::new()));
        server.start("127.0.0.1", 0, &CaptureConfig::default()).unwrap();
        let err = server.start("127.0.0.1", 0, &CaptureConfig::default());
        assert!(matches!(err, Err(ServerError::AlreadyRunning)));
        server.stop();
    }

    #[test]
    fn test_failed_start_releases_everything() {
        // Hold a TCP port so the bind fails, then confirm a later start on a
        // free port succeeds on the same server.
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = blocker.local_addr().unwrap();

        let server = Server::new(Box::new(ToneCapture::new()));
        let err = server.start("127.0.0.1", taken.port(), &CaptureConfig::default());
        assert!(matches!(err, Err(ServerError::Io(_))));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_endpoints().is_none());

        server.start("127.0.0.1", 0, &CaptureConfig::default()).unwrap();
        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn test_stop_idempotent() {
        let server = Server::new(Box::new(ToneCapture::new()));
        server.stop();
        server.start("127.0.0.1", 0, &CaptureConfig::default()).unwrap();
        server.stop();
        server.stop();
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
