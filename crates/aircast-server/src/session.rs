//! Session bookkeeping for playing peers.
//!
//! The registry maps a control-connection identity to its streaming session.
//! All mutation happens from tasks on the server runtime; the capture thread
//! never touches it. The lock is held only for short synchronous sections,
//! never across an await point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace};

/// Stable identifier for one accepted control connection.
pub type ConnId = u64;

/// Session id as carried on the wire. Positive for live sessions.
pub type SessionId = i32;

/// Server-side state for one client that has requested streaming.
#[derive(Debug)]
pub struct Session {
    /// Wire-visible session id, unique for the server process lifetime.
    pub id: SessionId,

    /// Remote address of the owning control connection.
    pub peer_addr: SocketAddr,

    /// Data-channel endpoint; absent until the client registers over UDP.
    pub udp_endpoint: Option<SocketAddr>,

    /// Last instant this session proved liveness.
    pub last_heartbeat: Instant,

    /// Signalled (with a stored permit) when the session is evicted so the
    /// control task unblocks from its pending read.
    closed: Arc<Notify>,
}

/// Registry of active sessions, keyed by control-connection identity.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnId, Session>>,
    next_conn_id: AtomicU64,
    // Monotonic across start/stop cycles; ids are never reused while the
    // process runs.
    next_session_id: AtomicI32,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            next_session_id: AtomicI32::new(0),
        }
    }

    /// Allocate an identity for a newly accepted control connection.
    pub(crate) fn allocate_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a streaming session for this connection.
    ///
    /// Returns `None` when the connection already has a session; the caller
    /// reports that to the client as an explicit "already playing" reply
    /// rather than tearing the session down.
    pub fn add(&self, conn_id: ConnId, peer_addr: SocketAddr, closed: Arc<Notify>) -> Option<SessionId> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&conn_id) {
            debug!(%peer_addr, "Repeat start_play on playing connection");
            return None;
        }

        let id = self.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        sessions.insert(
            conn_id,
            Session {
                id,
                peer_addr,
                udp_endpoint: None,
                last_heartbeat: Instant::now(),
                closed,
            },
        );
        trace!(id, %peer_addr, "Session added");
        Some(id)
    }

    /// Remove a session and wake its control task.
    ///
    /// Idempotent: removing an already-removed session logs and returns
    /// false. The stored notify permit unblocks a control task parked in its
    /// read loop even if it was mid-command when the eviction happened.
    pub fn evict(&self, conn_id: ConnId, reason: &str) -> bool {
        let session = self.sessions.lock().remove(&conn_id);
        match session {
            Some(session) => {
                info!(id = session.id, peer_addr = %session.peer_addr, reason, "Session evicted");
                session.closed.notify_one();
                true
            }
            None => {
                debug!(conn_id, reason, "Evict on untracked connection");
                false
            }
        }
    }

    /// Refresh a session's liveness timestamp.
    pub fn touch(&self, conn_id: ConnId) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&conn_id) {
            Some(session) => {
                session.last_heartbeat = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Whether this connection currently owns a session.
    pub fn contains(&self, conn_id: ConnId) -> bool {
        self.sessions.lock().contains_key(&conn_id)
    }

    /// Check a session's liveness window.
    ///
    /// Returns `None` when the session no longer exists (the supervisor
    /// terminates silently in that case), otherwise whether the session has
    /// been quiet longer than `timeout`.
    pub fn is_stale(&self, conn_id: ConnId, timeout: Duration) -> Option<bool> {
        let sessions = self.sessions.lock();
        sessions
            .get(&conn_id)
            .map(|session| session.last_heartbeat.elapsed() > timeout)
    }

    /// Record the data-channel endpoint a client registered over UDP.
    ///
    /// Lookup is by wire session id. Re-registration overwrites the stored
    /// endpoint (last write wins, e.g. after NAT rebinding). A stale or
    /// bogus id is logged and ignored.
    pub fn set_udp_endpoint(&self, id: SessionId, endpoint: SocketAddr) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.values_mut().find(|s| s.id == id) {
            Some(session) => {
                trace!(id, peer_addr = %session.peer_addr, %endpoint, "UDP endpoint registered");
                session.udp_endpoint = Some(endpoint);
                true
            }
            None => {
                error!(id, %endpoint, "UDP registration for unknown session");
                false
            }
        }
    }

    /// Snapshot of the data-channel endpoints eligible for broadcast.
    ///
    /// Sessions that have not registered a UDP endpoint yet are skipped.
    pub fn udp_targets(&self) -> Vec<SocketAddr> {
        self.sessions
            .lock()
            .values()
            .filter_map(|s| s.udp_endpoint)
            .collect()
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are active.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Drop all sessions, waking their control tasks.
    pub fn clear(&self) {
        let mut sessions = self.sessions.lock();
        for session in sessions.values() {
            session.closed.notify_one();
        }
        sessions.clear();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
