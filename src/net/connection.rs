//! Connection identity, state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Hand out session ids for log correlation
//! - Name the states a proxied connection moves through
//! - Count live sessions so shutdown can wait for them to drain

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identifies one client session in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next id. Ids are unique within the process.
    pub fn new() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Where a proxied connection is in its lifecycle.
///
/// ```text
/// Connecting → RelayingRequest → AwaitingResponse → Tampering → Sent → Closed
///      └──────────────┴──────────────────┴──────────────────────────────→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the upstream connection.
    Connecting,
    /// Client bytes are being relayed; the request head is not complete yet.
    RelayingRequest,
    /// Request complete; buffering the upstream response.
    AwaitingResponse,
    /// Response complete; filters are running.
    Tampering,
    /// Tampered response written to the client.
    Sent,
    /// Both sides released.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::RelayingRequest => "relaying_request",
            ConnectionState::AwaitingResponse => "awaiting_response",
            ConnectionState::Tampering => "tampering",
            ConnectionState::Sent => "sent",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct Live {
    sessions: AtomicU64,
    drained: Notify,
}

/// Counts live sessions; cloned handles share the count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<Live>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session from `peer`. It stays live until the guard drops.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        self.live.sessions.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::new(),
            peer,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.sessions.load(Ordering::Acquire)
    }

    /// Resolve once no session is live.
    pub async fn wait_for_drain(&self) {
        loop {
            let drained = self.live.drained.notified();
            if self.active_count() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Keeps one session counted while it exists.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<Live>,
    id: ConnectionId,
    peer: SocketAddr,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.live.sessions.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.live.drained.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, peer_addr = %self.peer, "Session released");
    }
}
