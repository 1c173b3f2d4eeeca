//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track each proxied exchange through its states
//! - Pin every exchange to exactly one backend
//! - Count in-flight exchanges so shutdown can drain them

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::backend::BackendTarget;
use crate::net::listener::ConnectionPermit;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-exchange state.
///
/// ```text
/// Routing → Connecting → PlainProxy ───────────────→ Closed
///                      → Upgrading → Upgraded ──────→ Closed
/// ```
/// Any state may jump to `Closed`. Nothing re-enters `Routing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Routing,
    Connecting,
    PlainProxy,
    Upgrading,
    Upgraded,
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal edge.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Routing, Connecting)
                | (Connecting, PlainProxy)
                | (Connecting, Upgrading)
                | (Upgrading, Upgraded)
                | (Routing | Connecting | PlainProxy | Upgrading | Upgraded, Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Routing => "routing",
            ConnectionState::Connecting => "connecting",
            ConnectionState::PlainProxy => "plain_proxy",
            ConnectionState::Upgrading => "upgrading",
            ConnectionState::Upgraded => "upgraded",
            ConnectionState::Closed => "closed",
        }
    }
}

/// State shared by all exchanges on one accepted client connection.
#[derive(Debug)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    next_seq: AtomicU64,
    /// Held until the last exchange (including a spliced tunnel) ends.
    _permit: Option<ConnectionPermit>,
}

impl ConnectionContext {
    pub fn new(peer: SocketAddr, permit: Option<ConnectionPermit>) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            next_seq: AtomicU64::new(1),
            _permit: permit,
        }
    }

    /// Sequence number of the next request on this connection.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Tracks in-flight exchanges for graceful shutdown.
///
/// Uses a watch channel so waiters wake as soon as the count hits zero.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            active: Arc::new(tx),
        }
    }

    /// Record a new exchange. Returns a guard that decrements on drop.
    pub fn track(&self) -> TrackerGuard {
        self.active.send_modify(|n| *n += 1);
        metrics::connection_opened();
        TrackerGuard {
            active: Arc::clone(&self.active),
        }
    }

    /// Current in-flight exchange count.
    pub fn active_count(&self) -> u64 {
        *self.active.borrow()
    }

    /// Wait until nothing is in flight or `grace` elapses.
    /// Returns the number of exchanges still running.
    pub async fn drain(&self, grace: Duration) -> u64 {
        let mut rx = self.active.subscribe();
        let _ = tokio::time::timeout(grace, rx.wait_for(|n| *n == 0)).await;
        self.active_count()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the tracker count when dropped.
#[derive(Debug)]
pub struct TrackerGuard {
    active: Arc<watch::Sender<u64>>,
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        self.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::connection_closed();
    }
}

/// One proxied exchange: a plain request/response, or an upgrade and the
/// tunnel that follows it.
#[derive(Debug)]
pub struct InFlightConnection {
    context: Arc<ConnectionContext>,
    seq: u64,
    backend: Arc<BackendTarget>,
    state: ConnectionState,
    opened: Instant,
    _guard: TrackerGuard,
}

impl InFlightConnection {
    /// Start an exchange in `Routing`, already bound to its backend.
    pub fn new(
        context: Arc<ConnectionContext>,
        backend: Arc<BackendTarget>,
        tracker: &ConnectionTracker,
    ) -> Self {
        let seq = context.next_seq();
        Self {
            context,
            seq,
            backend,
            state: ConnectionState::Routing,
            opened: Instant::now(),
            _guard: tracker.track(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.context.id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn peer(&self) -> SocketAddr {
        self.context.peer
    }

    pub fn backend(&self) -> &Arc<BackendTarget> {
        &self.backend
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.opened.elapsed()
    }

    /// Move to `next`. Illegal edges are logged and ignored.
    pub fn transition(&mut self, next: ConnectionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self,
                from = self.state.as_str(),
                to = next.as_str(),
                "Ignoring illegal state transition"
            );
            return;
        }
        tracing::trace!(
            connection_id = %self,
            from = self.state.as_str(),
            to = next.as_str(),
            "State transition"
        );
        self.state = next;
    }
}

impl fmt::Display for InFlightConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context.id, self.seq)
    }
}

impl Drop for InFlightConnection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            self.transition(ConnectionState::Closed);
        }
        tracing::trace!(
            connection_id = %self,
            backend = %self.backend.name,
            duration_ms = self.opened.elapsed().as_millis() as u64,
            "Exchange closed"
        );
    }
}
