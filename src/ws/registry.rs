//! Connection registry: the authoritative set of live WebSocket connections.
//!
//! Every accepted transport gets one entry, keyed by an opaque id that is
//! never exposed to other clients. Entries are inert until the client sends
//! its auth message; from then on they carry an identity (user email) and a
//! subscription scope used by the broadcast router.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};

/// Opaque registry key for one live connection.
pub type ConnectionId = u64;

/// Sender half of a connection's outbound channel. The writer task on the
/// other end owns the WebSocket sink, so pushing here never blocks delivery
/// to other connections.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Resolves when the registry evicts the connection (or removes its entry),
/// so the connection task can stop waiting on a transport that will never
/// speak again. Held by the connection's reader loop.
pub type CancelSignal = watch::Receiver<bool>;

/// Close code sent when the liveness monitor evicts a dead transport.
const CLOSE_LIVENESS_TIMEOUT: u16 = 1001;

/// Subscription scope of a connection. Modeled as an explicit tagged value
/// so "no project" and "the global room" cannot be confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Authenticated but not subscribed to any room (e.g. invitations page).
    None,
    /// The cross-project global chat room.
    Global,
    /// A specific project.
    Project(i64),
}

/// State tracked per live connection.
struct Connection {
    sender: ConnectionSender,
    /// Signalled on eviction so the connection task tears the transport down.
    cancel: watch::Sender<bool>,
    /// Cleared by each liveness probe, set again by the next pong.
    alive: bool,
    scope: Scope,
    /// Email of the authenticated user; None until the auth message arrives.
    identity: Option<String>,
}

impl Connection {
    fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Thread-safe registry of live connections. All mutation and iteration goes
/// through the inner DashMap; broadcast passes tolerate entries removed
/// mid-iteration.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a new inert connection. Returns its registry key and the signal
    /// the connection task must watch to learn about its own eviction.
    pub fn register(&self, sender: ConnectionSender) -> (ConnectionId, CancelSignal) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.connections.insert(
            id,
            Connection {
                sender,
                cancel: cancel_tx,
                alive: true,
                scope: Scope::None,
                identity: None,
            },
        );
        tracing::debug!(connection_id = id, total = self.connections.len(), "Connection registered");
        (id, cancel_rx)
    }

    /// Set identity and scope for a connection. Idempotent: calling again
    /// switches the scope in place (user navigated to another project)
    /// without creating a new entry. Unknown ids are a no-op — a race with
    /// eviction is expected, not exceptional.
    pub fn authenticate(&self, id: ConnectionId, identity: &str, scope: Scope) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.identity = Some(identity.to_string());
            entry.scope = scope;
            tracing::debug!(connection_id = id, identity, ?scope, "Connection authenticated");
        }
    }

    /// Mark a connection live again after its pong was observed.
    pub fn mark_alive(&self, id: ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.alive = true;
        }
    }

    /// Remove an entry. Safe to call multiple times; no-op if already gone.
    pub fn unregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!(connection_id = id, total = self.connections.len(), "Connection unregistered");
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// One liveness pass: evict entries whose probe went unanswered, then
    /// clear the flag on the rest and send a fresh probe. A silently-dead
    /// transport is gone within two passes. Returns the number evicted.
    ///
    /// Eviction must terminate the transport, not just forget it: a
    /// half-open peer never completes the close handshake, so the cancel
    /// signal is what actually unparks the connection task and frees the
    /// socket.
    pub fn sweep(&self) -> usize {
        let mut stale = Vec::new();
        for mut entry in self.connections.iter_mut() {
            let id = *entry.key();
            let conn = entry.value_mut();
            if !conn.alive {
                stale.push(id);
            } else {
                conn.alive = false;
                if conn.sender.send(Message::Ping(Vec::new().into())).is_err() {
                    // Writer task already gone — treat like a failed probe.
                    stale.push(id);
                }
            }
        }
        for id in &stale {
            if let Some((_, conn)) = self.connections.remove(id) {
                let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_LIVENESS_TIMEOUT,
                    reason: "liveness timeout".into(),
                })));
                let _ = conn.cancel.send(true);
                tracing::info!(connection_id = id, "Evicted dead connection");
            }
        }
        stale.len()
    }

    /// Deliver to every authenticated connection subscribed to a project.
    pub fn send_to_project(&self, project_id: i64, msg: &Message) -> usize {
        self.send_where(msg, |c| {
            c.is_authenticated() && c.scope == Scope::Project(project_id)
        })
    }

    /// Deliver to every connection held by a user, regardless of scope.
    pub fn send_to_user(&self, email: &str, msg: &Message) -> usize {
        self.send_where(msg, |c| c.identity.as_deref() == Some(email))
    }

    /// Deliver to every connection subscribed to the global room.
    pub fn send_to_global(&self, msg: &Message) -> usize {
        self.send_where(msg, |c| c.is_authenticated() && c.scope == Scope::Global)
    }

    /// Best-effort fan-out: a send failure means the connection is mid-close
    /// and is skipped, never retried or escalated.
    fn send_where<F>(&self, msg: &Message, predicate: F) -> usize
    where
        F: Fn(&Connection) -> bool,
    {
        let mut delivered = 0;
        for entry in self.connections.iter() {
            let conn = entry.value();
            if predicate(conn) && conn.sender.send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
