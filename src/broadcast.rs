//! Event fan-out to connected clients.
//!
//! Three addressable scopes: the subscribers of one session (whoever joined
//! it), the staff lobby (every privileged-kind connection, for notices like
//! "a session started"), and a single connection (directed signals like
//! mute directives).
//!
//! Delivery is fire-and-forget: events are queued with `try_send` and a
//! full or closed queue drops the event for that recipient only. A
//! disconnected recipient simply misses the notification; its own grace
//! handling covers the absence.

use dashmap::DashMap;
use huddle_proto::{CallerKind, ServerEvent};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::metrics;

/// Transient identifier of one physical connection.
pub type ConnectionId = Uuid;

/// Fan-out hub owning the per-connection event queues.
pub struct Broadcaster {
    /// Connection id -> event queue for routing.
    senders: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    /// Privileged-kind connections subscribed to lobby notices.
    lobby: DashMap<ConnectionId, CallerKind>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            senders: DashMap::new(),
            lobby: DashMap::new(),
        }
    }

    /// Register a connection's event queue for routing.
    ///
    /// Staff and manager connections also join the lobby scope.
    pub fn register(&self, conn: ConnectionId, kind: CallerKind, sender: mpsc::Sender<ServerEvent>) {
        self.senders.insert(conn, sender);
        if kind.is_privileged() {
            self.lobby.insert(conn, kind);
        }
    }

    /// Remove a connection from all scopes.
    pub fn unregister(&self, conn: &ConnectionId) {
        self.senders.remove(conn);
        self.lobby.remove(conn);
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Queue an event for a single connection. Returns whether it was
    /// queued.
    pub fn send_to(&self, conn: &ConnectionId, event: ServerEvent) -> bool {
        match self.senders.get(conn) {
            Some(sender) => match sender.try_send(event) {
                Ok(()) => true,
                Err(e) => {
                    debug!(connection = %conn, error = %e, "Dropped outbound event");
                    metrics::record_event_dropped();
                    false
                }
            },
            None => false,
        }
    }

    /// Fan an event out to a set of connections (a session's subscribers).
    pub fn send_to_all<I>(&self, conns: I, event: &ServerEvent)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let mut recipients = 0;
        for conn in conns {
            if self.send_to(&conn, event.clone()) {
                recipients += 1;
            }
        }
        metrics::record_fanout(recipients);
    }

    /// Fan an event out to every lobby-scope connection.
    pub fn send_to_lobby(&self, event: &ServerEvent) {
        self.send_to_all(self.lobby_connections(), event);
    }

    /// Connections currently in the lobby scope.
    pub fn lobby_connections(&self) -> Vec<ConnectionId> {
        self.lobby.iter().map(|e| *e.key()).collect()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ServerEvent {
        ServerEvent::HandLowered { identity: "u-1".into() }
    }

    #[tokio::test]
    async fn directed_send_reaches_only_the_target() {
        let hub = Broadcaster::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        hub.register(a, CallerKind::Guest, tx_a);
        hub.register(b, CallerKind::Guest, tx_b);

        assert!(hub.send_to(&a, event()));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn lobby_scope_covers_privileged_kinds_only() {
        let hub = Broadcaster::new();
        let (tx_staff, mut rx_staff) = mpsc::channel(4);
        let (tx_guest, mut rx_guest) = mpsc::channel(4);
        hub.register(Uuid::new_v4(), CallerKind::Staff, tx_staff);
        hub.register(Uuid::new_v4(), CallerKind::Guest, tx_guest);

        hub.send_to_lobby(&event());
        assert!(rx_staff.try_recv().is_ok());
        assert!(rx_guest.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = Broadcaster::new();
        let (tx, mut rx) = mpsc::channel(1);
        let conn = Uuid::new_v4();
        hub.register(conn, CallerKind::Guest, tx);

        assert!(hub.send_to(&conn, event()));
        // queue of one is now full; the next send is dropped, not awaited
        assert!(!hub.send_to(&conn, event()));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_removes_all_scopes() {
        let hub = Broadcaster::new();
        let (tx, _rx) = mpsc::channel(4);
        let conn = Uuid::new_v4();
        hub.register(conn, CallerKind::Manager, tx);
        assert_eq!(hub.connection_count(), 1);

        hub.unregister(&conn);
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.send_to(&conn, event()));
    }
}
