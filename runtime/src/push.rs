//! Push hub: the registry of open push channels.
//!
//! One live connection per `(resource, client)` pair. A newer connection
//! replaces the older one; dropping the old sender ends the old receiver, so
//! the superseded transport task winds down on its own.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use ticket_queue_core::protocol::ServerEvent;
use ticket_queue_core::types::{ClientId, ResourceId};
use tokio::sync::mpsc;

/// Identifies one registration, so a stale transport cannot unregister its
/// replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// A registered push channel
#[derive(Debug)]
pub struct Subscription {
    /// Registration ID, needed to unregister
    pub id: ConnectionId,
    /// Events for this client, in the order the queue produced them
    pub receiver: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Registry of push channels, shared between the manager and transports
#[derive(Debug, Clone, Default)]
pub struct PushHub {
    connections: Arc<DashMap<(ResourceId, ClientId), Connection>>,
    next_id: Arc<AtomicU64>,
}

impl PushHub {
    /// Creates an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for `(resource_id, client_id)`, replacing any older one
    #[must_use]
    pub fn connect(&self, resource_id: ResourceId, client_id: ClientId) -> Subscription {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();

        if let Some(old) = self
            .connections
            .insert((resource_id, client_id), Connection { id, sender })
        {
            tracing::debug!(
                resource_id = %resource_id,
                client_id = %client_id,
                replaced = old.id.0,
                "Push channel replaced by newer connection"
            );
        }

        Subscription { id, receiver }
    }

    /// Unregister, but only if `id` is still the current registration.
    ///
    /// Returns whether anything was removed.
    pub fn disconnect(&self, resource_id: ResourceId, client_id: ClientId, id: ConnectionId) -> bool {
        self.connections
            .remove_if(&(resource_id, client_id), |_, connection| connection.id == id)
            .is_some()
    }

    /// Deliver an event without blocking.
    ///
    /// Returns `false` if the client has no open channel; the event is dropped
    /// and the client re-syncs from the current view when it reconnects.
    pub fn send(&self, resource_id: ResourceId, client_id: ClientId, event: ServerEvent) -> bool {
        let Some(connection) = self.connections.get(&(resource_id, client_id)) else {
            return false;
        };
        connection.sender.send(event).is_ok()
    }

    /// Whether a channel is registered for the pair
    #[must_use]
    pub fn is_connected(&self, resource_id: ResourceId, client_id: ClientId) -> bool {
        self.connections.contains_key(&(resource_id, client_id))
    }

    /// Number of registered channels
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_subscriber_in_order() {
        let hub = PushHub::new();
        let (resource, client) = (ResourceId::new(), ClientId::new());
        let mut sub = hub.connect(resource, client);

        assert!(hub.send(resource, client, ServerEvent::dequeued(1)));
        assert!(hub.send(resource, client, ServerEvent::OptedOut));

        assert_eq!(sub.receiver.recv().await, Some(ServerEvent::dequeued(1)));
        assert_eq!(sub.receiver.recv().await, Some(ServerEvent::OptedOut));
    }

    #[tokio::test]
    async fn test_newer_connection_replaces_older() {
        let hub = PushHub::new();
        let (resource, client) = (ResourceId::new(), ClientId::new());
        let mut old = hub.connect(resource, client);
        let new = hub.connect(resource, client);

        // The old receiver is closed once its sender is dropped
        assert_eq!(old.receiver.recv().await, None);

        // A stale transport cannot unregister its replacement
        assert!(!hub.disconnect(resource, client, old.id));
        assert!(hub.is_connected(resource, client));
        assert!(hub.disconnect(resource, client, new.id));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_send_without_connection() {
        let hub = PushHub::new();
        assert!(!hub.send(ResourceId::new(), ClientId::new(), ServerEvent::OptedOut));
    }
}
