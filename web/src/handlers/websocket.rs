//! Push channel: one WebSocket per (ticket, client).
//!
//! ```text
//! Client            WebSocket Handler              QueueManager / PushHub
//!   │                      │                                │
//!   ├─ Upgrade ───────────>│                                │
//!   │                      ├─ hub.connect() ───────────────>│
//!   │                      ├─ client_connected() ──────────>│
//!   │<─ position_update ───┤<── current view ───────────────┤
//!   │                      │                                │
//!   ├─ {"type":"join"} ───>├─ join() ──────────────────────>│
//!   │<─ turn_granted ──────┤<── push ───────────────────────┤
//!   │                      │                                │
//!   ├─ Close ─────────────>├─ hub.disconnect()              │
//!   │                      ├─ client_disconnected() ───────>│  (grace starts)
//! ```
//!
//! # Message Protocol
//!
//! **Client → Server:** `{"type":"join"}`, `{"type":"leave"}`
//!
//! **Server → Client:** `position_update`, `turn_granted`, `resource_gone`,
//! `opted_out`, `error`. Keep-alive uses WebSocket ping frames.
//!
//! # Connection Limits
//!
//! - At most `WS_MAX_CONNECTIONS` concurrent channels per instance (503 beyond)
//! - Closed after `WS_IDLE_TIMEOUT_SECONDS` without any inbound frame
//! - A newer channel for the same (ticket, client) replaces the older one

#![allow(clippy::cognitive_complexity)] // WebSocket event loops are naturally complex

use crate::error::AppError;
use crate::extractors::ClientIdentity;
use crate::state::AppState;
use axum::{
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{
    SinkExt,
    stream::{SplitSink, StreamExt},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use ticket_queue_core::protocol::{ClientMessage, ServerEvent};
use ticket_queue_core::types::{ClientId, ResourceId};
use ticket_queue_runtime::Subscription;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Sender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Open the push channel for a ticket.
///
/// The ticket must exist; the client does not need to have joined yet.
///
/// # Errors
///
/// 404 for unknown tickets, 400 without a client identity.
pub async fn push_channel(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    ClientIdentity(client_id): ClientIdentity,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let resource_id = ResourceId::from_uuid(id);

    let Some(slot) =
        ConnectionSlot::acquire(&state.active_connections, state.websocket.max_connections)
    else {
        warn!(
            max_connections = state.websocket.max_connections,
            "WebSocket connection limit exceeded"
        );
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            "Too many concurrent connections. Please try again later.",
        )
            .into_response());
    };

    // Reject unknown tickets before upgrading; dropping the slot frees it
    state.manager.view(resource_id, client_id).await?;

    info!(resource_id = %resource_id, client_id = %client_id, "Push channel requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, resource_id, client_id, state, slot)))
}

/// One of the instance's `max_connections` channel slots, held from the
/// upgrade request until the channel closes
#[derive(Debug)]
struct ConnectionSlot {
    counter: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    /// Take a slot, or `None` when every slot is in use
    fn acquire(counter: &Arc<AtomicUsize>, max_connections: usize) -> Option<Self> {
        let taken = counter.fetch_add(1, Ordering::AcqRel);
        if taken >= max_connections {
            counter.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(Self {
            counter: Arc::clone(counter),
        })
    }

    /// Slots in use, this one included
    fn in_use(&self) -> usize {
        self.counter.load(Ordering::Acquire)
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn handle_socket(
    socket: WebSocket,
    resource_id: ResourceId,
    client_id: ClientId,
    state: AppState,
    slot: ConnectionSlot,
) {
    info!(
        resource_id = %resource_id,
        client_id = %client_id,
        total_connections = slot.in_use(),
        "Push channel established"
    );

    // Register before reporting the connect, so the current view lands on this channel
    let Subscription {
        id: connection_id,
        receiver: mut events,
    } = state.manager.hub().connect(resource_id, client_id);
    if let Err(error) = state.manager.client_connected(resource_id, client_id).await {
        warn!(resource_id = %resource_id, %error, "Failed to register connection with queue");
    }

    let (sender, mut receiver) = socket.split();
    let sender: Sender = Arc::new(Mutex::new(sender));

    // Queue events → client, in the order the queue produced them
    let event_sender = sender.clone();
    let mut event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if send_event(&event_sender, &event).await.is_err() {
                debug!("Client disconnected during event stream");
                return;
            }
        }
        // Sender dropped: a newer connection replaced this one
        debug!("Push channel superseded");
    });

    let ping_sender = sender.clone();
    let ping_period = state.websocket.ping_interval;
    let mut ping_task = tokio::spawn(async move {
        let mut ping_interval = interval_at(Instant::now() + ping_period, ping_period);
        loop {
            ping_interval.tick().await;
            let mut sender_guard = ping_sender.lock().await;
            if sender_guard.send(Message::Ping(Vec::new())).await.is_err() {
                break;
            }
        }
        debug!("WebSocket ping task terminated");
    });

    let command_sender = sender.clone();
    let command_state = state.clone();
    let idle_timeout = state.websocket.idle_timeout;
    let mut recv_task = tokio::spawn(async move {
        let timeout = tokio::time::sleep(idle_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                frame = receiver.next() => {
                    let Some(Ok(msg)) = frame else {
                        break;
                    };
                    timeout.as_mut().reset(Instant::now() + idle_timeout);
                    match msg {
                        Message::Text(text) => {
                            handle_command(&command_state, &command_sender, resource_id, client_id, &text).await;
                        }
                        Message::Close(_) => {
                            info!("Client requested close");
                            break;
                        }
                        Message::Pong(_) | Message::Ping(_) => {}
                        Message::Binary(_) => {
                            debug!("Ignoring binary frame");
                        }
                    }
                }
                () = &mut timeout => {
                    warn!(resource_id = %resource_id, client_id = %client_id, "WebSocket idle timeout");
                    break;
                }
            }
        }

        debug!("WebSocket receive task terminated");
    });

    tokio::select! {
        _ = (&mut event_task) => {
            ping_task.abort();
            recv_task.abort();
        },
        _ = (&mut ping_task) => {
            event_task.abort();
            recv_task.abort();
        },
        _ = (&mut recv_task) => {
            event_task.abort();
            ping_task.abort();
        },
    }

    // A superseded channel must not mark the client as gone
    if state
        .manager
        .hub()
        .disconnect(resource_id, client_id, connection_id)
    {
        if let Err(error) = state.manager.client_disconnected(resource_id, client_id).await {
            warn!(resource_id = %resource_id, %error, "Failed to report disconnect");
        }
    }

    drop(slot);
    info!(
        resource_id = %resource_id,
        client_id = %client_id,
        total_connections = state.active_connections.load(Ordering::Relaxed),
        "Push channel closed"
    );
}

async fn handle_command(
    state: &AppState,
    sender: &Sender,
    resource_id: ResourceId,
    client_id: ClientId,
    text: &str,
) {
    let result = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join) => state.manager.join(resource_id, client_id).await.map(|_| ()),
        Ok(ClientMessage::Leave) => state.manager.leave(resource_id, client_id).await,
        Err(e) => {
            debug!(error = %e, "Malformed client message");
            let _ = send_event(
                sender,
                &ServerEvent::Error {
                    message: format!("Malformed message: {e}"),
                },
            )
            .await;
            return;
        },
    };

    // Successful commands answer through the queue's own pushes
    if let Err(error) = result {
        let _ = send_event(
            sender,
            &ServerEvent::Error {
                message: AppError::from(error).to_string(),
            },
        )
        .await;
    }
}

async fn send_event(sender: &Sender, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.lock().await.send(Message::Text(json)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_parse() {
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"join"}"#).unwrap(),
            ClientMessage::Join
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"leave"}"#).unwrap(),
            ClientMessage::Leave
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"buy"}"#).is_err());
    }

    #[test]
    fn test_connection_slots_are_bounded_and_released() {
        let counter = Arc::new(AtomicUsize::new(0));

        let first = ConnectionSlot::acquire(&counter, 2).unwrap();
        let second = ConnectionSlot::acquire(&counter, 2).unwrap();
        assert_eq!(second.in_use(), 2);
        assert!(ConnectionSlot::acquire(&counter, 2).is_none());
        // A rejected request leaves the count untouched
        assert_eq!(counter.load(Ordering::Acquire), 2);

        drop(first);
        assert_eq!(counter.load(Ordering::Acquire), 1);
        let third = ConnectionSlot::acquire(&counter, 2).unwrap();
        drop((second, third));
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_concurrent_requests_never_exceed_the_limit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let limit = 8;

        let slots: Vec<Option<ConnectionSlot>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..64)
                .map(|_| scope.spawn(|| ConnectionSlot::acquire(&counter, limit)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(slots.iter().flatten().count(), limit);
        assert_eq!(counter.load(Ordering::Acquire), limit);
        drop(slots);
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_idle_and_ping_defaults_are_ordered() {
        let config = crate::config::WebSocketConfig::default();
        assert!(config.ping_interval < config.idle_timeout);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }
}
