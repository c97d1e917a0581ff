//! # Ticket Queue Client
//!
//! Client side of the push channel: a queue view that turns pushed events
//! into a renderable [`Phase`], and a tokio-tungstenite driver that keeps the
//! channel alive.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticket_queue_client::{QueueConnection, QueueView, Reaction};
//! use ticket_queue_core::clock::SystemClock;
//! use ticket_queue_core::types::{ClientId, ResourceId};
//!
//! # async fn example(ticket: ResourceId) -> Result<(), ticket_queue_client::ClientError> {
//! let view = QueueView::new(Arc::new(SystemClock));
//! let mut handle = QueueConnection::new("ws://localhost:8080", ticket, ClientId::new()).spawn(view);
//!
//! while let Some(reaction) = handle.next_reaction().await {
//!     if let Reaction::BeginPurchase(reservation_id) = reaction {
//!         println!("Your turn: {reservation_id}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod reconnect;
pub mod view;

pub use connection::{CLIENT_ID_HEADER, QueueConnection, QueueHandle};
pub use error::ClientError;
pub use reconnect::{ReconnectPolicy, ReconnectPolicyBuilder};
pub use view::{Phase, QueueView, Reaction, ViewFrame, format_wait};
