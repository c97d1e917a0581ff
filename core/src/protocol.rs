//! Push channel message protocol.
//!
//! Every frame is a JSON object tagged by `type`:
//!
//! **Server → Client:**
//! ```json
//! { "type": "position_update", "position": 2, "total_in_queue": 5, "estimated_wait_seconds": 120 }
//! { "type": "turn_granted", "reservation_id": "…", "deadline": "…", "server_time": "…", "window_seconds": 900 }
//! { "type": "resource_gone", "reason": "sold" }
//! { "type": "opted_out" }
//! ```
//!
//! **Client → Server:**
//! ```json
//! { "type": "join" }
//! { "type": "leave" }
//! ```
//!
//! A `position_update` with `position: 0` tells a client it is no longer in
//! the queue.

use crate::types::{ReservationId, WaitEstimate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a resource left sale while clients were waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoneReason {
    /// Someone completed the purchase
    Sold,
    /// The resource was taken off sale
    Withdrawn,
}

/// Event pushed from the queue to one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Current place in line. `position == 0` means "no longer queued".
    PositionUpdate {
        /// 1-indexed position, or 0
        position: usize,
        /// Clients currently waiting
        total_in_queue: usize,
        /// Estimated seconds until the client's turn
        estimated_wait_seconds: u64,
    },

    /// The client may now purchase
    TurnGranted {
        /// Reservation granted
        reservation_id: ReservationId,
        /// Absolute purchase deadline (server clock)
        deadline: DateTime<Utc>,
        /// Server clock when the event was produced
        server_time: DateTime<Utc>,
        /// `deadline - server_time` in whole seconds
        window_seconds: u64,
    },

    /// The resource can no longer be obtained
    ResourceGone {
        /// Sold or withdrawn
        reason: GoneReason,
    },

    /// Acknowledges a voluntary departure
    OptedOut,

    /// A frame from the client could not be processed
    Error {
        /// Error description
        message: String,
    },
}

impl ServerEvent {
    /// Position update built from a wait estimate
    #[must_use]
    pub const fn position(estimate: WaitEstimate) -> Self {
        Self::PositionUpdate {
            position: estimate.position,
            total_in_queue: estimate.total_in_queue,
            estimated_wait_seconds: estimate.estimated_wait_seconds,
        }
    }

    /// The "no longer in queue" update
    #[must_use]
    pub const fn dequeued(total_in_queue: usize) -> Self {
        Self::PositionUpdate {
            position: 0,
            total_in_queue,
            estimated_wait_seconds: 0,
        }
    }

    /// Discriminant of this event
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::PositionUpdate { .. } => EventKind::PositionUpdate,
            Self::TurnGranted { .. } => EventKind::TurnGranted,
            Self::ResourceGone { .. } => EventKind::ResourceGone,
            Self::OptedOut => EventKind::OptedOut,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// Event discriminant, used for dispatch tables and test assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`ServerEvent::PositionUpdate`]
    PositionUpdate,
    /// [`ServerEvent::TurnGranted`]
    TurnGranted,
    /// [`ServerEvent::ResourceGone`]
    ResourceGone,
    /// [`ServerEvent::OptedOut`]
    OptedOut,
    /// [`ServerEvent::Error`]
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PositionUpdate => "position_update",
            Self::TurnGranted => "turn_granted",
            Self::ResourceGone => "resource_gone",
            Self::OptedOut => "opted_out",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Frame sent by a client over the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the queue (idempotent)
    Join,
    /// Opt out: leave the queue, or release the reservation if holding
    Leave,
}
