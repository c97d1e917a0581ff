//! Domain types for the ticket queue.
//!
//! Identifiers, the resource availability lifecycle, queue entries, reservations
//! and the derived wait estimate pushed to waiting clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a scarce resource (a ticket)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Creates a new random `ResourceId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ResourceId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a client (buyer) taking part in a queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Creates a new random `ClientId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ClientId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reservation (one purchasing turn)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Resource availability
// ============================================================================

/// Availability of a resource as held by the catalog.
///
/// The queue only drives the edges `available <-> reserved`, `reserved -> sold`
/// and `reserved -> available`. `withdrawn` is an administrative state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Nobody holds purchasing rights
    Available,
    /// One client holds an active reservation
    Reserved,
    /// Purchase completed
    Sold,
    /// Taken off sale
    Withdrawn,
}

impl Availability {
    /// Whether a client may join the queue for a resource in this state
    #[must_use]
    pub const fn is_joinable(self) -> bool {
        matches!(self, Self::Available | Self::Reserved)
    }

    /// Whether the resource is gone for good
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sold | Self::Withdrawn)
    }

    /// Whether `self -> next` is a legal catalog transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Available, Self::Reserved)
                | (Self::Reserved, Self::Available | Self::Sold)
                | (Self::Available | Self::Reserved, Self::Withdrawn)
        )
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Sold => "sold",
            Self::Withdrawn => "withdrawn",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Queue entries
// ============================================================================

/// One waiting client for one resource.
///
/// `sequence` is assigned at join, strictly increasing per resource and never
/// reused; it alone defines FIFO order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Resource being waited on
    pub resource_id: ResourceId,
    /// Waiting client
    pub client_id: ClientId,
    /// When the client joined
    pub joined_at: DateTime<Utc>,
    /// Monotonic per-resource sequence number
    pub sequence: u64,
}

// ============================================================================
// Reservations
// ============================================================================

/// Why a reservation was released early
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// Holder opted out
    OptOut,
    /// Promoted holder never connected within the claim window
    Unclaimed,
    /// Holder's connection stayed down past the disconnect grace
    HolderDisconnected,
    /// Resource was withdrawn or sold elsewhere
    Withdrawn,
}

/// Reservation lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ReservationStatus {
    /// Holder may purchase until the deadline
    Active,
    /// Purchase completed
    Completed,
    /// Deadline elapsed without a purchase
    Expired,
    /// Released before the deadline
    Released {
        /// Why it was released
        reason: ReleaseReason,
    },
}

impl ReservationStatus {
    /// Short label used in logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Released { .. } => "released",
        }
    }
}

/// The exclusive, time-bounded right to purchase a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID
    pub id: ReservationId,
    /// Reserved resource
    pub resource_id: ResourceId,
    /// Client holding the purchasing right
    pub holder: ClientId,
    /// When the right was granted
    pub granted_at: DateTime<Utc>,
    /// When the right lapses
    pub deadline: DateTime<Utc>,
    /// Set while a promoted holder has not connected yet
    pub claim_deadline: Option<DateTime<Utc>>,
    /// Current status
    pub status: ReservationStatus,
    /// When the reservation left `Active`
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Creates a new active reservation
    #[must_use]
    pub fn new(
        resource_id: ResourceId,
        holder: ClientId,
        granted_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            resource_id,
            holder,
            granted_at,
            deadline,
            claim_deadline: None,
            status: ReservationStatus::Active,
            finalized_at: None,
        }
    }

    /// Attach a claim deadline (holder must connect before it)
    #[must_use]
    pub const fn with_claim_deadline(mut self, claim_deadline: DateTime<Utc>) -> Self {
        self.claim_deadline = Some(claim_deadline);
        self
    }

    /// Whether the reservation is still active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, ReservationStatus::Active)
    }

    /// Whether the purchase window has elapsed at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Whether the holder still has to claim the turn
    #[must_use]
    pub const fn is_unclaimed(&self) -> bool {
        self.claim_deadline.is_some()
    }

    /// How long the holder kept the turn, once finalized
    #[must_use]
    pub fn turn_duration(&self) -> Option<chrono::Duration> {
        self.finalized_at.map(|at| at - self.granted_at)
    }
}

// ============================================================================
// Derived views
// ============================================================================

/// Position and wait estimate for one queued client (derived, never stored)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitEstimate {
    /// 1-indexed distance from the front of the queue
    pub position: usize,
    /// Number of clients currently waiting
    pub total_in_queue: usize,
    /// Estimated seconds until this client's turn
    pub estimated_wait_seconds: u64,
}

/// Result of a join request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// The client was granted the purchasing turn by this request
    Granted {
        /// New reservation
        reservation_id: ReservationId,
        /// Purchase deadline
        deadline: DateTime<Utc>,
    },
    /// The client already held the purchasing turn
    AlreadyHolding {
        /// Existing reservation
        reservation_id: ReservationId,
        /// Purchase deadline
        deadline: DateTime<Utc>,
    },
    /// The client is waiting in line
    Queued(WaitEstimate),
}

/// What one client currently sees for one resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientView {
    /// The client holds the active reservation
    Holding {
        /// Reservation ID
        reservation_id: ReservationId,
        /// Purchase deadline
        deadline: DateTime<Utc>,
        /// Seconds left in the purchase window
        window_seconds: u64,
    },
    /// The client is waiting
    Queued(WaitEstimate),
    /// The client is neither waiting nor holding
    NotQueued,
}
