//! Per-resource queue state.

use crate::clock::seconds_until;
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::estimate::ServiceTimeEstimator;
use crate::queue::QueueStore;
use crate::reservation::ReservationStore;
use crate::types::{Availability, ClientId, ClientView, JoinOutcome, ResourceId, WaitEstimate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection presence of a participant.
///
/// The epoch changes on every connect and disconnect, so a timer armed for
/// one disconnect is recognisably stale after a reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Presence {
    /// A push channel is open
    Connected {
        /// Presence epoch
        epoch: u64,
    },
    /// The push channel dropped
    Disconnected {
        /// Presence epoch
        epoch: u64,
        /// When the channel dropped
        since: DateTime<Utc>,
    },
}

impl Presence {
    /// Current epoch
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        match self {
            Self::Connected { epoch } | Self::Disconnected { epoch, .. } => *epoch,
        }
    }

    /// Whether a push channel is open
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// State of one resource's admission: availability, waiting line,
/// reservations and participant presence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource
    pub resource_id: ResourceId,
    /// Last availability observed or written by the queue
    pub availability: Availability,
    /// Waiting clients
    pub queue: QueueStore,
    /// Active and finalized reservations
    pub reservations: ReservationStore,
    /// Presence of clients that have connected at least once
    pub presence: HashMap<ClientId, Presence>,
    /// Wait estimator
    pub estimator: ServiceTimeEstimator,
    /// Outcome of the last command, if it failed
    #[serde(skip)]
    pub last_error: Option<QueueError>,
}

impl ResourceState {
    /// Creates state for a resource with no participants
    #[must_use]
    pub fn new(resource_id: ResourceId, availability: Availability, config: &QueueConfig) -> Self {
        Self {
            resource_id,
            availability,
            queue: QueueStore::new(),
            reservations: ReservationStore::new(),
            presence: HashMap::new(),
            estimator: ServiceTimeEstimator::from_config(config),
            last_error: None,
        }
    }

    /// Wait estimate for a queued client
    #[must_use]
    pub fn estimate_for(&self, client_id: &ClientId) -> Option<WaitEstimate> {
        let position = self.queue.position(client_id)?;
        Some(self.estimator.estimate(position, self.queue.len()))
    }

    /// What `client_id` would get from a join right now, without mutating.
    ///
    /// `None` when the client is neither holding nor queued.
    #[must_use]
    pub fn outcome_for(&self, client_id: &ClientId) -> Option<JoinOutcome> {
        if let Some(active) = self.reservations.active().filter(|r| r.holder == *client_id) {
            return Some(JoinOutcome::AlreadyHolding {
                reservation_id: active.id,
                deadline: active.deadline,
            });
        }
        self.estimate_for(client_id).map(JoinOutcome::Queued)
    }

    /// The client's current view at `now`
    #[must_use]
    pub fn view_for(&self, client_id: &ClientId, now: DateTime<Utc>) -> ClientView {
        if let Some(active) = self.reservations.active().filter(|r| r.holder == *client_id) {
            return ClientView::Holding {
                reservation_id: active.id,
                deadline: active.deadline,
                window_seconds: seconds_until(now, active.deadline),
            };
        }
        self.estimate_for(client_id)
            .map_or(ClientView::NotQueued, ClientView::Queued)
    }

    /// Whether the client currently has an open push channel
    #[must_use]
    pub fn is_connected(&self, client_id: &ClientId) -> bool {
        self.presence
            .get(client_id)
            .is_some_and(Presence::is_connected)
    }

    /// Whether the client is queued or holding
    #[must_use]
    pub fn is_participant(&self, client_id: &ClientId) -> bool {
        self.reservations.is_holder(client_id) || self.queue.contains(client_id)
    }

    /// Whether nothing is waiting and nothing is held
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.reservations.active().is_none()
    }
}
