//! Reservation records for one resource: at most one active, plus a bounded
//! history of finalized turns.

use crate::error::QueueError;
use crate::types::{ClientId, Reservation, ReservationId, ReservationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Finalized reservations kept per resource
pub const HISTORY_LIMIT: usize = 32;

/// Reservation store for a single resource
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStore {
    active: Option<Reservation>,
    history: VecDeque<Reservation>,
    finalized_total: u64,
}

impl ReservationStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `reservation` as the active one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ReservationConflict`] if another reservation is
    /// still active; the existing holder is never overwritten.
    pub fn grant(&mut self, reservation: Reservation) -> Result<&Reservation, QueueError> {
        if let Some(existing) = &self.active {
            return Err(QueueError::ReservationConflict {
                resource_id: existing.resource_id,
                reservation_id: existing.id,
            });
        }
        Ok(self.active.insert(reservation))
    }

    /// The active reservation, if any
    #[must_use]
    pub const fn active(&self) -> Option<&Reservation> {
        self.active.as_ref()
    }

    /// Mutable access to the active reservation
    pub const fn active_mut(&mut self) -> Option<&mut Reservation> {
        self.active.as_mut()
    }

    /// Current holder
    #[must_use]
    pub fn holder(&self) -> Option<ClientId> {
        self.active.as_ref().map(|r| r.holder)
    }

    /// Whether `client_id` holds the active reservation
    #[must_use]
    pub fn is_holder(&self, client_id: &ClientId) -> bool {
        self.holder().as_ref() == Some(client_id)
    }

    /// Move the active reservation `id` into a terminal status.
    ///
    /// Returns `None` when `id` is not the active reservation, which makes
    /// late or duplicate finalizations no-ops.
    pub fn finalize(
        &mut self,
        id: ReservationId,
        status: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Option<Reservation> {
        if self.active.as_ref().is_none_or(|r| r.id != id) {
            return None;
        }
        let mut reservation = self.active.take()?;
        reservation.status = status;
        reservation.finalized_at = Some(at);
        reservation.claim_deadline = None;

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(reservation.clone());
        self.finalized_total += 1;
        Some(reservation)
    }

    /// Finalized reservations, oldest first
    pub fn history(&self) -> impl DoubleEndedIterator<Item = &Reservation> {
        self.history.iter()
    }

    /// Look up a reservation by ID among the active one and the history
    #[must_use]
    pub fn find(&self, id: ReservationId) -> Option<&Reservation> {
        self.active
            .iter()
            .chain(self.history.iter())
            .find(|r| r.id == id)
    }

    /// Number of reservations ever finalized for this resource
    #[must_use]
    pub const fn finalized_total(&self) -> u64 {
        self.finalized_total
    }
}
