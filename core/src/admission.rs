//! Admission state machine for one resource.
//!
//! Joins, departures, promotion, expiry, claim checks and presence handling
//! are all expressed as a pure reducer over [`ResourceState`]. The runtime
//! runs it inside the resource's critical section and executes the returned
//! effects; nothing here performs I/O.
//!
//! ```text
//!                 join (no holder)             complete
//!   available ───────────────────────> reserved ─────────> sold (queue drained)
//!       ^                                 │  ^
//!       │ release / expire / unclaimed    │  │ promote next entry
//!       └──────── (queue empty) ──────────┘──┘
//! ```

use crate::clock::{Clock, deadline_after, remaining_until, seconds_until};
use crate::config::{HolderDisconnectPolicy, QueueConfig};
use crate::effect::Effect;
use crate::error::QueueError;
use crate::protocol::{GoneReason, ServerEvent};
use crate::reducer::Reducer;
use crate::state::{Presence, ResourceState};
use crate::types::{
    Availability, ClientId, ReleaseReason, Reservation, ReservationId, ReservationStatus,
};
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::sync::Arc;

type Effects = SmallVec<[Effect<QueueAction>; 4]>;

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for one resource's queue
#[derive(Clone, Debug, PartialEq)]
pub enum QueueAction {
    // Commands
    /// Join the queue, or take the turn if nobody holds it
    Join {
        /// Joining client
        client_id: ClientId,
    },

    /// Opt out: leave the line, or give up the turn if holding it
    Leave {
        /// Departing client
        client_id: ClientId,
    },

    /// The holder's payment succeeded
    CompletePurchase {
        /// Claimed holder
        client_id: ClientId,
    },

    /// The holder gives up the turn
    ReleaseReservation {
        /// Claimed holder
        client_id: ClientId,
    },

    /// Expire the active reservation if its deadline has passed.
    ///
    /// With an ID, only that reservation is considered and an early fire
    /// re-arms the timer. Without one, this is a sweep over whatever is active.
    ExpireIfDue {
        /// Reservation the timer was armed for
        reservation_id: Option<ReservationId>,
    },

    /// Release a promoted reservation whose holder never connected
    ClaimCheck {
        /// Reservation the claim timer was armed for
        reservation_id: ReservationId,
    },

    /// A push channel opened for this client
    ClientConnected {
        /// Client
        client_id: ClientId,
    },

    /// A push channel closed for this client
    ClientDisconnected {
        /// Client
        client_id: ClientId,
    },

    /// Disconnect grace timer fired
    DisconnectGraceElapsed {
        /// Client
        client_id: ClientId,
        /// Presence epoch the timer was armed for
        epoch: u64,
    },

    /// The resource left sale outside the queue's control
    Withdraw {
        /// Sold elsewhere or taken off sale
        reason: GoneReason,
    },

    // Events
    /// A reservation became active
    ReservationGranted {
        /// The new reservation
        reservation: Reservation,
    },

    /// A promoted holder connected within the claim window
    ReservationClaimed {
        /// Reservation ID
        reservation_id: ReservationId,
    },

    /// The active reservation reached a terminal status
    ReservationFinalized {
        /// Reservation ID
        reservation_id: ReservationId,
        /// Terminal status
        status: ReservationStatus,
        /// When
        finalized_at: DateTime<Utc>,
    },

    /// Resource availability changed
    AvailabilityChanged {
        /// New availability
        availability: Availability,
    },

    /// A client was appended to the line
    ClientQueued {
        /// Client
        client_id: ClientId,
        /// When
        joined_at: DateTime<Utc>,
    },

    /// A client was removed from the line
    ClientDequeued {
        /// Client
        client_id: ClientId,
    },

    /// Every waiting client was removed
    QueueDrained,

    /// A client's presence changed (`None` forgets the client)
    PresenceChanged {
        /// Client
        client_id: ClientId,
        /// New presence
        presence: Option<Presence>,
    },

    /// Command rejected
    ValidationFailed {
        /// Why
        error: QueueError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the queue reducer
#[derive(Clone)]
pub struct QueueEnvironment {
    /// Clock for grants, deadlines and presence
    pub clock: Arc<dyn Clock>,
    /// Timing and estimation settings
    pub config: QueueConfig,
}

impl QueueEnvironment {
    /// Creates a new `QueueEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: QueueConfig) -> Self {
        Self { clock, config }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for one resource's admission
#[derive(Clone, Debug, Default)]
pub struct QueueReducer;

impl QueueReducer {
    /// Creates a new `QueueReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies an event to state
    fn apply_event(state: &mut ResourceState, action: &QueueAction) {
        match action {
            QueueAction::ReservationGranted { reservation } => {
                if state.reservations.grant(reservation.clone()).is_ok() {
                    state.availability = Availability::Reserved;
                }
            },

            QueueAction::ReservationClaimed { reservation_id } => {
                if let Some(active) = state
                    .reservations
                    .active_mut()
                    .filter(|r| r.id == *reservation_id)
                {
                    active.claim_deadline = None;
                }
            },

            QueueAction::ReservationFinalized {
                reservation_id,
                status,
                finalized_at,
            } => {
                if let Some(done) =
                    state
                        .reservations
                        .finalize(*reservation_id, *status, *finalized_at)
                {
                    if let Some(turn) = done.turn_duration().and_then(|d| d.to_std().ok()) {
                        state.estimator.record(turn);
                    }
                }
            },

            QueueAction::AvailabilityChanged { availability } => {
                state.availability = *availability;
            },

            QueueAction::ClientQueued {
                client_id,
                joined_at,
            } => {
                state
                    .queue
                    .enqueue(state.resource_id, *client_id, *joined_at);
            },

            QueueAction::ClientDequeued { client_id } => {
                state.queue.remove(client_id);
            },

            QueueAction::QueueDrained => {
                state.queue.drain();
            },

            QueueAction::PresenceChanged {
                client_id,
                presence,
            } => match presence {
                Some(presence) => {
                    state.presence.insert(*client_id, *presence);
                },
                None => {
                    state.presence.remove(client_id);
                },
            },

            QueueAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },

            // Commands don't modify state
            QueueAction::Join { .. }
            | QueueAction::Leave { .. }
            | QueueAction::CompletePurchase { .. }
            | QueueAction::ReleaseReservation { .. }
            | QueueAction::ExpireIfDue { .. }
            | QueueAction::ClaimCheck { .. }
            | QueueAction::ClientConnected { .. }
            | QueueAction::ClientDisconnected { .. }
            | QueueAction::DisconnectGraceElapsed { .. }
            | QueueAction::Withdraw { .. } => {},
        }
    }

    fn fail(state: &mut ResourceState, error: QueueError) {
        Self::apply_event(state, &QueueAction::ValidationFailed { error });
    }

    fn turn_granted(reservation: &Reservation, now: DateTime<Utc>) -> ServerEvent {
        ServerEvent::TurnGranted {
            reservation_id: reservation.id,
            deadline: reservation.deadline,
            server_time: now,
            window_seconds: seconds_until(now, reservation.deadline),
        }
    }

    /// Push the current position to every waiting client
    fn broadcast_positions(state: &ResourceState, effects: &mut Effects) {
        let total = state.queue.len();
        for (index, entry) in state.queue.iter().enumerate() {
            effects.push(Effect::Push {
                client_id: entry.client_id,
                event: ServerEvent::position(state.estimator.estimate(index + 1, total)),
            });
        }
    }

    /// Create the active reservation for `client_id` and notify it.
    ///
    /// With `claim_window`, a client without an open push channel gets a claim
    /// deadline and must connect before it passes.
    fn grant(
        state: &mut ResourceState,
        client_id: ClientId,
        claim_window: bool,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        if let Some(existing) = state.reservations.active() {
            let error = QueueError::ReservationConflict {
                resource_id: state.resource_id,
                reservation_id: existing.id,
            };
            Self::fail(state, error);
            return;
        }

        let now = env.clock.now();
        let deadline = deadline_after(now, env.config.reservation_window);
        let mut reservation = Reservation::new(state.resource_id, client_id, now, deadline);
        let needs_claim = claim_window && !state.is_connected(&client_id);
        if needs_claim {
            reservation =
                reservation.with_claim_deadline(deadline_after(now, env.config.claim_grace));
        }
        let reservation_id = reservation.id;

        effects.push(Effect::Push {
            client_id,
            event: Self::turn_granted(&reservation, now),
        });
        Self::apply_event(state, &QueueAction::ReservationGranted { reservation });

        effects.push(Effect::Delay {
            duration: env.config.reservation_window,
            action: Box::new(QueueAction::ExpireIfDue {
                reservation_id: Some(reservation_id),
            }),
        });
        if needs_claim {
            effects.push(Effect::Delay {
                duration: env.config.claim_grace,
                action: Box::new(QueueAction::ClaimCheck { reservation_id }),
            });
        }
    }

    /// Hand the turn to the lowest-sequence waiting client.
    ///
    /// Entries whose connection has been gone longer than the disconnect grace
    /// are dropped instead of promoted. Remaining entries get fresh positions.
    fn promote(state: &mut ResourceState, env: &QueueEnvironment, effects: &mut Effects) {
        let now = env.clock.now();
        let mut changed = false;

        while state.reservations.active().is_none() && state.availability.is_joinable() {
            let Some(entry) = state.queue.front().cloned() else {
                break;
            };
            changed = true;
            Self::apply_event(
                state,
                &QueueAction::ClientDequeued {
                    client_id: entry.client_id,
                },
            );

            let gone = match state.presence.get(&entry.client_id) {
                Some(Presence::Disconnected { since, .. }) => {
                    (now - *since).to_std().unwrap_or_default() >= env.config.disconnect_grace
                },
                _ => false,
            };
            if gone {
                continue;
            }

            Self::grant(state, entry.client_id, true, env, effects);
        }

        if changed {
            Self::broadcast_positions(state, effects);
        }
    }

    /// Finalize the active reservation and move availability accordingly
    fn finalize(
        state: &mut ResourceState,
        reservation_id: ReservationId,
        status: ReservationStatus,
        next: Availability,
        env: &QueueEnvironment,
    ) {
        Self::apply_event(
            state,
            &QueueAction::ReservationFinalized {
                reservation_id,
                status,
                finalized_at: env.clock.now(),
            },
        );
        Self::apply_event(state, &QueueAction::AvailabilityChanged { availability: next });
    }

    /// Release the active reservation and pass the turn on
    fn release(
        state: &mut ResourceState,
        reservation_id: ReservationId,
        reason: ReleaseReason,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        Self::finalize(
            state,
            reservation_id,
            ReservationStatus::Released { reason },
            Availability::Available,
            env,
        );
        Self::promote(state, env, effects);
    }

    /// Remove every waiting client, telling each the resource is gone
    fn drain(state: &mut ResourceState, reason: GoneReason, effects: &mut Effects) {
        for entry in state.queue.iter() {
            effects.push(Effect::Push {
                client_id: entry.client_id,
                event: ServerEvent::ResourceGone { reason },
            });
        }
        Self::apply_event(state, &QueueAction::QueueDrained);
    }

    fn handle_join(
        state: &mut ResourceState,
        client_id: ClientId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let now = env.clock.now();

        // Repeated joins re-send the current view
        if let Some(active) = state.reservations.active().filter(|r| r.holder == client_id) {
            effects.push(Effect::Push {
                client_id,
                event: Self::turn_granted(active, now),
            });
            return;
        }
        if let Some(estimate) = state.estimate_for(&client_id) {
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::position(estimate),
            });
            return;
        }

        if !state.availability.is_joinable() {
            let error = QueueError::ResourceUnavailable {
                resource_id: state.resource_id,
                availability: state.availability,
            };
            Self::fail(state, error);
            return;
        }

        // Nobody ahead should be skipped if a turn was left unassigned
        if state.reservations.active().is_none() && !state.queue.is_empty() {
            Self::promote(state, env, effects);
        }

        if state.reservations.active().is_none() {
            Self::grant(state, client_id, false, env, effects);
            return;
        }

        Self::apply_event(
            state,
            &QueueAction::ClientQueued {
                client_id,
                joined_at: now,
            },
        );
        if let Some(estimate) = state.estimate_for(&client_id) {
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::position(estimate),
            });
        }
    }

    fn handle_leave(
        state: &mut ResourceState,
        client_id: ClientId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        if state.queue.contains(&client_id) {
            Self::apply_event(state, &QueueAction::ClientDequeued { client_id });
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::OptedOut,
            });
            Self::broadcast_positions(state, effects);
            return;
        }

        // Promoted before the opt-out arrived: the turn is given up instead
        if let Some(active) = state.reservations.active().filter(|r| r.holder == client_id) {
            let reservation_id = active.id;
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::OptedOut,
            });
            Self::release(state, reservation_id, ReleaseReason::OptOut, env, effects);
        }
    }

    fn holder_reservation(
        state: &mut ResourceState,
        client_id: ClientId,
    ) -> Option<ReservationId> {
        let held = state
            .reservations
            .active()
            .filter(|r| r.holder == client_id)
            .map(|r| r.id);
        if held.is_none() {
            let error = QueueError::NotHolder {
                resource_id: state.resource_id,
                client_id,
            };
            Self::fail(state, error);
        }
        held
    }

    fn handle_complete(
        state: &mut ResourceState,
        client_id: ClientId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let Some(reservation_id) = Self::holder_reservation(state, client_id) else {
            return;
        };
        Self::finalize(
            state,
            reservation_id,
            ReservationStatus::Completed,
            Availability::Sold,
            env,
        );
        Self::drain(state, GoneReason::Sold, effects);
    }

    fn handle_release(
        state: &mut ResourceState,
        client_id: ClientId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let Some(reservation_id) = Self::holder_reservation(state, client_id) else {
            return;
        };
        effects.push(Effect::Push {
            client_id,
            event: ServerEvent::OptedOut,
        });
        Self::release(state, reservation_id, ReleaseReason::OptOut, env, effects);
    }

    fn handle_expire(
        state: &mut ResourceState,
        reservation_id: Option<ReservationId>,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let now = env.clock.now();
        let Some(active) = state
            .reservations
            .active()
            .filter(|r| reservation_id.is_none_or(|id| r.id == id))
        else {
            // Already finalized: duplicate or late timer fire
            return;
        };
        let id = active.id;
        let holder = active.holder;

        if !active.is_due(now) {
            if reservation_id.is_some() {
                effects.push(Effect::Delay {
                    duration: remaining_until(now, active.deadline),
                    action: Box::new(QueueAction::ExpireIfDue {
                        reservation_id: Some(id),
                    }),
                });
            }
            return;
        }

        Self::finalize(
            state,
            id,
            ReservationStatus::Expired,
            Availability::Available,
            env,
        );
        effects.push(Effect::Push {
            client_id: holder,
            event: ServerEvent::dequeued(state.queue.len()),
        });
        Self::promote(state, env, effects);
    }

    fn handle_claim_check(
        state: &mut ResourceState,
        reservation_id: ReservationId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let now = env.clock.now();
        let unclaimed = state.reservations.active().is_some_and(|r| {
            r.id == reservation_id && r.claim_deadline.is_some_and(|claim| now >= claim)
        });
        if !unclaimed {
            return;
        }
        Self::release(state, reservation_id, ReleaseReason::Unclaimed, env, effects);
    }

    fn handle_connected(
        state: &mut ResourceState,
        client_id: ClientId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        // Nothing left to wait for; tell the client instead of tracking it
        if let Some(reason) = Self::gone_reason(state.availability) {
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::ResourceGone { reason },
            });
            return;
        }

        let epoch = state.presence.get(&client_id).map_or(0, |p| p.epoch() + 1);
        Self::apply_event(
            state,
            &QueueAction::PresenceChanged {
                client_id,
                presence: Some(Presence::Connected { epoch }),
            },
        );

        let now = env.clock.now();
        if let Some(active) = state.reservations.active().filter(|r| r.holder == client_id) {
            let reservation_id = active.id;
            effects.push(Effect::Push {
                client_id,
                event: Self::turn_granted(active, now),
            });
            if active.is_unclaimed() {
                Self::apply_event(state, &QueueAction::ReservationClaimed { reservation_id });
            }
        } else if let Some(estimate) = state.estimate_for(&client_id) {
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::position(estimate),
            });
        } else if state.reservations.history().any(|r| r.holder == client_id) {
            // The turn ended while the client was away
            effects.push(Effect::Push {
                client_id,
                event: ServerEvent::dequeued(state.queue.len()),
            });
        }
    }

    const fn gone_reason(availability: Availability) -> Option<GoneReason> {
        match availability {
            Availability::Sold => Some(GoneReason::Sold),
            Availability::Withdrawn => Some(GoneReason::Withdrawn),
            Availability::Available | Availability::Reserved => None,
        }
    }

    fn handle_disconnected(
        state: &mut ResourceState,
        client_id: ClientId,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let epoch = state.presence.get(&client_id).map_or(0, |p| p.epoch() + 1);
        Self::apply_event(
            state,
            &QueueAction::PresenceChanged {
                client_id,
                presence: Some(Presence::Disconnected {
                    epoch,
                    since: env.clock.now(),
                }),
            },
        );
        effects.push(Effect::Delay {
            duration: env.config.disconnect_grace,
            action: Box::new(QueueAction::DisconnectGraceElapsed { client_id, epoch }),
        });
    }

    fn handle_grace_elapsed(
        state: &mut ResourceState,
        client_id: ClientId,
        epoch: u64,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        let still_gone = matches!(
            state.presence.get(&client_id),
            Some(Presence::Disconnected { epoch: current, .. }) if *current == epoch
        );
        if !still_gone {
            return;
        }

        if state.queue.contains(&client_id) {
            // Implicit opt-out
            Self::apply_event(state, &QueueAction::ClientDequeued { client_id });
            Self::broadcast_positions(state, effects);
        } else if let Some(active) = state.reservations.active().filter(|r| r.holder == client_id)
        {
            if env.config.holder_disconnect == HolderDisconnectPolicy::ReleaseAfterGrace {
                let reservation_id = active.id;
                Self::release(
                    state,
                    reservation_id,
                    ReleaseReason::HolderDisconnected,
                    env,
                    effects,
                );
            }
            return;
        }

        if !state.is_participant(&client_id) {
            Self::apply_event(
                state,
                &QueueAction::PresenceChanged {
                    client_id,
                    presence: None,
                },
            );
        }
    }

    fn handle_withdraw(
        state: &mut ResourceState,
        reason: GoneReason,
        env: &QueueEnvironment,
        effects: &mut Effects,
    ) {
        if state.availability.is_terminal() {
            let error = QueueError::ResourceUnavailable {
                resource_id: state.resource_id,
                availability: state.availability,
            };
            Self::fail(state, error);
            return;
        }

        let terminal = match reason {
            GoneReason::Sold => Availability::Sold,
            GoneReason::Withdrawn => Availability::Withdrawn,
        };

        if let Some(active) = state.reservations.active() {
            let reservation_id = active.id;
            let holder = active.holder;
            Self::apply_event(
                state,
                &QueueAction::ReservationFinalized {
                    reservation_id,
                    status: ReservationStatus::Released {
                        reason: ReleaseReason::Withdrawn,
                    },
                    finalized_at: env.clock.now(),
                },
            );
            effects.push(Effect::Push {
                client_id: holder,
                event: ServerEvent::ResourceGone { reason },
            });
        }

        Self::apply_event(state, &QueueAction::AvailabilityChanged { availability: terminal });
        Self::drain(state, reason, effects);
    }
}

impl Reducer for QueueReducer {
    type State = ResourceState;
    type Action = QueueAction;
    type Environment = QueueEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let before = state.availability;
        let mut effects = Effects::new();
        state.last_error = None;

        match action {
            QueueAction::Join { client_id } => {
                Self::handle_join(state, client_id, env, &mut effects);
            },
            QueueAction::Leave { client_id } => {
                Self::handle_leave(state, client_id, env, &mut effects);
            },
            QueueAction::CompletePurchase { client_id } => {
                Self::handle_complete(state, client_id, env, &mut effects);
            },
            QueueAction::ReleaseReservation { client_id } => {
                Self::handle_release(state, client_id, env, &mut effects);
            },
            QueueAction::ExpireIfDue { reservation_id } => {
                Self::handle_expire(state, reservation_id, env, &mut effects);
            },
            QueueAction::ClaimCheck { reservation_id } => {
                Self::handle_claim_check(state, reservation_id, env, &mut effects);
            },
            QueueAction::ClientConnected { client_id } => {
                Self::handle_connected(state, client_id, env, &mut effects);
            },
            QueueAction::ClientDisconnected { client_id } => {
                Self::handle_disconnected(state, client_id, env, &mut effects);
            },
            QueueAction::DisconnectGraceElapsed { client_id, epoch } => {
                Self::handle_grace_elapsed(state, client_id, epoch, env, &mut effects);
            },
            QueueAction::Withdraw { reason } => {
                Self::handle_withdraw(state, reason, env, &mut effects);
            },

            // Events replayed directly (snapshot tooling, tests)
            event => Self::apply_event(state, &event),
        }

        if state.availability != before {
            effects.insert(0, Effect::SetAvailability(state.availability));
        }
        effects
    }
}
