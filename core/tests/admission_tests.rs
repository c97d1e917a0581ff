//! Reducer tests for queue admission.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::time::Duration;
use ticket_queue_core::admission::{QueueAction, QueueReducer};
use ticket_queue_core::config::HolderDisconnectPolicy;
use ticket_queue_core::effect::Effect;
use ticket_queue_core::error::QueueError;
use ticket_queue_core::protocol::{EventKind, GoneReason, ServerEvent};
use ticket_queue_core::reducer::Reducer;
use ticket_queue_core::state::Presence;
use ticket_queue_core::types::{
    Availability, ClientId, JoinOutcome, ReleaseReason, ReservationStatus, WaitEstimate,
};
use ticket_queue_testing::assertions::{
    assert_availability_set, assert_delay_scheduled, assert_no_effects, assert_nothing_pushed,
    assert_pushed, pushes_for,
};
use ticket_queue_testing::helpers::{StateBuilder, available_state, test_config, test_env};
use ticket_queue_testing::{FixedClock, ReducerTest, test_clock, test_epoch};

fn later(seconds: i64) -> FixedClock {
    FixedClock::new(test_epoch() + chrono::Duration::seconds(seconds))
}

// ============================================================================
// Join
// ============================================================================

#[test]
fn test_join_empty_resource_grants_immediately() {
    let a = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(available_state())
        .when_action(QueueAction::Join { client_id: a })
        .then_state(move |state| {
            assert_eq!(state.availability, Availability::Reserved);
            assert!(state.reservations.is_holder(&a));
            assert!(state.queue.is_empty());
            let active = state.reservations.active().unwrap();
            assert_eq!(active.deadline, test_epoch() + chrono::Duration::seconds(60));
            assert!(matches!(
                state.outcome_for(&a),
                Some(JoinOutcome::AlreadyHolding { .. })
            ));
        })
        .then_effects(move |effects| {
            assert!(matches!(
                effects.first(),
                Some(Effect::SetAvailability(Availability::Reserved))
            ));
            assert_pushed(effects, a, EventKind::TurnGranted);
            let delay = assert_delay_scheduled(effects, |action| {
                matches!(action, QueueAction::ExpireIfDue { reservation_id: Some(_) })
            });
            assert_eq!(delay, Duration::from_secs(60));
        })
        .run();
}

#[test]
fn test_join_behind_holder_is_queued_with_estimate() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).build())
        .when_action(QueueAction::Join { client_id: b })
        .then_state(move |state| {
            assert_eq!(state.queue.position(&b), Some(1));
            assert_eq!(
                state.outcome_for(&b),
                Some(JoinOutcome::Queued(WaitEstimate {
                    position: 1,
                    total_in_queue: 1,
                    estimated_wait_seconds: 30,
                }))
            );
            assert!(state.reservations.is_holder(&a));
        })
        .then_effects(move |effects| {
            assert_eq!(
                pushes_for(effects, b),
                vec![&ServerEvent::PositionUpdate {
                    position: 1,
                    total_in_queue: 1,
                    estimated_wait_seconds: 30,
                }]
            );
            assert_nothing_pushed(effects, a);
        })
        .run();
}

#[test]
fn test_repeated_join_is_idempotent() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::Join { client_id: b })
        .when_action(QueueAction::Join { client_id: b })
        .then_state(move |state| {
            assert_eq!(state.queue.len(), 1);
            assert_eq!(state.queue.next_sequence(), 1);
            assert!(state.last_error.is_none());
        })
        .then_effects(move |effects| {
            assert_eq!(effects.len(), 1);
            assert_pushed(effects, b, EventKind::PositionUpdate);
        })
        .run();
}

#[test]
fn test_holder_rejoin_resends_turn_without_new_reservation() {
    let a = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(20)))
        .given_state(StateBuilder::new(test_epoch()).holder(a).build())
        .when_action(QueueAction::Join { client_id: a })
        .then_state(move |state| {
            assert_eq!(state.reservations.finalized_total(), 0);
            assert!(state.reservations.is_holder(&a));
        })
        .then_effects(move |effects| {
            match pushes_for(effects, a).as_slice() {
                [ServerEvent::TurnGranted { window_seconds, .. }] => {
                    assert_eq!(*window_seconds, 40);
                },
                other => panic!("unexpected pushes {other:?}"),
            }
        })
        .run();
}

#[test]
fn test_join_sold_resource_fails_unavailable() {
    let mut state = available_state();
    state.availability = Availability::Sold;
    let resource_id = state.resource_id;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(state)
        .when_action(QueueAction::Join {
            client_id: ClientId::new(),
        })
        .then_state(move |state| {
            assert_eq!(
                state.last_error,
                Some(QueueError::ResourceUnavailable {
                    resource_id,
                    availability: Availability::Sold,
                })
            );
            assert!(state.queue.is_empty());
        })
        .then_effects(assert_no_effects)
        .run();
}

// ============================================================================
// Leave
// ============================================================================

#[test]
fn test_leave_acknowledges_and_updates_those_behind() {
    let a = ClientId::new();
    let (b, c, d) = (ClientId::new(), ClientId::new(), ClientId::new());

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b, c, d]).build())
        .when_action(QueueAction::Leave { client_id: c })
        .then_state(move |state| {
            assert!(!state.queue.contains(&c));
            assert_eq!(state.queue.position(&d), Some(2));
            // No promotion: the holder is untouched
            assert!(state.reservations.is_holder(&a));
        })
        .then_effects(move |effects| {
            assert_eq!(pushes_for(effects, c), vec![&ServerEvent::OptedOut]);
            assert_eq!(
                pushes_for(effects, d),
                vec![&ServerEvent::PositionUpdate {
                    position: 2,
                    total_in_queue: 2,
                    estimated_wait_seconds: 60,
                }]
            );
            assert!(
                !effects
                    .iter()
                    .any(|e| matches!(e, Effect::SetAvailability(_)))
            );
        })
        .run();
}

#[test]
fn test_leave_when_absent_is_noop() {
    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(available_state())
        .when_action(QueueAction::Leave {
            client_id: ClientId::new(),
        })
        .then_state(|state| {
            assert!(state.last_error.is_none());
            assert!(state.is_idle());
        })
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn test_leave_after_promotion_releases_the_turn() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(5)))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::Leave { client_id: a })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            let released = state.reservations.history().last().unwrap();
            assert_eq!(
                released.status,
                ReservationStatus::Released {
                    reason: ReleaseReason::OptOut
                }
            );
        })
        .then_effects(move |effects| {
            assert_pushed(effects, a, EventKind::OptedOut);
            assert_pushed(effects, b, EventKind::TurnGranted);
        })
        .run();
}

// ============================================================================
// Complete / release
// ============================================================================

#[test]
fn test_complete_sells_and_drains_queue() {
    let a = ClientId::new();
    let (b, c, d) = (ClientId::new(), ClientId::new(), ClientId::new());

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(30)))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b, c, d]).build())
        .when_action(QueueAction::CompletePurchase { client_id: a })
        .then_state(|state| {
            assert_eq!(state.availability, Availability::Sold);
            assert!(state.queue.is_empty());
            assert!(state.reservations.active().is_none());
            assert_eq!(
                state.reservations.history().last().map(|r| r.status),
                Some(ReservationStatus::Completed)
            );
        })
        .then_effects(move |effects| {
            assert_availability_set(effects, Availability::Sold);
            for client in [b, c, d] {
                assert_eq!(
                    pushes_for(effects, client),
                    vec![&ServerEvent::ResourceGone {
                        reason: GoneReason::Sold
                    }]
                );
            }
            assert!(
                !effects
                    .iter()
                    .any(|e| matches!(e, Effect::Push { event: ServerEvent::TurnGranted { .. }, .. }))
            );
        })
        .run();
}

#[test]
fn test_complete_by_non_holder_fails() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::CompletePurchase { client_id: b })
        .then_state(move |state| {
            assert!(matches!(
                state.last_error,
                Some(QueueError::NotHolder { client_id, .. }) if client_id == b
            ));
            assert_eq!(state.availability, Availability::Reserved);
            assert!(state.reservations.is_holder(&a));
        })
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn test_release_promotes_next_in_line() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(10)))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::ReleaseReservation { client_id: a })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            assert!(state.queue.is_empty());
            assert_eq!(state.availability, Availability::Reserved);
            assert!(!state.reservations.active().unwrap().is_unclaimed());
        })
        .then_effects(move |effects| {
            assert_pushed(effects, a, EventKind::OptedOut);
            assert_pushed(effects, b, EventKind::TurnGranted);
            // Availability went reserved -> available -> reserved within one step
            assert!(
                !effects
                    .iter()
                    .any(|e| matches!(e, Effect::SetAvailability(_)))
            );
        })
        .run();
}

#[test]
fn test_release_with_empty_queue_makes_available() {
    let a = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(10)))
        .given_state(StateBuilder::new(test_epoch()).holder(a).build())
        .when_action(QueueAction::ReleaseReservation { client_id: a })
        .then_state(|state| {
            assert_eq!(state.availability, Availability::Available);
            assert!(state.is_idle());
        })
        .then_effects(|effects| assert_availability_set(effects, Availability::Available))
        .run();
}

// ============================================================================
// Expiry
// ============================================================================

#[test]
fn test_expire_before_deadline_rearms() {
    let a = ClientId::new();
    let state = StateBuilder::new(test_epoch()).holder(a).build();
    let id = state.reservations.active().unwrap().id;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(45)))
        .given_state(state)
        .when_action(QueueAction::ExpireIfDue {
            reservation_id: Some(id),
        })
        .then_state(move |state| assert!(state.reservations.is_holder(&a)))
        .then_effects(move |effects| {
            let delay = assert_delay_scheduled(effects, |action| {
                *action == QueueAction::ExpireIfDue {
                    reservation_id: Some(id),
                }
            });
            assert_eq!(delay, Duration::from_secs(15));
        })
        .run();
}

#[test]
fn test_expire_at_deadline_promotes_next() {
    let a = ClientId::new();
    let (b, c) = (ClientId::new(), ClientId::new());
    let state = StateBuilder::new(test_epoch()).holder(a).waiting(&[b, c]).build();
    let id = state.reservations.active().unwrap().id;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(60)))
        .given_state(state)
        .when_action(QueueAction::ExpireIfDue {
            reservation_id: Some(id),
        })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            assert_eq!(state.queue.position(&c), Some(1));
            assert_eq!(
                state.reservations.find(id).map(|r| r.status),
                Some(ReservationStatus::Expired)
            );
        })
        .then_effects(move |effects| {
            assert_pushed(effects, a, EventKind::PositionUpdate);
            assert_pushed(effects, b, EventKind::TurnGranted);
            assert_eq!(
                pushes_for(effects, c),
                vec![&ServerEvent::PositionUpdate {
                    position: 1,
                    total_in_queue: 1,
                    estimated_wait_seconds: 30,
                }]
            );
        })
        .run();
}

#[test]
fn test_duplicate_expire_promotes_once() {
    let a = ClientId::new();
    let (b, c) = (ClientId::new(), ClientId::new());
    let state = StateBuilder::new(test_epoch()).holder(a).waiting(&[b, c]).build();
    let id = state.reservations.active().unwrap().id;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(61)))
        .given_state(state)
        .when_action(QueueAction::ExpireIfDue {
            reservation_id: Some(id),
        })
        .when_action(QueueAction::ExpireIfDue {
            reservation_id: Some(id),
        })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            assert_eq!(state.queue.len(), 1);
            assert_eq!(state.reservations.finalized_total(), 1);
        })
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn test_sweep_expires_overdue_reservation() {
    let a = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(120)))
        .given_state(StateBuilder::new(test_epoch()).holder(a).build())
        .when_action(QueueAction::ExpireIfDue {
            reservation_id: None,
        })
        .then_state(|state| {
            assert_eq!(state.availability, Availability::Available);
            assert!(state.reservations.active().is_none());
        })
        .then_effects(|effects| assert_availability_set(effects, Availability::Available))
        .run();
}

// ============================================================================
// Promotion claim window
// ============================================================================

#[test]
fn test_promoting_disconnected_client_sets_claim_deadline() {
    let a = ClientId::new();
    let b = ClientId::new();
    let state = StateBuilder::new(test_epoch())
        .holder(a)
        .waiting(&[b])
        .never_connected(b)
        .build();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(10)))
        .given_state(state)
        .when_action(QueueAction::ReleaseReservation { client_id: a })
        .then_state(move |state| {
            let active = state.reservations.active().unwrap();
            assert_eq!(active.holder, b);
            assert_eq!(
                active.claim_deadline,
                Some(test_epoch() + chrono::Duration::seconds(15))
            );
        })
        .then_effects(|effects| {
            let delay = assert_delay_scheduled(effects, |action| {
                matches!(action, QueueAction::ClaimCheck { .. })
            });
            assert_eq!(delay, Duration::from_secs(5));
        })
        .run();
}

#[test]
fn test_unclaimed_turn_moves_to_next_connected_client() {
    let (b, c) = (ClientId::new(), ClientId::new());
    let mut state = StateBuilder::new(test_epoch()).waiting(&[c]).build();
    let resource_id = state.resource_id;
    let reservation = ticket_queue_core::types::Reservation::new(
        resource_id,
        b,
        test_epoch(),
        test_epoch() + chrono::Duration::seconds(60),
    )
    .with_claim_deadline(test_epoch() + chrono::Duration::seconds(5));
    let id = reservation.id;
    state.reservations.grant(reservation).unwrap();
    state.availability = Availability::Reserved;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(5)))
        .given_state(state)
        .when_action(QueueAction::ClaimCheck { reservation_id: id })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&c));
            assert_eq!(
                state.reservations.find(id).map(|r| r.status),
                Some(ReservationStatus::Released {
                    reason: ReleaseReason::Unclaimed
                })
            );
        })
        .then_effects(move |effects| assert_pushed(effects, c, EventKind::TurnGranted))
        .run();
}

#[test]
fn test_connecting_claims_the_turn() {
    let b = ClientId::new();
    let mut state = available_state();
    let reservation = ticket_queue_core::types::Reservation::new(
        state.resource_id,
        b,
        test_epoch(),
        test_epoch() + chrono::Duration::seconds(60),
    )
    .with_claim_deadline(test_epoch() + chrono::Duration::seconds(5));
    let id = reservation.id;
    state.reservations.grant(reservation).unwrap();
    state.availability = Availability::Reserved;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(2)))
        .given_state(state)
        .when_action(QueueAction::ClientConnected { client_id: b })
        .when_action(QueueAction::ClaimCheck { reservation_id: id })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            assert!(!state.reservations.active().unwrap().is_unclaimed());
        })
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn test_promotion_skips_clients_gone_past_grace() {
    let a = ClientId::new();
    let (b, c) = (ClientId::new(), ClientId::new());
    let state = StateBuilder::new(test_epoch())
        .holder(a)
        .waiting(&[b, c])
        .disconnected(b, test_epoch())
        .build();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(later(30)))
        .given_state(state)
        .when_action(QueueAction::ReleaseReservation { client_id: a })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&c));
            assert!(!state.queue.contains(&b));
        })
        .then_effects(move |effects| assert_nothing_pushed(effects, b))
        .run();
}

// ============================================================================
// Presence
// ============================================================================

#[test]
fn test_disconnect_schedules_grace_timer() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::ClientDisconnected { client_id: b })
        .then_state(move |state| {
            assert!(matches!(
                state.presence.get(&b),
                Some(Presence::Disconnected { epoch: 1, .. })
            ));
            assert!(state.queue.contains(&b));
        })
        .then_effects(move |effects| {
            let delay = assert_delay_scheduled(effects, |action| {
                *action
                    == QueueAction::DisconnectGraceElapsed {
                        client_id: b,
                        epoch: 1,
                    }
            });
            assert_eq!(delay, Duration::from_secs(10));
        })
        .run();
}

#[test]
fn test_grace_elapsed_removes_queued_client() {
    let a = ClientId::new();
    let (b, c) = (ClientId::new(), ClientId::new());

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b, c]).build())
        .when_action(QueueAction::ClientDisconnected { client_id: b })
        .when_action(QueueAction::DisconnectGraceElapsed {
            client_id: b,
            epoch: 1,
        })
        .then_state(move |state| {
            assert!(!state.queue.contains(&b));
            assert!(!state.presence.contains_key(&b));
            assert_eq!(state.queue.position(&c), Some(1));
        })
        .then_effects(move |effects| assert_pushed(effects, c, EventKind::PositionUpdate))
        .run();
}

#[test]
fn test_reconnect_makes_grace_timer_stale() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::ClientDisconnected { client_id: b })
        .when_action(QueueAction::ClientConnected { client_id: b })
        .when_action(QueueAction::DisconnectGraceElapsed {
            client_id: b,
            epoch: 1,
        })
        .then_state(move |state| {
            assert!(state.queue.contains(&b));
            assert!(state.is_connected(&b));
        })
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn test_disconnected_holder_keeps_turn_by_default() {
    let a = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).build())
        .when_action(QueueAction::ClientDisconnected { client_id: a })
        .when_action(QueueAction::DisconnectGraceElapsed {
            client_id: a,
            epoch: 1,
        })
        .then_state(move |state| assert!(state.reservations.is_holder(&a)))
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn test_disconnected_holder_released_under_release_policy() {
    let a = ClientId::new();
    let b = ClientId::new();
    let mut env = test_env(test_clock());
    env.config = test_config().with_holder_disconnect(HolderDisconnectPolicy::ReleaseAfterGrace);

    ReducerTest::new(QueueReducer)
        .with_env(env)
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::ClientDisconnected { client_id: a })
        .when_action(QueueAction::DisconnectGraceElapsed {
            client_id: a,
            epoch: 1,
        })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            assert_eq!(
                state.reservations.history().last().map(|r| r.status),
                Some(ReservationStatus::Released {
                    reason: ReleaseReason::HolderDisconnected
                })
            );
        })
        .then_effects(move |effects| assert_pushed(effects, b, EventKind::TurnGranted))
        .run();
}

#[test]
fn test_connect_pushes_current_view() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::ClientConnected { client_id: b })
        .then_effects(move |effects| assert_pushed(effects, b, EventKind::PositionUpdate))
        .run();
}

#[test]
fn test_reconnecting_holder_learns_turn_expired() {
    let a = ClientId::new();
    let b = ClientId::new();
    let env = test_env(later(60));
    let mut state = StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build();
    let id = state.reservations.active().unwrap().id;
    let _ = QueueReducer.reduce(&mut state, QueueAction::ClientDisconnected { client_id: a }, &env);
    let _ = QueueReducer.reduce(
        &mut state,
        QueueAction::ExpireIfDue {
            reservation_id: Some(id),
        },
        &env,
    );
    assert!(state.reservations.is_holder(&b));

    ReducerTest::new(QueueReducer)
        .with_env(env)
        .given_state(state)
        .when_action(QueueAction::ClientConnected { client_id: a })
        .then_effects(move |effects| {
            assert_eq!(pushes_for(effects, a), vec![&ServerEvent::dequeued(0)]);
            assert_nothing_pushed(effects, b);
        })
        .run();
}

#[test]
fn test_reconnecting_after_sale_learns_resource_gone() {
    let a = ClientId::new();
    let b = ClientId::new();
    let env = test_env(later(30));
    let mut state = StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build();
    let _ = QueueReducer.reduce(&mut state, QueueAction::ClientDisconnected { client_id: b }, &env);
    let _ = QueueReducer.reduce(&mut state, QueueAction::CompletePurchase { client_id: a }, &env);
    assert_eq!(state.availability, Availability::Sold);

    ReducerTest::new(QueueReducer)
        .with_env(env)
        .given_state(state)
        .when_action(QueueAction::ClientConnected { client_id: b })
        .then_effects(move |effects| {
            assert_eq!(
                pushes_for(effects, b),
                vec![&ServerEvent::ResourceGone {
                    reason: GoneReason::Sold
                }]
            );
        })
        .run();
}

#[test]
fn test_connecting_stranger_is_told_nothing() {
    let a = ClientId::new();
    let stranger = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).build())
        .when_action(QueueAction::ClientConnected {
            client_id: stranger,
        })
        .then_effects(move |effects| assert_nothing_pushed(effects, stranger))
        .run();
}

// ============================================================================
// Withdraw
// ============================================================================

#[test]
fn test_withdraw_notifies_holder_and_queue() {
    let a = ClientId::new();
    let b = ClientId::new();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(StateBuilder::new(test_epoch()).holder(a).waiting(&[b]).build())
        .when_action(QueueAction::Withdraw {
            reason: GoneReason::Withdrawn,
        })
        .then_state(|state| {
            assert_eq!(state.availability, Availability::Withdrawn);
            assert!(state.is_idle());
        })
        .then_effects(move |effects| {
            assert_availability_set(effects, Availability::Withdrawn);
            assert_pushed(effects, a, EventKind::ResourceGone);
            assert_pushed(effects, b, EventKind::ResourceGone);
        })
        .run();
}

#[test]
fn test_withdraw_terminal_resource_fails() {
    let mut state = available_state();
    state.availability = Availability::Sold;

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(state)
        .when_action(QueueAction::Withdraw {
            reason: GoneReason::Withdrawn,
        })
        .then_state(|state| {
            assert!(matches!(
                state.last_error,
                Some(QueueError::ResourceUnavailable { .. })
            ));
            assert_eq!(state.availability, Availability::Sold);
        })
        .then_effects(assert_no_effects)
        .run();
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_join_release_hands_over() {
    let a = ClientId::new();
    let b = ClientId::new();
    let state = StateBuilder::new(test_epoch())
        .connected(a)
        .connected(b)
        .build();

    ReducerTest::new(QueueReducer)
        .with_env(test_env(test_clock()))
        .given_state(state)
        .when_action(QueueAction::Join { client_id: a })
        .when_action(QueueAction::Join { client_id: b })
        .when_action(QueueAction::ReleaseReservation { client_id: a })
        .then_state(move |state| {
            assert!(state.reservations.is_holder(&b));
            assert!(state.queue.is_empty());
            assert_eq!(state.availability, Availability::Reserved);
        })
        .then_effects(move |effects| assert_pushed(effects, b, EventKind::TurnGranted))
        .run();
}
