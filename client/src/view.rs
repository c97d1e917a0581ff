//! Client-side queue view.
//!
//! [`QueueView`] folds pushed [`ServerEvent`]s into a [`Phase`] through a
//! dispatch table keyed by [`EventKind`], one handler per kind. Countdowns
//! are anchored on the local clock when an event arrives and re-derived on
//! every read, so a display that stops redrawing for a while (suspended tab,
//! sleeping laptop) shows the right value as soon as it redraws.
//!
//! ```text
//! Connecting ──position_update──> Waiting ──turn_granted──> TurnGranted
//!     │                              │                          │
//!     └──────────────┬───────────────┴──────────────────────────┘
//!                    ├─ position 0 ──> Dequeued
//!                    ├─ resource_gone ──> ResourceGone   (terminal)
//!                    ├─ opted_out ──> OptedOut           (terminal)
//!                    └─ retries exhausted ──> ConnectionLost (terminal)
//! ```
//!
//! An estimate reaching zero is not a promotion: the view keeps `Waiting`
//! and reports `estimate_elapsed` until the server says otherwise.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use ticket_queue_core::clock::{Clock, Countdown};
use ticket_queue_core::protocol::{ClientMessage, EventKind, GoneReason, ServerEvent};
use ticket_queue_core::types::ReservationId;

// ============================================================================
// Phase
// ============================================================================

/// Where the client stands in a resource's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Channel open (or opening), nothing heard yet
    Connecting,

    /// In line
    Waiting {
        /// 1-indexed place in line
        position: usize,
        /// Clients currently waiting
        total_in_queue: usize,
        /// Countdown over the server's wait estimate
        countdown: Countdown,
    },

    /// The client holds the reservation and may purchase
    TurnGranted {
        /// Reservation to purchase under
        reservation_id: ReservationId,
        /// Absolute deadline, server clock
        deadline: DateTime<Utc>,
        /// Countdown over the purchase window
        countdown: Countdown,
    },

    /// The server reported the client is no longer queued (the turn ran out,
    /// or the entry timed out). The client may join again.
    Dequeued,

    /// The resource was sold or withdrawn
    ResourceGone {
        /// Sold or withdrawn
        reason: GoneReason,
    },

    /// The client left voluntarily
    OptedOut,

    /// Reconnection gave up
    ConnectionLost,
}

impl Phase {
    /// Whether no further event can change this phase
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResourceGone { .. } | Self::OptedOut | Self::ConnectionLost
        )
    }

    /// Snapshot for rendering at local time `now`
    #[must_use]
    pub fn frame(&self, now: DateTime<Utc>) -> ViewFrame {
        let mut frame = ViewFrame {
            phase: self.to_string(),
            position: None,
            total_in_queue: None,
            remaining_seconds: None,
            remaining_text: None,
            estimate_elapsed: false,
            progress: None,
        };

        match self {
            Self::Waiting {
                position,
                total_in_queue,
                countdown,
            } => {
                let remaining = countdown.remaining_seconds(now);
                frame.position = Some(*position);
                frame.total_in_queue = Some(*total_in_queue);
                frame.remaining_seconds = Some(remaining);
                frame.estimate_elapsed = countdown.is_elapsed(now);
                frame.remaining_text = Some(if frame.estimate_elapsed {
                    "still waiting".to_string()
                } else {
                    format_wait(remaining)
                });
                frame.progress = Some(countdown.progress(now));
            },
            Self::TurnGranted { countdown, .. } => {
                let remaining = countdown.remaining_seconds(now);
                frame.remaining_seconds = Some(remaining);
                frame.remaining_text = Some(format_wait(remaining));
                frame.progress = Some(countdown.progress(now));
            },
            _ => {},
        }

        frame
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Waiting { .. } => "waiting",
            Self::TurnGranted { .. } => "turn_granted",
            Self::Dequeued => "dequeued",
            Self::ResourceGone { .. } => "resource_gone",
            Self::OptedOut => "opted_out",
            Self::ConnectionLost => "connection_lost",
        };
        f.write_str(name)
    }
}

/// What a client application should draw
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFrame {
    /// Phase name
    pub phase: String,
    /// Place in line, while waiting
    pub position: Option<usize>,
    /// Queue size, while waiting
    pub total_in_queue: Option<usize>,
    /// Whole seconds left on the active countdown
    pub remaining_seconds: Option<u64>,
    /// Human-readable countdown
    pub remaining_text: Option<String>,
    /// The wait estimate ran out without a turn being granted
    pub estimate_elapsed: bool,
    /// Countdown progress in `0.0..=1.0`
    pub progress: Option<f64>,
}

/// Format a countdown as "45 seconds" or "2 minutes 5 seconds"
#[must_use]
pub fn format_wait(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds} seconds");
    }
    format!("{} minutes {} seconds", seconds / 60, seconds % 60)
}

// ============================================================================
// Reactions
// ============================================================================

/// What the application should do after an event was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// Nothing changed (duplicate, or the view is already final)
    Ignored,
    /// The phase changed; redraw
    Updated,
    /// The turn was granted: perform the purchase under this reservation
    BeginPurchase(ReservationId),
    /// The view reached a terminal phase; leave the queue screen
    Finished,
    /// The server rejected a frame
    Rejected(String),
}

// ============================================================================
// QueueView
// ============================================================================

/// Event handler in the dispatch table
pub type Handler = fn(&mut QueueView, ServerEvent) -> Reaction;

/// Client queue state driven by pushed events
#[derive(Clone)]
pub struct QueueView {
    phase: Phase,
    clock: Arc<dyn Clock>,
    handlers: HashMap<EventKind, Handler>,
    leaving: bool,
}

impl fmt::Debug for QueueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueView")
            .field("phase", &self.phase)
            .field("leaving", &self.leaving)
            .finish_non_exhaustive()
    }
}

impl QueueView {
    /// Fresh view anchored on `clock` (the local clock)
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut handlers: HashMap<EventKind, Handler> = HashMap::new();
        handlers.insert(EventKind::PositionUpdate, Self::on_position_update);
        handlers.insert(EventKind::TurnGranted, Self::on_turn_granted);
        handlers.insert(EventKind::ResourceGone, Self::on_resource_gone);
        handlers.insert(EventKind::OptedOut, Self::on_opted_out);
        handlers.insert(EventKind::Error, Self::on_error);

        Self {
            phase: Phase::Connecting,
            clock,
            handlers,
            leaving: false,
        }
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Render the current phase at the local clock's now
    #[must_use]
    pub fn frame(&self) -> ViewFrame {
        self.phase.frame(self.clock.now())
    }

    /// Whether an opt-out was requested and not yet acknowledged
    #[must_use]
    pub const fn is_leaving(&self) -> bool {
        self.leaving
    }

    /// Whether a (re)connected channel should announce a join.
    ///
    /// A holder is not re-joined: if the turn lapsed while offline, joining
    /// would quietly put them back in line.
    #[must_use]
    pub const fn wants_join(&self) -> bool {
        !self.leaving && matches!(self.phase, Phase::Connecting | Phase::Waiting { .. })
    }

    /// Apply one pushed event
    pub fn apply(&mut self, event: ServerEvent) -> Reaction {
        if self.phase.is_terminal() {
            return Reaction::Ignored;
        }
        match self.handlers.get(&event.kind()).copied() {
            Some(handler) => handler(self, event),
            None => Reaction::Ignored,
        }
    }

    /// Apply a raw text frame
    ///
    /// # Errors
    ///
    /// Returns the decode error for frames that are not a [`ServerEvent`].
    pub fn apply_frame(&mut self, text: &str) -> Result<Reaction, serde_json::Error> {
        let event = serde_json::from_str(text)?;
        Ok(self.apply(event))
    }

    /// Request to leave the queue (or give up the turn).
    ///
    /// Returns the frame to send, or `None` if there is nothing to leave.
    /// The phase only becomes [`Phase::OptedOut`] once the server confirms.
    pub fn opt_out(&mut self) -> Option<ClientMessage> {
        if self.phase.is_terminal() || matches!(self.phase, Phase::Dequeued) {
            return None;
        }
        self.leaving = true;
        Some(ClientMessage::Leave)
    }

    /// Ask to join again after being dequeued.
    ///
    /// Returns the frame to send, or `None` from any other phase.
    pub fn rejoin(&mut self) -> Option<ClientMessage> {
        if !matches!(self.phase, Phase::Dequeued) {
            return None;
        }
        self.phase = Phase::Connecting;
        Some(ClientMessage::Join)
    }

    /// Reconnection gave up; the view stays in [`Phase::ConnectionLost`]
    pub fn connection_lost(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = Phase::ConnectionLost;
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    fn on_position_update(&mut self, event: ServerEvent) -> Reaction {
        let ServerEvent::PositionUpdate {
            position,
            total_in_queue,
            estimated_wait_seconds,
        } = event
        else {
            return Reaction::Ignored;
        };

        if position == 0 {
            if self.leaving {
                // The opt-out raced a dequeue; either way the client is out
                self.leaving = false;
                self.phase = Phase::OptedOut;
                return Reaction::Finished;
            }
            if self.phase == Phase::Dequeued {
                return Reaction::Ignored;
            }
            self.phase = Phase::Dequeued;
            return Reaction::Updated;
        }

        // Re-anchor only on a new estimate, so duplicates do not reset the countdown
        if let Phase::Waiting {
            position: current,
            total_in_queue: total,
            countdown,
        } = &self.phase
        {
            if *current == position
                && *total == total_in_queue
                && countdown.total().as_secs() == estimated_wait_seconds
            {
                return Reaction::Ignored;
            }
        }

        self.phase = Phase::Waiting {
            position,
            total_in_queue,
            countdown: Countdown::from_estimate(estimated_wait_seconds, self.clock.now()),
        };
        Reaction::Updated
    }

    fn on_turn_granted(&mut self, event: ServerEvent) -> Reaction {
        let ServerEvent::TurnGranted {
            reservation_id,
            deadline,
            server_time,
            ..
        } = event
        else {
            return Reaction::Ignored;
        };

        if let Phase::TurnGranted {
            reservation_id: current,
            ..
        } = &self.phase
        {
            if *current == reservation_id {
                tracing::debug!(reservation_id = %reservation_id, "Duplicate turn grant ignored");
                return Reaction::Ignored;
            }
        }

        self.phase = Phase::TurnGranted {
            reservation_id,
            deadline,
            countdown: Countdown::until_deadline(deadline, server_time, self.clock.now()),
        };
        Reaction::BeginPurchase(reservation_id)
    }

    fn on_resource_gone(&mut self, event: ServerEvent) -> Reaction {
        let ServerEvent::ResourceGone { reason } = event else {
            return Reaction::Ignored;
        };
        self.phase = Phase::ResourceGone { reason };
        Reaction::Finished
    }

    fn on_opted_out(&mut self, _event: ServerEvent) -> Reaction {
        self.leaving = false;
        self.phase = Phase::OptedOut;
        Reaction::Finished
    }

    fn on_error(&mut self, event: ServerEvent) -> Reaction {
        let ServerEvent::Error { message } = event else {
            return Reaction::Ignored;
        };
        tracing::warn!(%message, "Server rejected a frame");
        Reaction::Rejected(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::time::Duration;
    use ticket_queue_core::types::WaitEstimate;
    use ticket_queue_testing::mocks::{ManualClock, manual_clock};

    fn view() -> (ManualClock, QueueView) {
        let clock = manual_clock();
        let view = QueueView::new(Arc::new(clock.clone()));
        (clock, view)
    }

    fn position(position: usize, total: usize, estimate: u64) -> ServerEvent {
        ServerEvent::position(WaitEstimate {
            position,
            total_in_queue: total,
            estimated_wait_seconds: estimate,
        })
    }

    fn granted(clock: &ManualClock, reservation_id: ReservationId, window: u64) -> ServerEvent {
        let server_time = clock.now();
        ServerEvent::TurnGranted {
            reservation_id,
            deadline: server_time + chrono::Duration::seconds(window.try_into().unwrap()),
            server_time,
            window_seconds: window,
        }
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(0), "0 seconds");
        assert_eq!(format_wait(45), "45 seconds");
        assert_eq!(format_wait(60), "1 minutes 0 seconds");
        assert_eq!(format_wait(125), "2 minutes 5 seconds");
    }

    #[test]
    fn test_position_update_starts_anchored_countdown() {
        let (clock, mut view) = view();
        assert_eq!(view.phase(), &Phase::Connecting);

        assert_eq!(view.apply(position(2, 3, 120)), Reaction::Updated);
        clock.advance(Duration::from_secs(45));

        let frame = view.frame();
        assert_eq!(frame.phase, "waiting");
        assert_eq!(frame.position, Some(2));
        assert_eq!(frame.total_in_queue, Some(3));
        assert_eq!(frame.remaining_seconds, Some(75));
        assert_eq!(frame.remaining_text.as_deref(), Some("1 minutes 15 seconds"));
        assert!(!frame.estimate_elapsed);
    }

    #[test]
    fn test_elapsed_estimate_is_still_waiting() {
        let (clock, mut view) = view();
        view.apply(position(1, 1, 30));
        clock.advance(Duration::from_secs(90));

        let frame = view.frame();
        assert_eq!(frame.phase, "waiting");
        assert_eq!(frame.remaining_seconds, Some(0));
        assert!(frame.estimate_elapsed);
        assert_eq!(frame.remaining_text.as_deref(), Some("still waiting"));
    }

    #[test]
    fn test_duplicate_position_update_keeps_anchor() {
        let (clock, mut view) = view();
        view.apply(position(1, 2, 60));
        clock.advance(Duration::from_secs(20));

        assert_eq!(view.apply(position(1, 2, 60)), Reaction::Ignored);
        assert_eq!(view.frame().remaining_seconds, Some(40));

        // A fresh estimate re-anchors
        assert_eq!(view.apply(position(1, 1, 60)), Reaction::Updated);
        assert_eq!(view.frame().remaining_seconds, Some(60));
    }

    #[test]
    fn test_turn_granted_once() {
        let (clock, mut view) = view();
        view.apply(position(1, 1, 30));

        let reservation_id = ReservationId::new();
        let event = granted(&clock, reservation_id, 60);
        assert_eq!(
            view.apply(event.clone()),
            Reaction::BeginPurchase(reservation_id)
        );

        clock.advance(Duration::from_secs(10));
        assert_eq!(view.apply(event), Reaction::Ignored);
        assert_eq!(view.frame().remaining_seconds, Some(50));
        assert!(!view.wants_join());
    }

    #[test]
    fn test_reservation_countdown_uses_server_window() {
        let (clock, mut view) = view();
        let server_time = clock.now() + chrono::Duration::minutes(5);
        let reservation_id = ReservationId::new();

        view.apply(ServerEvent::TurnGranted {
            reservation_id,
            deadline: server_time + chrono::Duration::seconds(60),
            server_time,
            window_seconds: 60,
        });

        assert_eq!(view.frame().remaining_seconds, Some(60));
        clock.advance(Duration::from_secs(61));
        assert_eq!(view.frame().remaining_seconds, Some(0));
        // Zero is a display floor; the phase does not change on its own
        assert!(matches!(view.phase(), Phase::TurnGranted { .. }));
    }

    #[test]
    fn test_position_zero_dequeues_and_allows_rejoin() {
        let (clock, mut view) = view();
        view.apply(granted(&clock, ReservationId::new(), 60));

        assert_eq!(view.apply(ServerEvent::dequeued(2)), Reaction::Updated);
        assert_eq!(view.phase(), &Phase::Dequeued);
        assert_eq!(view.apply(ServerEvent::dequeued(2)), Reaction::Ignored);
        assert_eq!(view.opt_out(), None);

        assert_eq!(view.rejoin(), Some(ClientMessage::Join));
        assert_eq!(view.phase(), &Phase::Connecting);
        assert!(view.wants_join());
        assert_eq!(view.rejoin(), None);
    }

    #[test]
    fn test_resource_gone_is_terminal() {
        let (_clock, mut view) = view();
        view.apply(position(3, 3, 90));

        let reaction = view.apply(ServerEvent::ResourceGone {
            reason: GoneReason::Sold,
        });
        assert_eq!(reaction, Reaction::Finished);
        assert_eq!(
            view.phase(),
            &Phase::ResourceGone {
                reason: GoneReason::Sold
            }
        );

        assert_eq!(view.apply(position(1, 1, 30)), Reaction::Ignored);
        assert_eq!(view.opt_out(), None);
    }

    #[test]
    fn test_opt_out_waits_for_acknowledgement() {
        let (_clock, mut view) = view();
        view.apply(position(1, 1, 30));

        assert_eq!(view.opt_out(), Some(ClientMessage::Leave));
        assert!(view.is_leaving());
        assert!(!view.wants_join());
        assert!(matches!(view.phase(), Phase::Waiting { .. }));

        assert_eq!(view.apply(ServerEvent::OptedOut), Reaction::Finished);
        assert_eq!(view.phase(), &Phase::OptedOut);
        assert!(!view.is_leaving());
    }

    #[test]
    fn test_connection_lost_is_persistent() {
        let (_clock, mut view) = view();
        view.apply(position(1, 1, 30));
        view.connection_lost();

        assert_eq!(view.phase(), &Phase::ConnectionLost);
        assert_eq!(view.apply(position(1, 1, 30)), Reaction::Ignored);
        assert_eq!(view.frame().phase, "connection_lost");
    }

    #[test]
    fn test_error_frames_do_not_change_phase() {
        let (_clock, mut view) = view();
        view.apply(position(1, 1, 30));

        let reaction = view
            .apply_frame(r#"{"type":"error","message":"Malformed message"}"#)
            .unwrap();
        assert_eq!(reaction, Reaction::Rejected("Malformed message".to_string()));
        assert!(matches!(view.phase(), Phase::Waiting { .. }));

        assert!(view.apply_frame("not json").is_err());
    }
}
