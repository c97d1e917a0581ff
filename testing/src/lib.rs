//! # Ticket Queue Testing
//!
//! Testing utilities and helpers for the ticket queue.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - Environment and state builders
//! - Property-based testing strategies
//! - The `ReducerTest` Given-When-Then harness and effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use ticket_queue_testing::{ReducerTest, helpers, test_clock};
//!
//! ReducerTest::new(QueueReducer)
//!     .with_env(helpers::test_env(test_clock()))
//!     .given_state(helpers::available_state())
//!     .when_action(QueueAction::Join { client_id })
//!     .then_state(|state| assert!(state.reservations.is_holder(&client_id)))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use ticket_queue_core::clock::Clock;


/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, PoisonError, RwLock};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_queue_testing::mocks::FixedClock;
    /// use ticket_queue_core::clock::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the environment under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start the clock at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            if let Ok(by) = chrono::Duration::from_std(by) {
                *time += by;
            }
        }

        /// Jump to an absolute time (may go backwards)
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// The instant every test clock starts at: 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }

    /// Create a manual clock starting at [`test_epoch`]
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(test_epoch())
    }
}

/// Test helpers and utilities
pub mod helpers {
    use std::sync::Arc;
    use std::time::Duration;
    use ticket_queue_core::admission::QueueEnvironment;
    use ticket_queue_core::clock::Clock;
    use ticket_queue_core::config::QueueConfig;
    use ticket_queue_core::state::{Presence, ResourceState};
    use ticket_queue_core::types::{Availability, ClientId, Reservation, ResourceId};

    /// Configuration with short, round numbers: 60s window, 30s per turn,
    /// 10s disconnect grace, 5s claim grace
    #[must_use]
    pub fn test_config() -> QueueConfig {
        QueueConfig::default()
            .with_reservation_window(Duration::from_secs(60))
            .with_estimate_service(Duration::from_secs(30))
            .with_disconnect_grace(Duration::from_secs(10))
            .with_claim_grace(Duration::from_secs(5))
            .with_sweep_interval(Duration::from_secs(1))
    }

    /// Environment over [`test_config`] and the given clock
    #[must_use]
    pub fn test_env(clock: impl Clock + 'static) -> QueueEnvironment {
        QueueEnvironment::new(Arc::new(clock), test_config())
    }

    /// A fresh, available resource
    #[must_use]
    pub fn available_state() -> ResourceState {
        ResourceState::new(ResourceId::new(), Availability::Available, &test_config())
    }

    /// Builder for resource states with a holder and waiting clients
    #[derive(Debug, Clone)]
    pub struct StateBuilder {
        state: ResourceState,
        now: chrono::DateTime<chrono::Utc>,
    }

    impl StateBuilder {
        /// Start from an available resource at `now`
        #[must_use]
        pub fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
            Self {
                state: available_state(),
                now,
            }
        }

        /// Give `client_id` the active reservation, granted now with the test window
        #[must_use]
        pub fn holder(mut self, client_id: ClientId) -> Self {
            let deadline = self.now + chrono::Duration::seconds(60);
            let _ = self.state.reservations.grant(Reservation::new(
                self.state.resource_id,
                client_id,
                self.now,
                deadline,
            ));
            self.state.availability = Availability::Reserved;
            self.connected(client_id)
        }

        /// Append connected clients to the line, in order
        #[must_use]
        pub fn waiting(mut self, clients: &[ClientId]) -> Self {
            for client_id in clients {
                self.state
                    .queue
                    .enqueue(self.state.resource_id, *client_id, self.now);
                self = self.connected(*client_id);
            }
            self
        }

        /// Mark a client as connected
        #[must_use]
        pub fn connected(mut self, client_id: ClientId) -> Self {
            self.state
                .presence
                .insert(client_id, Presence::Connected { epoch: 0 });
            self
        }

        /// Mark a client as disconnected since `since`
        #[must_use]
        pub fn disconnected(
            mut self,
            client_id: ClientId,
            since: chrono::DateTime<chrono::Utc>,
        ) -> Self {
            self.state
                .presence
                .insert(client_id, Presence::Disconnected { epoch: 1, since });
            self
        }

        /// Forget a client's presence entirely
        #[must_use]
        pub fn never_connected(mut self, client_id: ClientId) -> Self {
            self.state.presence.remove(&client_id);
            self
        }

        /// Finish building
        #[must_use]
        pub fn build(self) -> ResourceState {
            self.state
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use ticket_queue_core::admission::QueueAction;
    use ticket_queue_core::types::ClientId;

    /// One step of a random queue workload, over a small pool of clients
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum QueueOp {
        /// Client `n` joins
        Join(usize),
        /// Client `n` opts out
        Leave(usize),
        /// Client `n` tries to release
        Release(usize),
        /// Client `n` tries to complete
        Complete(usize),
        /// Time advances by this many seconds, then the timer fires
        Tick(u64),
        /// Client `n` drops its connection
        Disconnect(usize),
        /// Client `n` reconnects
        Connect(usize),
    }

    impl QueueOp {
        /// The reducer action for this step, given the client pool
        #[must_use]
        pub fn action(self, clients: &[ClientId]) -> Option<QueueAction> {
            let pick = |n: usize| clients.get(n % clients.len().max(1)).copied();
            Some(match self {
                Self::Join(n) => QueueAction::Join { client_id: pick(n)? },
                Self::Leave(n) => QueueAction::Leave { client_id: pick(n)? },
                Self::Release(n) => QueueAction::ReleaseReservation { client_id: pick(n)? },
                Self::Complete(n) => QueueAction::CompletePurchase { client_id: pick(n)? },
                Self::Tick(_) => QueueAction::ExpireIfDue {
                    reservation_id: None,
                },
                Self::Disconnect(n) => QueueAction::ClientDisconnected { client_id: pick(n)? },
                Self::Connect(n) => QueueAction::ClientConnected { client_id: pick(n)? },
            })
        }
    }

    /// Strategy for a single operation over `clients` clients
    pub fn queue_op(clients: usize) -> impl Strategy<Value = QueueOp> {
        let n = 0..clients.max(1);
        prop_oneof![
            4 => n.clone().prop_map(QueueOp::Join),
            2 => n.clone().prop_map(QueueOp::Leave),
            1 => n.clone().prop_map(QueueOp::Release),
            1 => n.clone().prop_map(QueueOp::Complete),
            2 => (1u64..120).prop_map(QueueOp::Tick),
            1 => n.clone().prop_map(QueueOp::Disconnect),
            1 => n.prop_map(QueueOp::Connect),
        ]
    }

    /// Strategy for a workload of up to `len` operations
    pub fn queue_ops(clients: usize, len: usize) -> impl Strategy<Value = Vec<QueueOp>> {
        proptest::collection::vec(queue_op(clients), 1..len)
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, manual_clock, test_clock, test_epoch};
pub use reducer_test::{ReducerTest, assertions};
