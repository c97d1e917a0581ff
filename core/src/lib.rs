//! # Ticket Queue Core
//!
//! Pure domain logic for single-holder ticket admission: at most one client
//! holds the right to buy a scarce resource at a time, everyone else waits in
//! a FIFO line and is promoted when the holder completes, releases or runs
//! out of time.
//!
//! ## Core Concepts
//!
//! - **State**: [`state::ResourceState`], one per resource
//! - **Action**: [`admission::QueueAction`], commands and the events they produce
//! - **Reducer**: [`admission::QueueReducer`], `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: [`effect::Effect`], pushes, catalog writes and timers as values
//! - **Environment**: [`admission::QueueEnvironment`], clock and configuration
//!
//! The runtime crate owns locking, timers and transport; this crate performs
//! no I/O.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use ticket_queue_core::admission::{QueueAction, QueueEnvironment, QueueReducer};
//! use ticket_queue_core::clock::SystemClock;
//! use ticket_queue_core::config::QueueConfig;
//! use ticket_queue_core::reducer::Reducer;
//! use ticket_queue_core::state::ResourceState;
//! use ticket_queue_core::types::{Availability, ClientId, JoinOutcome, ResourceId};
//!
//! let config = QueueConfig::default();
//! let env = QueueEnvironment::new(Arc::new(SystemClock), config.clone());
//! let mut state = ResourceState::new(ResourceId::new(), Availability::Available, &config);
//!
//! let client = ClientId::new();
//! let _effects = QueueReducer.reduce(&mut state, QueueAction::Join { client_id: client }, &env);
//!
//! assert!(matches!(
//!     state.outcome_for(&client),
//!     Some(JoinOutcome::AlreadyHolding { .. })
//! ));
//! ```

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod estimate;
pub mod protocol;
pub mod queue;
pub mod reservation;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

pub use admission::{QueueAction, QueueEnvironment, QueueReducer};
pub use error::{ConfigError, QueueError};

/// Reducer module - The core trait for business logic
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// Reducers are pure: they validate the action, update state in place and
    /// return descriptions of the side effects the runtime should perform.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are NOT executed by the reducer. They are values returned to the
/// runtime, which executes them while still holding the resource's critical
/// section.
pub mod effect {
    use crate::protocol::ServerEvent;
    use crate::types::{Availability, ClientId};
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    #[derive(Debug, Clone, PartialEq)]
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Deliver an event to one client's push channel
        Push {
            /// Recipient
            client_id: ClientId,
            /// Event to deliver
            event: ServerEvent,
        },

        /// Write the resource's availability to the catalog
        SetAvailability(Availability),

        /// Delayed action (expiry, claim and disconnect timers)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },
    }

    impl<Action> Effect<Action> {
        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}
