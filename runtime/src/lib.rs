//! # Ticket Queue Runtime
//!
//! The imperative shell around the queue reducer.
//!
//! ## Core Components
//!
//! - **QueueManager**: per-resource critical sections, effect execution
//! - **Catalog**: the authority on resource availability
//! - **PushHub**: registry of open push channels
//! - **Timers**: delayed expiry, claim and grace checks plus the recovery sweep
//! - **Snapshots**: queue state persisted across restarts
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticket_queue_core::{QueueEnvironment, clock::SystemClock, config::QueueConfig};
//! use ticket_queue_runtime::{InMemoryCatalog, PushHub, QueueManager};
//!
//! # async fn example() -> Result<(), ticket_queue_core::QueueError> {
//! let catalog = InMemoryCatalog::new();
//! let ticket = catalog.create();
//! let env = QueueEnvironment::new(Arc::new(SystemClock), QueueConfig::default());
//! let manager = QueueManager::new(env, Arc::new(catalog), PushHub::new());
//!
//! let outcome = manager.join(ticket, ticket_queue_core::types::ClientId::new()).await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

/// Catalog of resources and their availability
pub mod catalog;

/// Queue manager: per-resource mutual exclusion around the reducer
pub mod manager;

/// Prometheus metrics for observability
pub mod metrics;

/// Push channel registry
pub mod push;

/// Queue state snapshots
pub mod snapshot;

/// Delayed actions and the recovery sweep
pub mod timer;

/// Error types for the runtime
pub mod error {
    use crate::metrics::MetricsError;
    use thiserror::Error;
    use ticket_queue_core::error::QueueError;

    /// Errors from runtime operations outside a single queue command
    #[derive(Error, Debug)]
    pub enum RuntimeError {
        /// A queue command failed
        #[error(transparent)]
        Queue(#[from] QueueError),

        /// Snapshot file could not be read or written
        #[error("Snapshot I/O failed: {0}")]
        Io(#[from] std::io::Error),

        /// Snapshot could not be encoded or decoded
        #[error("Snapshot serialization failed: {0}")]
        Serialization(#[from] serde_json::Error),

        /// Metrics exporter setup failed
        #[error(transparent)]
        Metrics(#[from] MetricsError),
    }
}

pub use catalog::{Catalog, InMemoryCatalog};
pub use error::RuntimeError;
pub use manager::QueueManager;
pub use push::{ConnectionId, PushHub, Subscription};
pub use snapshot::QueueSnapshot;
pub use timer::spawn_sweeper;
