//! Error taxonomy for queue and reservation operations.

use crate::types::{Availability, ClientId, ReservationId, ResourceId};
use thiserror::Error;

/// Errors returned by queue operations.
///
/// Repeated joins are not an error: they return the client's current outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The resource is not in a joinable state (sold or withdrawn).
    ///
    /// Terminal for the request; surfaced to users as "no longer available".
    #[error("resource {resource_id} is no longer available ({availability})")]
    ResourceUnavailable {
        /// Resource
        resource_id: ResourceId,
        /// Availability observed inside the critical section
        availability: Availability,
    },

    /// The catalog does not know the resource
    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    /// The caller tried to complete or release a reservation it does not own.
    ///
    /// The client's view is stale and it should re-sync.
    #[error("client {client_id} does not hold the active reservation for resource {resource_id}")]
    NotHolder {
        /// Resource
        resource_id: ResourceId,
        /// Caller
        client_id: ClientId,
    },

    /// A second active reservation was about to be created.
    ///
    /// Unreachable while every mutation runs inside the resource's critical
    /// section; reported instead of silently overwriting the holder.
    #[error("resource {resource_id} already has active reservation {reservation_id}")]
    ReservationConflict {
        /// Resource
        resource_id: ResourceId,
        /// The reservation that is already active
        reservation_id: ReservationId,
    },

    /// The catalog collaborator failed
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl QueueError {
    /// Whether retrying the same request later can succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Catalog(_))
    }
}

/// Invalid queue configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration that must be positive was zero
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Offending field
        field: &'static str,
    },

    /// The claim grace would outlive the purchase window
    #[error("claim grace ({claim_secs}s) must not exceed the reservation window ({window_secs}s)")]
    ClaimGraceTooLong {
        /// Configured claim grace in seconds
        claim_secs: u64,
        /// Configured reservation window in seconds
        window_secs: u64,
    },

    /// A value could not be parsed
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Setting name
        key: String,
        /// Raw value
        value: String,
    },
}
