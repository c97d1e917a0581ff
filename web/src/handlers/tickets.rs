//! Ticket and queue endpoints.
//!
//! ```text
//! POST   /api/tickets                              create a ticket
//! GET    /api/tickets/:id                          ticket availability
//! POST   /api/tickets/:id/queue                    join (201 granted, 202 queued, 206 already holding)
//! DELETE /api/tickets/:id/queue                    opt out
//! GET    /api/tickets/:id/queue                    current view (poll fallback)
//! POST   /api/tickets/:id/reservation/complete     purchase completed
//! POST   /api/tickets/:id/reservation/release      give up the turn
//! POST   /api/tickets/:id/withdraw                 take the ticket off sale
//! ```
//!
//! Every queue endpoint identifies the caller through [`ClientIdentity`].

use crate::error::AppError;
use crate::extractors::ClientIdentity;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_queue_core::error::QueueError;
use ticket_queue_core::types::{Availability, ClientView, JoinOutcome, ResourceId};
use uuid::Uuid;

/// A ticket and its availability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    /// Ticket ID
    pub resource_id: ResourceId,
    /// Current availability
    pub availability: Availability,
}

/// The caller's view of a ticket's queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatusResponse {
    /// Ticket availability
    pub availability: Availability,
    /// Holding, queued or not queued
    #[serde(flatten)]
    pub view: ClientView,
    /// Server time, for anchoring countdowns
    pub server_time: DateTime<Utc>,
}

/// Create a new, available ticket.
#[allow(clippy::unused_async)]
pub async fn create_ticket(State(state): State<AppState>) -> (StatusCode, Json<TicketResponse>) {
    let resource_id = state.catalog.create();
    tracing::info!(resource_id = %resource_id, "Ticket created");

    (
        StatusCode::CREATED,
        Json(TicketResponse {
            resource_id,
            availability: Availability::Available,
        }),
    )
}

/// Look up a ticket's availability.
///
/// # Errors
///
/// 404 if the ticket does not exist.
#[allow(clippy::unused_async)]
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketResponse>, AppError> {
    let resource_id = ResourceId::from_uuid(id);
    let availability = state
        .catalog
        .get(&resource_id)
        .ok_or(QueueError::ResourceNotFound(resource_id))?;

    Ok(Json(TicketResponse {
        resource_id,
        availability,
    }))
}

/// Join the queue for a ticket.
///
/// `201 Created` when the turn is granted by this request, `202 Accepted`
/// when queued, `206 Partial Content` when the caller already holds the turn.
///
/// # Errors
///
/// 410 if the ticket is sold or withdrawn, 404 if it does not exist.
pub async fn join_queue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ClientIdentity(client_id): ClientIdentity,
) -> Result<(StatusCode, Json<JoinOutcome>), AppError> {
    let outcome = state
        .manager
        .join(ResourceId::from_uuid(id), client_id)
        .await?;

    let status = match outcome {
        JoinOutcome::Granted { .. } => StatusCode::CREATED,
        JoinOutcome::Queued(_) => StatusCode::ACCEPTED,
        JoinOutcome::AlreadyHolding { .. } => StatusCode::PARTIAL_CONTENT,
    };
    Ok((status, Json(outcome)))
}

/// Leave the queue, or release the turn if holding it.
///
/// # Errors
///
/// 404 if the ticket does not exist.
pub async fn leave_queue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ClientIdentity(client_id): ClientIdentity,
) -> Result<StatusCode, AppError> {
    state
        .manager
        .leave(ResourceId::from_uuid(id), client_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The caller's current view, for clients that lost their push channel.
///
/// # Errors
///
/// 404 if the ticket does not exist.
pub async fn queue_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ClientIdentity(client_id): ClientIdentity,
) -> Result<Json<QueueStatusResponse>, AppError> {
    let (view, availability) = state
        .manager
        .view(ResourceId::from_uuid(id), client_id)
        .await?;

    Ok(Json(QueueStatusResponse {
        availability,
        view,
        server_time: state.manager.now(),
    }))
}

/// Payment collaborator callback: the holder's purchase succeeded.
///
/// # Errors
///
/// 409 if the caller does not hold the reservation.
pub async fn complete_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ClientIdentity(client_id): ClientIdentity,
) -> Result<StatusCode, AppError> {
    state
        .manager
        .complete_purchase(ResourceId::from_uuid(id), client_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The holder gives up the turn.
///
/// # Errors
///
/// 409 if the caller does not hold the reservation.
pub async fn release_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ClientIdentity(client_id): ClientIdentity,
) -> Result<StatusCode, AppError> {
    state
        .manager
        .release_reservation(ResourceId::from_uuid(id), client_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Take a ticket off sale, notifying everyone waiting.
///
/// # Errors
///
/// 410 if the ticket is already sold or withdrawn.
pub async fn withdraw_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.manager.withdraw(ResourceId::from_uuid(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
