//! Router configuration.

use crate::handlers::{health, tickets, websocket};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Health and metrics live at the root; ticket and queue endpoints under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/:id", get(tickets::get_ticket))
        .route(
            "/tickets/:id/queue",
            post(tickets::join_queue)
                .delete(tickets::leave_queue)
                .get(tickets::queue_status),
        )
        .route(
            "/tickets/:id/reservation/complete",
            post(tickets::complete_purchase),
        )
        .route(
            "/tickets/:id/reservation/release",
            post(tickets::release_reservation),
        )
        .route("/tickets/:id/withdraw", post(tickets::withdraw_ticket))
        .route("/tickets/:id/ws", get(websocket::push_channel));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
