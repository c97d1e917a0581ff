//! Prometheus metrics for the queue.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_queue_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_recorder()?;
//! if let Some(handle) = handle {
//!     println!("{}", handle.render());
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;
use ticket_queue_core::types::ReservationStatus;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Describe the queue metrics and install the Prometheus recorder.
///
/// Returns `None` if a recorder was already installed (tests, or a second
/// call); metrics are still recorded by the existing recorder.
///
/// # Errors
///
/// Returns error if the exporter cannot be built or installed.
pub fn install_recorder() -> Result<Option<PrometheusHandle>, MetricsError> {
    register_queue_metrics();

    let builder = PrometheusBuilder::new()
        // Turns last from seconds up to the full purchase window
        .set_buckets_for_metric(
            Matcher::Full("ticket_queue_reservation_duration_seconds".to_string()),
            &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    match builder.install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus metrics recorder installed");
            Ok(Some(handle))
        },
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains("already initialized") {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(None)
            } else {
                Err(MetricsError::Install(err_msg))
            }
        },
    }
}

/// Register all metric descriptions.
pub fn register_queue_metrics() {
    describe_counter!(
        "ticket_queue_joins_total",
        "Join requests by outcome (granted, already_holding, queued, rejected)"
    );
    describe_counter!(
        "ticket_queue_promotions_total",
        "Reservations granted to a client taken from the front of the queue"
    );
    describe_counter!(
        "ticket_queue_reservations_total",
        "Finalized reservations by terminal status"
    );
    describe_gauge!(
        "ticket_queue_depth",
        "Clients currently waiting across all resources"
    );
    describe_gauge!(
        "ticket_queue_active_connections",
        "Open push channel connections"
    );
    describe_histogram!(
        "ticket_queue_reservation_duration_seconds",
        "Time from grant to finalization of a reservation"
    );
}

/// Queue metrics recorder.
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a join request outcome.
    pub fn record_join(outcome: &'static str) {
        counter!("ticket_queue_joins_total", "outcome" => outcome).increment(1);
    }

    /// Record a promotion from the queue.
    pub fn record_promotion() {
        counter!("ticket_queue_promotions_total").increment(1);
    }

    /// Record a finalized reservation.
    pub fn record_reservation(status: &ReservationStatus, held_for: Option<Duration>) {
        counter!("ticket_queue_reservations_total", "status" => status.label()).increment(1);
        if let Some(held_for) = held_for {
            histogram!("ticket_queue_reservation_duration_seconds")
                .record(held_for.as_secs_f64());
        }
    }

    /// Adjust total queue depth by `delta` waiting clients.
    pub fn record_depth_change(delta: f64) {
        if delta > 0.0 {
            gauge!("ticket_queue_depth").increment(delta);
        } else if delta < 0.0 {
            gauge!("ticket_queue_depth").decrement(-delta);
        }
    }

    /// Record the number of open push channels.
    #[allow(clippy::cast_precision_loss)] // Connection counts stay far below 2^52
    pub fn record_connections(count: usize) {
        gauge!("ticket_queue_active_connections").set(count as f64);
    }
}
