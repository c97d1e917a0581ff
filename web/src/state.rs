//! Application state shared by all handlers.

use crate::config::WebSocketConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use ticket_queue_runtime::{InMemoryCatalog, QueueManager};

/// Application state shared across all HTTP handlers.
///
/// Cheap to clone; every clone shares the same manager and catalog.
#[derive(Clone)]
pub struct AppState {
    /// Queue manager for all tickets
    pub manager: QueueManager,
    /// Ticket catalog
    pub catalog: InMemoryCatalog,
    /// Push channel settings
    pub websocket: WebSocketConfig,
    /// Prometheus renderer, if this process installed the recorder
    pub metrics: Option<PrometheusHandle>,
    /// Open push channels on this instance
    pub active_connections: Arc<AtomicUsize>,
}

impl AppState {
    /// Create the application state.
    #[must_use]
    pub fn new(manager: QueueManager, catalog: InMemoryCatalog, websocket: WebSocketConfig) -> Self {
        Self {
            manager,
            catalog,
            websocket,
            metrics: None,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `/metrics` from this handle
    #[must_use]
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}
