//! HTTP and WebSocket surface for the ticket queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← HTTP, JSON, WebSocket
//! │  - Request parsing, client identity     │
//! │  - Push channel lifecycle               │
//! ├─────────────────────────────────────────┤
//! │         QueueManager (runtime)          │  ← per-ticket critical sections
//! ├─────────────────────────────────────────┤
//! │         QueueReducer (core)             │  ← pure state machine
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ticket_queue_core::{QueueEnvironment, clock::SystemClock, config::QueueConfig};
//! use ticket_queue_runtime::{InMemoryCatalog, PushHub, QueueManager};
//! use ticket_queue_web::{AppState, config::WebSocketConfig, routes::build_router};
//!
//! let catalog = InMemoryCatalog::new();
//! let env = QueueEnvironment::new(Arc::new(SystemClock), QueueConfig::default());
//! let manager = QueueManager::new(env, Arc::new(catalog.clone()), PushHub::new());
//! let app = build_router(AppState::new(manager, catalog, WebSocketConfig::default()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use extractors::{CLIENT_ID_HEADER, ClientIdentity};
pub use routes::build_router;
pub use state::AppState;
