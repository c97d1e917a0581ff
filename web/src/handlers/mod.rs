//! HTTP request handlers.

pub mod health;
pub mod tickets;
pub mod websocket;

pub use health::health_check;
