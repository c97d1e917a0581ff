//! Client error types.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors raised by the push channel driver
#[derive(Error, Debug)]
pub enum ClientError {
    /// The WebSocket transport failed (connect, read or write)
    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    /// A frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The endpoint or identity header could not be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The driver task did not run to completion
    #[error("Driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Every reconnection attempt failed
    #[error("Connection lost after {attempts} reconnection attempts")]
    RetriesExhausted {
        /// Attempts made before giving up
        attempts: usize,
    },
}
