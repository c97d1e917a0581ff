//! Server configuration loaded from environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! development server. Queue settings are validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use ticket_queue_core::config::{EstimateMode, HolderDisconnectPolicy, QueueConfig};
use ticket_queue_core::error::ConfigError;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Queue timing and estimation
    pub queue: QueueConfig,
    /// Push channel settings
    pub websocket: WebSocketConfig,
    /// Where queue state is persisted across restarts (`None` disables snapshots)
    pub snapshot_path: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Push channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Interval between keep-alive pings
    pub ping_interval: Duration,
    /// A connection with no inbound frame for this long is closed
    pub idle_timeout: Duration,
    /// Maximum concurrent push channels per server instance
    pub max_connections: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a policy name is not recognised or the queue
    /// settings are inconsistent.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secs = |key: &str, default: u64| {
            Duration::from_secs(
                lookup(key)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };
        let defaults = QueueConfig::default();

        let holder_disconnect = lookup("QUEUE_HOLDER_DISCONNECT")
            .map(|s| HolderDisconnectPolicy::from_str(&s))
            .transpose()?
            .unwrap_or(defaults.holder_disconnect);
        let estimate_mode = lookup("QUEUE_ESTIMATE_MODE")
            .map(|s| EstimateMode::from_str(&s))
            .transpose()?
            .unwrap_or(defaults.estimate_mode);

        let queue = QueueConfig {
            reservation_window: secs(
                "QUEUE_RESERVATION_WINDOW_SECONDS",
                defaults.reservation_window.as_secs(),
            ),
            estimate_service: secs(
                "QUEUE_ESTIMATE_SERVICE_SECONDS",
                defaults.estimate_service.as_secs(),
            ),
            disconnect_grace: secs(
                "QUEUE_DISCONNECT_GRACE_SECONDS",
                defaults.disconnect_grace.as_secs(),
            ),
            claim_grace: secs("QUEUE_CLAIM_GRACE_SECONDS", defaults.claim_grace.as_secs()),
            holder_disconnect,
            estimate_mode,
            rolling_window: lookup("QUEUE_ROLLING_WINDOW")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rolling_window),
            sweep_interval: secs(
                "QUEUE_SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval.as_secs(),
            ),
        };
        queue.validate()?;

        let ws_defaults = WebSocketConfig::default();
        Ok(Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: lookup("PORT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
                log_level: lookup("RUST_LOG")
                    .unwrap_or_else(|| "info,ticket_queue=debug".to_string()),
                shutdown_timeout: lookup("SHUTDOWN_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            queue,
            websocket: WebSocketConfig {
                ping_interval: secs(
                    "WS_PING_INTERVAL_SECONDS",
                    ws_defaults.ping_interval.as_secs(),
                ),
                idle_timeout: secs(
                    "WS_IDLE_TIMEOUT_SECONDS",
                    ws_defaults.idle_timeout.as_secs(),
                ),
                max_connections: lookup("WS_MAX_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(ws_defaults.max_connections),
            },
            snapshot_path: lookup("QUEUE_SNAPSHOT_PATH")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
        })
    }

    /// Socket address string to bind
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
