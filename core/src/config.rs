//! Queue timing and estimation settings.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What happens to a reservation whose holder's connection drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderDisconnectPolicy {
    /// The holder keeps the turn until the purchase deadline
    KeepUntilDeadline,
    /// The turn is released once the disconnect grace elapses
    ReleaseAfterGrace,
}

impl FromStr for HolderDisconnectPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep_until_deadline" | "keep" => Ok(Self::KeepUntilDeadline),
            "release_after_grace" | "release" => Ok(Self::ReleaseAfterGrace),
            _ => Err(ConfigError::InvalidValue {
                key: "holder_disconnect".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// How the per-turn service time behind wait estimates is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMode {
    /// Always use the configured service time
    Fixed,
    /// Mean of recently observed turn durations
    Rolling,
}

impl FromStr for EstimateMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "rolling" => Ok(Self::Rolling),
            _ => Err(ConfigError::InvalidValue {
                key: "estimate_mode".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for EstimateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fixed => "fixed",
            Self::Rolling => "rolling",
        })
    }
}

/// Queue configuration injected into the reducer environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Length of the purchase window granted to a holder
    pub reservation_window: Duration,
    /// Assumed duration of one turn, used for wait estimates
    pub estimate_service: Duration,
    /// Time before an unresponsive client is treated as gone
    pub disconnect_grace: Duration,
    /// Time a promoted but disconnected client has to connect
    pub claim_grace: Duration,
    /// Whether a disconnected holder loses the turn early
    pub holder_disconnect: HolderDisconnectPolicy,
    /// Fixed or rolling-average wait estimates
    pub estimate_mode: EstimateMode,
    /// Number of turn durations kept for the rolling average
    pub rolling_window: usize,
    /// Interval of the recovery sweep over active reservations
    pub sweep_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reservation_window: Duration::from_secs(15 * 60),
            estimate_service: Duration::from_secs(60),
            disconnect_grace: Duration::from_secs(30),
            claim_grace: Duration::from_secs(15),
            holder_disconnect: HolderDisconnectPolicy::KeepUntilDeadline,
            estimate_mode: EstimateMode::Fixed,
            rolling_window: 20,
            sweep_interval: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Set the purchase window
    #[must_use]
    pub const fn with_reservation_window(mut self, window: Duration) -> Self {
        self.reservation_window = window;
        self
    }

    /// Set the assumed per-turn service time
    #[must_use]
    pub const fn with_estimate_service(mut self, service: Duration) -> Self {
        self.estimate_service = service;
        self
    }

    /// Set the disconnect grace
    #[must_use]
    pub const fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = grace;
        self
    }

    /// Set the claim grace for promoted clients
    #[must_use]
    pub const fn with_claim_grace(mut self, grace: Duration) -> Self {
        self.claim_grace = grace;
        self
    }

    /// Set the holder disconnect policy
    #[must_use]
    pub const fn with_holder_disconnect(mut self, policy: HolderDisconnectPolicy) -> Self {
        self.holder_disconnect = policy;
        self
    }

    /// Use rolling-average estimates over `window` samples
    #[must_use]
    pub const fn with_rolling_estimate(mut self, window: usize) -> Self {
        self.estimate_mode = EstimateMode::Rolling;
        self.rolling_window = window;
        self
    }

    /// Set the recovery sweep interval
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Check the settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a duration is zero or the claim grace exceeds
    /// the reservation window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("reservation_window", self.reservation_window),
            ("estimate_service", self.estimate_service),
            ("disconnect_grace", self.disconnect_grace),
            ("claim_grace", self.claim_grace),
            ("sweep_interval", self.sweep_interval),
        ];
        if let Some((field, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration { field });
        }

        if self.claim_grace > self.reservation_window {
            return Err(ConfigError::ClaimGraceTooLong {
                claim_secs: self.claim_grace.as_secs(),
                window_secs: self.reservation_window.as_secs(),
            });
        }

        if self.estimate_mode == EstimateMode::Rolling && self.rolling_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rolling_window".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}
