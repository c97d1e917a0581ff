//! Wait estimation: `position × per-turn service time`.

use crate::config::{EstimateMode, QueueConfig};
use crate::types::WaitEstimate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Per-resource service time estimator.
///
/// In fixed mode the configured service time is used as-is. In rolling mode
/// the mean of the last `window` observed turn durations is used once at least
/// one turn has finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTimeEstimator {
    mode: EstimateMode,
    fallback: Duration,
    window: usize,
    samples: VecDeque<Duration>,
}

impl ServiceTimeEstimator {
    /// Build an estimator from the queue configuration
    #[must_use]
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            mode: config.estimate_mode,
            fallback: config.estimate_service,
            window: config.rolling_window.max(1),
            samples: VecDeque::new(),
        }
    }

    /// Record how long a finished turn lasted. Ignored in fixed mode.
    pub fn record(&mut self, turn: Duration) {
        if self.mode == EstimateMode::Fixed {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(turn);
    }

    /// Service time currently assumed for one turn
    #[must_use]
    pub fn service_time(&self) -> Duration {
        match self.mode {
            EstimateMode::Fixed => self.fallback,
            EstimateMode::Rolling => {
                let count = u32::try_from(self.samples.len()).unwrap_or(u32::MAX);
                if count == 0 {
                    return self.fallback;
                }
                self.samples.iter().sum::<Duration>() / count
            },
        }
    }

    /// Estimate for the client at `position` (1-indexed) of `total_in_queue`
    #[must_use]
    pub fn estimate(&self, position: usize, total_in_queue: usize) -> WaitEstimate {
        let per_turn = self.service_time().as_secs();
        let position_u64 = u64::try_from(position).unwrap_or(u64::MAX);
        WaitEstimate {
            position,
            total_in_queue,
            estimated_wait_seconds: per_turn.saturating_mul(position_u64),
        }
    }

    /// Number of samples held
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}
