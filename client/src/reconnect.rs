//! Reconnection policy for the push channel.
//!
//! After a transport loss the driver waits `delay_for_attempt(n)` before
//! reconnect attempt `n` (0-based) and gives up once `max_attempts` attempts
//! have failed. A successful connection resets the count.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use ticket_queue_client::ReconnectPolicy;
//!
//! let policy = ReconnectPolicy::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(500))
//!     .max_delay(Duration::from_secs(2))
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(500));
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(2));
//! ```

use std::time::Duration;

/// Bounded exponential backoff between reconnection attempts.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `initial_delay`: 3 seconds
/// - `max_delay`: 5 seconds
/// - `multiplier`: 2.0
/// - `randomization`: 0.5 (each delay lands within ±50% of the backoff)
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnect attempts before the connection is declared lost
    pub max_attempts: usize,
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Cap on the delay between attempts
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Jitter factor in `0.0..=1.0` applied by [`ReconnectPolicy::jittered_delay`]
    pub randomization: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            randomization: 0.5,
        }
    }
}

impl ReconnectPolicy {
    /// Create a new policy builder starting from the defaults
    #[must_use]
    pub fn builder() -> ReconnectPolicyBuilder {
        ReconnectPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Policy that never reconnects
    #[must_use]
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before the given (0-based) attempt.
    ///
    /// `initial_delay * multiplier ^ attempt`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        Duration::try_from_secs_f64(seconds)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// [`delay_for_attempt`](Self::delay_for_attempt) spread by `±randomization`
    /// so clients dropped together do not reconnect together.
    #[must_use]
    pub fn jittered_delay(&self, attempt: usize) -> Duration {
        use rand::Rng;

        let base = self.delay_for_attempt(attempt);
        let spread = self.randomization.clamp(0.0, 1.0);
        if spread <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread));
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(base)
    }

    /// Whether another attempt is allowed after `attempts` reconnect attempts
    #[must_use]
    pub const fn allows(&self, attempts: usize) -> bool {
        attempts < self.max_attempts
    }
}

/// Builder for [`ReconnectPolicy`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicyBuilder {
    policy: ReconnectPolicy,
}

impl ReconnectPolicyBuilder {
    /// Set the number of reconnect attempts before giving up
    #[must_use]
    pub const fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Set the delay before the first attempt
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set the growth factor
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Set the jitter factor (0.0 disables jitter)
    #[must_use]
    pub const fn randomization(mut self, randomization: f64) -> Self {
        self.policy.randomization = randomization;
        self
    }

    /// Build the [`ReconnectPolicy`]
    #[must_use]
    pub fn build(self) -> ReconnectPolicy {
        self.policy
    }
}
