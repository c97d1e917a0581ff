//! Time utilities: the injectable clock, deadline arithmetic and the
//! anchor-and-recompute countdown used by clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// `now + window`, saturating at the maximum representable time.
#[must_use]
pub fn deadline_after(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time left from `now` until `deadline`, zero once passed.
#[must_use]
pub fn remaining_until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

/// Whole seconds left until `deadline`, rounded up so a countdown only shows
/// zero once the deadline has actually passed.
#[must_use]
pub fn seconds_until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> u64 {
    ceil_seconds(remaining_until(now, deadline))
}

fn ceil_seconds(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Countdown re-derived from a fixed anchor on every read.
///
/// The countdown never decrements a stored counter: `remaining` is always
/// `max(0, total - (now - anchor))`, so missed ticks and suspended timers
/// cannot accumulate drift. `total` is taken from the server (an estimate, or
/// `deadline - server_time`) and `anchor` from the local clock, so a skewed
/// local wall clock does not shift the displayed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    total: Duration,
    anchor: DateTime<Utc>,
}

impl Countdown {
    /// Anchor `total` at the local time `anchor`
    #[must_use]
    pub const fn new(total: Duration, anchor: DateTime<Utc>) -> Self {
        Self { total, anchor }
    }

    /// Countdown for a relative server estimate in seconds
    #[must_use]
    pub const fn from_estimate(seconds: u64, anchor: DateTime<Utc>) -> Self {
        Self::new(Duration::from_secs(seconds), anchor)
    }

    /// Countdown to an absolute server deadline.
    ///
    /// The window is computed entirely in server time (`deadline - server_time`)
    /// and then anchored locally.
    #[must_use]
    pub fn until_deadline(
        deadline: DateTime<Utc>,
        server_time: DateTime<Utc>,
        anchor: DateTime<Utc>,
    ) -> Self {
        Self::new(remaining_until(server_time, deadline), anchor)
    }

    /// The full span this countdown started from
    #[must_use]
    pub const fn total(&self) -> Duration {
        self.total
    }

    /// Local time the countdown was anchored at
    #[must_use]
    pub const fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Time elapsed since the anchor (zero if the local clock went backwards)
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.anchor).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time left at `now`, floored at zero
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.total.saturating_sub(self.elapsed(now))
    }

    /// Whole seconds left, rounded up
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        ceil_seconds(self.remaining(now))
    }

    /// Whether the countdown has reached zero.
    ///
    /// Zero is a display floor, not a state transition.
    #[must_use]
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now).is_zero()
    }

    /// Fraction of the span consumed, in `0.0..=1.0`
    #[must_use]
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        if self.total.is_zero() {
            return 1.0;
        }
        (self.elapsed(now).as_secs_f64() / self.total.as_secs_f64()).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(seconds)
    }

    #[test]
    fn test_deadline_after_adds_window() {
        assert_eq!(deadline_after(at(100), Duration::from_secs(60)), at(160));
    }

    #[test]
    fn test_deadline_after_saturates() {
        assert_eq!(
            deadline_after(at(0), Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[test]
    fn test_seconds_until_rounds_up_and_floors_at_zero() {
        let deadline = at(10);
        assert_eq!(seconds_until(at(0), deadline), 10);
        assert_eq!(
            seconds_until(at(9) + chrono::Duration::milliseconds(1), deadline),
            1
        );
        assert_eq!(seconds_until(at(11), deadline), 0);
    }

    #[test]
    fn test_countdown_recomputes_from_anchor() {
        let countdown = Countdown::from_estimate(30, at(1_000));

        assert_eq!(countdown.remaining_seconds(at(1_000)), 30);
        // A skipped tick does not matter: the value is re-derived.
        assert_eq!(countdown.remaining_seconds(at(1_017)), 13);
        assert_eq!(countdown.remaining_seconds(at(1_045)), 0);
        assert!(countdown.is_elapsed(at(1_030)));
    }

    #[test]
    fn test_countdown_ignores_backwards_local_clock() {
        let countdown = Countdown::from_estimate(30, at(1_000));
        assert_eq!(countdown.remaining_seconds(at(990)), 30);
    }

    #[test]
    fn test_deadline_countdown_is_skew_tolerant() {
        // Server clock runs 5 minutes ahead of the local clock.
        let server_time = at(10_300);
        let deadline = at(10_360);
        let local_now = at(10_000);

        let countdown = Countdown::until_deadline(deadline, server_time, local_now);

        assert_eq!(countdown.remaining_seconds(local_now), 60);
        assert_eq!(countdown.remaining_seconds(at(10_045)), 15);
    }

    #[test]
    fn test_progress() {
        let countdown = Countdown::from_estimate(100, at(0));
        assert!((countdown.progress(at(25)) - 0.25).abs() < f64::EPSILON);
        assert!((countdown.progress(at(500)) - 1.0).abs() < f64::EPSILON);
        assert!((Countdown::from_estimate(0, at(0)).progress(at(0)) - 1.0).abs() < f64::EPSILON);
    }
}
