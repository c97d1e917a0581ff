//! Reservation timer: delayed re-entry into the manager and the periodic
//! recovery sweep.
//!
//! Each active reservation has a delayed `ExpireIfDue` armed for its
//! deadline. The sweep is the safety net: it re-checks every resource at a
//! fixed interval, so a lost timer delays expiry by at most one interval.
//! Expiry is idempotent, so the two firing together is harmless.

use crate::manager::QueueManager;
use std::time::Duration;
use ticket_queue_core::admission::QueueAction;
use ticket_queue_core::types::ResourceId;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Dispatch `action` to `resource_id` once `duration` has passed, counted
/// from this call rather than from when the spawned task first runs
pub(crate) fn schedule(
    manager: QueueManager,
    resource_id: ResourceId,
    duration: Duration,
    action: QueueAction,
) {
    let fire_at = Instant::now() + duration;
    tokio::spawn(async move {
        tokio::time::sleep_until(fire_at).await;
        if manager.is_shutting_down() {
            return;
        }
        tracing::trace!(resource_id = %resource_id, ?action, "Timer fired");
        if let Err(error) = manager.dispatch_timer(resource_id, action).await {
            tracing::warn!(resource_id = %resource_id, %error, "Timer action failed");
        }
    });
}

/// Run [`QueueManager::sweep`] every `interval` until the manager shuts down
#[must_use]
pub fn spawn_sweeper(manager: QueueManager, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if manager.is_shutting_down() {
                tracing::debug!("Sweeper stopping");
                break;
            }
            manager.sweep().await;
        }
    })
}
