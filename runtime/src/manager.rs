//! Queue manager: the imperative shell around [`QueueReducer`].
//!
//! Each resource owns one async mutex. Every operation for a resource takes
//! that lock, refreshes availability from the catalog, runs the reducer and
//! executes the resulting effects before releasing it. Operations on
//! different resources never contend.
//!
//! ```text
//!  HTTP / WebSocket / timers
//!            │
//!            ▼
//!   QueueManager::dispatch(resource, action)
//!            │  lock shard(resource)
//!            ├─ catalog.availability()      (sold/withdrawn elsewhere → Withdraw)
//!            ├─ reducer.reduce(state, action, env)
//!            ├─ effects:  SetAvailability → catalog
//!            │            Push            → PushHub
//!            │            Delay           → timer::schedule
//!            ├─ sold/withdrawn and idle    → evict shard
//!            ▼  unlock
//! ```

use crate::catalog::Catalog;
use crate::metrics::QueueMetrics;
use crate::push::PushHub;
use crate::snapshot::QueueSnapshot;
use crate::timer;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use ticket_queue_core::admission::{QueueAction, QueueEnvironment, QueueReducer};
use ticket_queue_core::clock::remaining_until;
use ticket_queue_core::config::QueueConfig;
use ticket_queue_core::effect::Effect;
use ticket_queue_core::error::QueueError;
use ticket_queue_core::protocol::GoneReason;
use ticket_queue_core::reducer::Reducer;
use ticket_queue_core::state::{Presence, ResourceState};
use ticket_queue_core::types::{
    Availability, ClientId, ClientView, JoinOutcome, ReservationId, ResourceId,
};
use tokio::sync::Mutex;

type Shard = Arc<Mutex<ResourceState>>;

struct Inner {
    shards: DashMap<ResourceId, Shard>,
    reducer: QueueReducer,
    env: QueueEnvironment,
    catalog: Arc<dyn Catalog>,
    hub: PushHub,
    shutting_down: AtomicBool,
}

/// What a step changed, for logs and metrics
#[derive(Debug, Clone, Copy)]
struct Observation {
    active: Option<ReservationId>,
    depth: usize,
    finalized: u64,
}

impl Observation {
    fn of(state: &ResourceState) -> Self {
        Self {
            active: state.reservations.active().map(|r| r.id),
            depth: state.queue.len(),
            finalized: state.reservations.finalized_total(),
        }
    }
}

/// Shared handle to every resource's queue.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    /// Creates a manager over a catalog, delivering pushes through `hub`
    #[must_use]
    pub fn new(env: QueueEnvironment, catalog: Arc<dyn Catalog>, hub: PushHub) -> Self {
        Self {
            inner: Arc::new(Inner {
                shards: DashMap::new(),
                reducer: QueueReducer::new(),
                env,
                catalog,
                hub,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// The push hub events are delivered through
    #[must_use]
    pub fn hub(&self) -> &PushHub {
        &self.inner.hub
    }

    /// Queue configuration in effect
    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.inner.env.config
    }

    /// Current time according to the injected clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.env.clock.now()
    }

    /// Stop firing timers; pending ones become no-ops
    pub fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Queue operations
    // ========================================================================

    /// Join the queue for a resource.
    ///
    /// Returns `Granted` if the turn was created by this call, `AlreadyHolding`
    /// if the client held it already, `Queued` otherwise. Repeated joins are
    /// idempotent.
    ///
    /// # Errors
    ///
    /// [`QueueError::ResourceUnavailable`] if the resource is sold or withdrawn,
    /// [`QueueError::ResourceNotFound`] if the catalog does not know it.
    pub async fn join(
        &self,
        resource_id: ResourceId,
        client_id: ClientId,
    ) -> Result<JoinOutcome, QueueError> {
        let result = self
            .dispatch(resource_id, QueueAction::Join { client_id }, |state, prior| {
                match state.outcome_for(&client_id) {
                    Some(JoinOutcome::AlreadyHolding {
                        reservation_id,
                        deadline,
                    }) if prior != Some(reservation_id) => Ok(JoinOutcome::Granted {
                        reservation_id,
                        deadline,
                    }),
                    Some(outcome) => Ok(outcome),
                    None => Err(QueueError::ResourceUnavailable {
                        resource_id,
                        availability: state.availability,
                    }),
                }
            })
            .await
            .and_then(|outcome| outcome);

        let label = match &result {
            Ok(JoinOutcome::Granted { .. }) => "granted",
            Ok(JoinOutcome::AlreadyHolding { .. }) => "already_holding",
            Ok(JoinOutcome::Queued(_)) => "queued",
            Err(_) => "rejected",
        };
        QueueMetrics::record_join(label);
        result
    }

    /// Opt out: leave the line, or give up the turn if holding it.
    ///
    /// A client that is neither waiting nor holding is left alone.
    ///
    /// # Errors
    ///
    /// Only catalog failures.
    pub async fn leave(&self, resource_id: ResourceId, client_id: ClientId) -> Result<(), QueueError> {
        self.dispatch(resource_id, QueueAction::Leave { client_id }, |_, _| ())
            .await
    }

    /// The holder's purchase succeeded: the resource is sold and the queue drained.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotHolder`] if `client_id` does not hold the active reservation.
    pub async fn complete_purchase(
        &self,
        resource_id: ResourceId,
        client_id: ClientId,
    ) -> Result<(), QueueError> {
        self.dispatch(
            resource_id,
            QueueAction::CompletePurchase { client_id },
            |_, _| (),
        )
        .await
    }

    /// The holder gives up the turn; the next client is promoted.
    ///
    /// # Errors
    ///
    /// [`QueueError::NotHolder`] if `client_id` does not hold the active reservation.
    pub async fn release_reservation(
        &self,
        resource_id: ResourceId,
        client_id: ClientId,
    ) -> Result<(), QueueError> {
        self.dispatch(
            resource_id,
            QueueAction::ReleaseReservation { client_id },
            |_, _| (),
        )
        .await
    }

    /// Expire the active reservation if its deadline has passed. Idempotent.
    ///
    /// # Errors
    ///
    /// Only catalog failures.
    pub async fn expire_if_due(&self, resource_id: ResourceId) -> Result<(), QueueError> {
        self.dispatch(
            resource_id,
            QueueAction::ExpireIfDue {
                reservation_id: None,
            },
            |_, _| (),
        )
        .await
    }

    /// Take the resource off sale, draining the queue.
    ///
    /// # Errors
    ///
    /// [`QueueError::ResourceUnavailable`] if the resource is already sold or withdrawn.
    pub async fn withdraw(&self, resource_id: ResourceId) -> Result<(), QueueError> {
        self.dispatch(
            resource_id,
            QueueAction::Withdraw {
                reason: GoneReason::Withdrawn,
            },
            |_, _| (),
        )
        .await
    }

    /// A push channel opened; the client is sent its current view.
    ///
    /// # Errors
    ///
    /// [`QueueError::ResourceNotFound`] for unknown resources.
    pub async fn client_connected(
        &self,
        resource_id: ResourceId,
        client_id: ClientId,
    ) -> Result<(), QueueError> {
        QueueMetrics::record_connections(self.inner.hub.connection_count());
        self.dispatch(
            resource_id,
            QueueAction::ClientConnected { client_id },
            |_, _| (),
        )
        .await
    }

    /// A push channel closed; the disconnect grace starts.
    ///
    /// # Errors
    ///
    /// Only catalog failures.
    pub async fn client_disconnected(
        &self,
        resource_id: ResourceId,
        client_id: ClientId,
    ) -> Result<(), QueueError> {
        QueueMetrics::record_connections(self.inner.hub.connection_count());
        self.dispatch(
            resource_id,
            QueueAction::ClientDisconnected { client_id },
            |_, _| (),
        )
        .await
    }

    /// The client's current view and the resource's availability.
    ///
    /// # Errors
    ///
    /// [`QueueError::ResourceNotFound`] for unknown resources.
    pub async fn view(
        &self,
        resource_id: ResourceId,
        client_id: ClientId,
    ) -> Result<(ClientView, Availability), QueueError> {
        let shard = self.shard(resource_id).await?;
        let mut state = shard.lock().await;
        self.sync_availability(&mut state).await?;
        Ok((state.view_for(&client_id, self.now()), state.availability))
    }

    /// A copy of one resource's state, if the manager has seen it
    pub async fn inspect(&self, resource_id: ResourceId) -> Option<ResourceState> {
        let shard = self.existing_shard(resource_id)?;
        let state = shard.lock().await;
        Some(state.clone())
    }

    /// Resources the manager holds state for
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceId> {
        self.inner.shards.iter().map(|entry| *entry.key()).collect()
    }

    // ========================================================================
    // Timers, sweep and recovery
    // ========================================================================

    /// Re-entry point for delayed actions
    pub(crate) async fn dispatch_timer(
        &self,
        resource_id: ResourceId,
        action: QueueAction,
    ) -> Result<(), QueueError> {
        self.dispatch(resource_id, action, |_, _| ()).await
    }

    /// Expire every overdue reservation across all resources
    pub async fn sweep(&self) {
        let resources = self.resources();
        let results = join_all(
            resources
                .iter()
                .map(|resource_id| self.expire_if_due(*resource_id)),
        )
        .await;

        for (resource_id, result) in resources.iter().zip(results) {
            if let Err(error) = result {
                tracing::debug!(resource_id = %resource_id, %error, "Sweep skipped resource");
            }
        }
        QueueMetrics::record_connections(self.inner.hub.connection_count());
    }

    /// Every resource's state
    pub async fn snapshot(&self) -> QueueSnapshot {
        let shards: Vec<Shard> = self
            .inner
            .shards
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut resources = Vec::with_capacity(shards.len());
        for shard in shards {
            resources.push(shard.lock().await.clone());
        }
        QueueSnapshot::new(self.now(), resources)
    }

    /// Load states from a snapshot and run recovery on each.
    ///
    /// Nobody is connected after a restart, so every participant starts its
    /// disconnect grace now. Overdue reservations are expired (promoting as
    /// needed) and timers are re-armed for the rest. Returns the number of
    /// resources restored.
    pub async fn restore(&self, snapshot: QueueSnapshot) -> usize {
        let mut restored = Vec::with_capacity(snapshot.resources.len());
        for state in snapshot.resources {
            let resource_id = state.resource_id;
            QueueMetrics::record_depth_change(queue_depth(&state));
            self.inner
                .shards
                .insert(resource_id, Arc::new(Mutex::new(state)));
            restored.push(resource_id);
        }

        for resource_id in &restored {
            self.recover(*resource_id).await;
        }
        tracing::info!(resources = restored.len(), "Queue state restored");
        restored.len()
    }

    async fn recover(&self, resource_id: ResourceId) {
        let Some(shard) = self.existing_shard(resource_id) else {
            return;
        };
        let mut state = shard.lock().await;
        let now = self.now();

        let mut connected = Vec::new();
        for (client_id, presence) in &state.presence {
            match presence {
                Presence::Connected { .. } => connected.push(*client_id),
                Presence::Disconnected { epoch, since } => {
                    let grace_end = *since
                        + chrono::Duration::from_std(self.config().disconnect_grace)
                            .unwrap_or_default();
                    timer::schedule(
                        self.clone(),
                        resource_id,
                        remaining_until(now, grace_end),
                        QueueAction::DisconnectGraceElapsed {
                            client_id: *client_id,
                            epoch: *epoch,
                        },
                    );
                },
            }
        }
        for client_id in connected {
            self.apply(&mut state, QueueAction::ClientDisconnected { client_id })
                .await;
        }

        let prior = state.reservations.active().map(|r| r.id);
        self.apply(
            &mut state,
            QueueAction::ExpireIfDue {
                reservation_id: None,
            },
        )
        .await;

        // Reservations granted during recovery armed their own timers
        if let Some(active) = state.reservations.active().filter(|r| Some(r.id) == prior) {
            timer::schedule(
                self.clone(),
                resource_id,
                remaining_until(now, active.deadline),
                QueueAction::ExpireIfDue {
                    reservation_id: Some(active.id),
                },
            );
            if let Some(claim_deadline) = active.claim_deadline {
                timer::schedule(
                    self.clone(),
                    resource_id,
                    remaining_until(now, claim_deadline),
                    QueueAction::ClaimCheck {
                        reservation_id: active.id,
                    },
                );
            }
        }
    }

    // ========================================================================
    // Critical section
    // ========================================================================

    fn existing_shard(&self, resource_id: ResourceId) -> Option<Shard> {
        self.inner
            .shards
            .get(&resource_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn shard(&self, resource_id: ResourceId) -> Result<Shard, QueueError> {
        if let Some(shard) = self.existing_shard(resource_id) {
            return Ok(shard);
        }

        let availability = self.inner.catalog.availability(resource_id).await?;
        let entry = self.inner.shards.entry(resource_id).or_insert_with(|| {
            Arc::new(Mutex::new(ResourceState::new(
                resource_id,
                availability,
                &self.inner.env.config,
            )))
        });
        Ok(Arc::clone(entry.value()))
    }

    /// Run `action` inside the resource's critical section, then read the
    /// result from state. `read` also receives the active reservation ID from
    /// before the action.
    async fn dispatch<T>(
        &self,
        resource_id: ResourceId,
        action: QueueAction,
        read: impl FnOnce(&ResourceState, Option<ReservationId>) -> T + Send,
    ) -> Result<T, QueueError> {
        let shard = self.shard(resource_id).await?;
        let mut state = shard.lock().await;
        self.sync_availability(&mut state).await?;

        let prior = state.reservations.active().map(|r| r.id);
        self.apply(&mut state, action).await;
        self.evict_if_finished(&shard, &state);

        if let Some(error) = state.last_error.take() {
            tracing::debug!(resource_id = %resource_id, %error, "Queue command rejected");
            return Err(error);
        }
        Ok(read(&state, prior))
    }

    /// Drop the shard of a sold or withdrawn resource once nobody waits or
    /// holds. A later access rebuilds it from the catalog's terminal
    /// availability.
    fn evict_if_finished(&self, shard: &Shard, state: &ResourceState) {
        if !state.availability.is_terminal() || !state.is_idle() {
            return;
        }
        let evicted = self
            .inner
            .shards
            .remove_if(&state.resource_id, |_, current| Arc::ptr_eq(current, shard))
            .is_some();
        if evicted {
            tracing::debug!(
                resource_id = %state.resource_id,
                availability = %state.availability,
                "Evicted finished resource"
            );
        }
    }

    /// Pick up sales and withdrawals made outside the queue
    async fn sync_availability(&self, state: &mut ResourceState) -> Result<(), QueueError> {
        let current = self.inner.catalog.availability(state.resource_id).await?;
        if current == state.availability || !current.is_terminal() || state.availability.is_terminal()
        {
            return Ok(());
        }

        tracing::info!(
            resource_id = %state.resource_id,
            availability = %current,
            "Resource left sale outside the queue"
        );
        let reason = if current == Availability::Sold {
            GoneReason::Sold
        } else {
            GoneReason::Withdrawn
        };
        self.apply(state, QueueAction::Withdraw { reason }).await;
        Ok(())
    }

    async fn apply(&self, state: &mut ResourceState, action: QueueAction) {
        let resource_id = state.resource_id;
        let granted_by_join = matches!(action, QueueAction::Join { .. });
        let before = Observation::of(state);

        let effects = self.inner.reducer.reduce(state, action, &self.inner.env);

        self.observe(state, before, granted_by_join);
        for effect in effects {
            self.execute(resource_id, effect).await;
        }
    }

    fn observe(&self, state: &ResourceState, before: Observation, granted_by_join: bool) {
        let after = Observation::of(state);
        let resource_id = state.resource_id;

        #[allow(clippy::cast_precision_loss)] // Queue depths stay far below 2^52
        QueueMetrics::record_depth_change(after.depth as f64 - before.depth as f64);

        let newly_finalized =
            usize::try_from(after.finalized.saturating_sub(before.finalized)).unwrap_or(usize::MAX);
        for reservation in state.reservations.history().rev().take(newly_finalized) {
            tracing::info!(
                resource_id = %resource_id,
                reservation_id = %reservation.id,
                client_id = %reservation.holder,
                status = ?reservation.status,
                "Reservation finalized"
            );
            QueueMetrics::record_reservation(
                &reservation.status,
                reservation.turn_duration().and_then(|d| d.to_std().ok()),
            );
        }

        if after.active != before.active {
            if let Some(active) = state.reservations.active() {
                tracing::info!(
                    resource_id = %resource_id,
                    reservation_id = %active.id,
                    client_id = %active.holder,
                    deadline = %active.deadline,
                    claim_deadline = ?active.claim_deadline,
                    "Reservation granted"
                );
                if !granted_by_join {
                    QueueMetrics::record_promotion();
                }
            }
        }

        if after.depth != before.depth {
            tracing::debug!(
                resource_id = %resource_id,
                depth = after.depth,
                was = before.depth,
                "Queue depth changed"
            );
        }
    }

    async fn execute(&self, resource_id: ResourceId, effect: Effect<QueueAction>) {
        match effect {
            Effect::None => {},
            Effect::SetAvailability(availability) => {
                if let Err(error) = self
                    .inner
                    .catalog
                    .set_availability(resource_id, availability)
                    .await
                {
                    tracing::error!(
                        resource_id = %resource_id,
                        availability = %availability,
                        %error,
                        "Catalog rejected availability change"
                    );
                }
            },
            Effect::Push { client_id, event } => {
                let kind = event.kind();
                if self.inner.hub.send(resource_id, client_id, event) {
                    tracing::trace!(resource_id = %resource_id, client_id = %client_id, %kind, "Pushed");
                } else {
                    tracing::trace!(
                        resource_id = %resource_id,
                        client_id = %client_id,
                        %kind,
                        "No open channel, push dropped"
                    );
                }
            },
            Effect::Delay { duration, action } => {
                timer::schedule(self.clone(), resource_id, duration, *action);
            },
        }
    }
}

#[allow(clippy::cast_precision_loss)] // Queue depths stay far below 2^52
fn queue_depth(state: &ResourceState) -> f64 {
    state.queue.len() as f64
}
