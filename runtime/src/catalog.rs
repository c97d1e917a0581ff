//! Catalog collaborator: the authority on resource availability.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use ticket_queue_core::error::QueueError;
use ticket_queue_core::types::{Availability, ResourceId};

/// Read/write access to resource availability.
///
/// Writes must be visible to the next read from the same process: the queue
/// manager reads and writes inside one resource's critical section and relies
/// on seeing its own flips.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Current availability of a resource
    ///
    /// # Errors
    ///
    /// [`QueueError::ResourceNotFound`] for unknown resources, or
    /// [`QueueError::Catalog`] when the backing store fails.
    async fn availability(&self, resource_id: ResourceId) -> Result<Availability, QueueError>;

    /// Move a resource to `availability`
    ///
    /// # Errors
    ///
    /// [`QueueError::ResourceNotFound`] for unknown resources, or
    /// [`QueueError::Catalog`] when the transition is illegal or the store fails.
    async fn set_availability(
        &self,
        resource_id: ResourceId,
        availability: Availability,
    ) -> Result<(), QueueError>;
}

/// In-process catalog backed by a concurrent map
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    resources: Arc<DashMap<ResourceId, Availability>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, or overwrite its availability
    pub fn register(&self, resource_id: ResourceId, availability: Availability) {
        self.resources.insert(resource_id, availability);
    }

    /// Add a new, available resource and return its ID
    #[must_use]
    pub fn create(&self) -> ResourceId {
        let resource_id = ResourceId::new();
        self.register(resource_id, Availability::Available);
        resource_id
    }

    /// Availability without going through the async trait
    #[must_use]
    pub fn get(&self, resource_id: &ResourceId) -> Option<Availability> {
        self.resources.get(resource_id).map(|entry| *entry.value())
    }

    /// Number of known resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the catalog is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn availability(&self, resource_id: ResourceId) -> Result<Availability, QueueError> {
        self.get(&resource_id)
            .ok_or(QueueError::ResourceNotFound(resource_id))
    }

    async fn set_availability(
        &self,
        resource_id: ResourceId,
        availability: Availability,
    ) -> Result<(), QueueError> {
        let mut entry = self
            .resources
            .get_mut(&resource_id)
            .ok_or(QueueError::ResourceNotFound(resource_id))?;

        let current = *entry.value();
        if current == availability {
            return Ok(());
        }
        if !current.can_transition_to(availability) {
            return Err(QueueError::Catalog(format!(
                "illegal transition {current} -> {availability} for resource {resource_id}"
            )));
        }
        *entry.value_mut() = availability;
        Ok(())
    }
}
