//! JSON snapshots of queue state for restart recovery.

use crate::error::RuntimeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use ticket_queue_core::state::ResourceState;

/// Every resource's state at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// Per-resource states
    pub resources: Vec<ResourceState>,
}

impl QueueSnapshot {
    /// Wrap a set of states
    #[must_use]
    pub const fn new(taken_at: DateTime<Utc>, resources: Vec<ResourceState>) -> Self {
        Self {
            taken_at,
            resources,
        }
    }

    /// Write the snapshot to `path`, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] on serialization or I/O failure.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("tmp");

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::info!(
            path = %path.display(),
            resources = self.resources.len(),
            "Queue snapshot written"
        );
        Ok(())
    }

    /// Read a snapshot from `path`. A missing file yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the file exists but cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>, RuntimeError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Self = serde_json::from_slice(&bytes)?;

        tracing::info!(
            path = %path.display(),
            resources = snapshot.resources.len(),
            taken_at = %snapshot.taken_at,
            "Queue snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}
