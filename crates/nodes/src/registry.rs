//! In-memory store of running executions.
//!
//! The conductor inserts an [`Execution`] when a run starts and removes it when
//! the run ends. Cancellation removes it early; the running loop notices the
//! missing entry on its next update and stops.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline::{Execution, ExecutionId, ProgressSnapshot, Timestamp};
use tokio::sync::{RwLock, TryLockError};

/// Shared map of running executions. Cloning shares the same store.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRegistry {
    inner: Arc<RwLock<HashMap<ExecutionId, Execution>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `execution` unless its id is already running. Returns
    /// `false`, leaving the running entry untouched, when it is.
    pub async fn try_insert(&self, execution: Execution) -> bool {
        let mut map = self.inner.write().await;
        if map.contains_key(&execution.id) {
            return false;
        }
        map.insert(execution.id, execution);
        true
    }

    /// Applies `f` to the execution, or returns `None` if it is no longer
    /// registered (finished or cancelled).
    pub async fn update<R>(&self, id: ExecutionId, f: impl FnOnce(&mut Execution) -> R) -> Option<R> {
        self.inner.write().await.get_mut(&id).map(f)
    }

    pub async fn get(&self, id: ExecutionId) -> Option<Execution> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn snapshot(&self, id: ExecutionId) -> Option<ProgressSnapshot> {
        self.inner.read().await.get(&id).map(ProgressSnapshot::of)
    }

    pub async fn remove(&self, id: ExecutionId) -> Option<Execution> {
        self.inner.write().await.remove(&id)
    }

    /// Removes the run of `id` that started at `started_at`, leaving a later
    /// run under the same id in place.
    pub async fn remove_run(&self, id: ExecutionId, started_at: Timestamp) -> Option<Execution> {
        take_run(&mut *self.inner.write().await, id, started_at)
    }

    /// [`Self::remove_run`] without waiting; fails if the lock is held.
    pub fn try_remove_run(
        &self,
        id: ExecutionId,
        started_at: Timestamp,
    ) -> Result<Option<Execution>, TryLockError> {
        let mut map = self.inner.try_write()?;
        Ok(take_run(&mut map, id, started_at))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

fn take_run(
    map: &mut HashMap<ExecutionId, Execution>,
    id: ExecutionId,
    started_at: Timestamp,
) -> Option<Execution> {
    if map.get(&id)?.started_at != started_at {
        return None;
    }
    map.remove(&id)
}
