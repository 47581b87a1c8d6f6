//! In-memory service registry.
//!
//! Maps task identifiers to their live records. Membership is the
//! authoritative signal that a supervisor is running or starting for a task.
//! The lock is never held across an `.await`.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use stevedore_common::types::{ServiceStatus, TaskId};

use crate::container::{ServiceRecord, ServiceSnapshot};
use crate::stop::StopHandle;

/// Concurrency-safe directory of deployed service instances.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    records: RwLock<HashMap<TaskId, ServiceRecord>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the record unless one already exists for the task.
    ///
    /// Returns `false` and drops `record` when the slot is taken.
    pub fn insert_if_absent(&self, task_id: TaskId, record: ServiceRecord) -> bool {
        let mut records = self.records.write();
        if records.contains_key(&task_id) {
            return false;
        }
        let _ = records.insert(task_id, record);
        true
    }

    /// Returns a snapshot of the record, if present.
    #[must_use]
    pub fn get(&self, task_id: &TaskId) -> Option<ServiceSnapshot> {
        self.records.read().get(task_id).map(ServiceRecord::snapshot)
    }

    /// Returns the record's stop handle, if present.
    #[must_use]
    pub fn stop_handle(&self, task_id: &TaskId) -> Option<StopHandle> {
        self.records.read().get(task_id).map(|r| r.stop.clone())
    }

    /// Returns the record's status, if present.
    #[must_use]
    pub fn status(&self, task_id: &TaskId) -> Option<ServiceStatus> {
        self.records.read().get(task_id).map(|r| r.status)
    }

    /// Mutates the record in place. Returns `false` if it is gone.
    pub fn update<F>(&self, task_id: &TaskId, f: F) -> bool
    where
        F: FnOnce(&mut ServiceRecord),
    {
        self.records.write().get_mut(task_id).map(f).is_some()
    }

    /// Removes and returns the record.
    pub fn remove(&self, task_id: &TaskId) -> Option<ServiceRecord> {
        self.records.write().remove(task_id)
    }

    /// Returns every registered task identifier.
    #[must_use]
    pub fn task_ids(&self) -> BTreeSet<TaskId> {
        self.records.read().keys().cloned().collect()
    }

    /// Number of registered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns whether the registry holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
