//! Service record held by the registry and its read-only snapshot.

use serde::Serialize;
use stevedore_common::types::{ServiceSpec, ServiceStatus, TaskId};

use crate::stop::StopHandle;

/// Live record of one deployed service instance.
///
/// Mutable fields are written only by the owning supervisor and its health
/// loop, always through the registry.
#[derive(Debug)]
pub struct ServiceRecord {
    /// Deploy request this record was created from.
    pub spec: ServiceSpec,
    /// Current lifecycle status.
    pub status: ServiceStatus,
    /// Free-text detail about the last transition.
    pub status_detail: String,
    /// Host PID of the task, once started.
    pub pid: Option<u32>,
    /// Stop mailbox shared with the supervisor.
    pub stop: StopHandle,
}

impl ServiceRecord {
    /// Creates a record in the `Scheduled` state.
    #[must_use]
    pub fn new(spec: ServiceSpec, stop: StopHandle) -> Self {
        Self {
            spec,
            status: ServiceStatus::Scheduled,
            status_detail: String::new(),
            pid: None,
            stop,
        }
    }

    /// Returns the task identifier of this record.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.spec.task_id()
    }

    /// Copies the observable state out of the record.
    #[must_use]
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            spec: self.spec.clone(),
            status: self.status,
            status_detail: self.status_detail.clone(),
            pid: self.pid,
        }
    }
}

/// Point-in-time copy of a service record, handed to callers and callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    /// Deploy request.
    #[serde(flatten)]
    pub spec: ServiceSpec,
    /// Lifecycle status.
    pub status: ServiceStatus,
    /// Detail about the last transition.
    pub status_detail: String,
    /// Host PID of the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl ServiceSnapshot {
    /// Returns the task identifier of this snapshot.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.spec.task_id()
    }
}
