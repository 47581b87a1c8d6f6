//! Domain primitive types used across the Stevedore workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::INSTANCE_SEPARATOR;

/// Identifier of one service instance, shared by the registry and the engine.
///
/// The encoding is `"<service>.instance.<n>"`. Decoding looks for the last
/// `.instance` occurrence so that service names containing dots survive the
/// round trip, and falls back leniently for identifiers minted elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Encodes a (service, instance) pair.
    #[must_use]
    pub fn encode(service_name: &str, instance: u32) -> Self {
        Self(format!("{service_name}{INSTANCE_SEPARATOR}.{instance}"))
    }

    /// Wraps an externally supplied identifier without validation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the service name, or the whole identifier if it carries no separator.
    #[must_use]
    pub fn service_name(&self) -> &str {
        match self.separator_index() {
            Some(index) => &self.0[..index],
            None => &self.0,
        }
    }

    /// Returns the instance number, or 0 if it cannot be recovered.
    #[must_use]
    pub fn instance(&self) -> u32 {
        self.separator_index()
            .and_then(|index| self.0.get(index + INSTANCE_SEPARATOR.len() + 1..))
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn separator_index(&self) -> Option<usize> {
        self.0.rfind(INSTANCE_SEPARATOR).filter(|&index| index > 0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared resource shape of a service instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceShape {
    /// Virtual CPUs.
    #[serde(default)]
    pub vcpus: u32,
    /// Virtual GPUs; any positive value exposes all GPU devices.
    #[serde(default)]
    pub vgpus: u32,
    /// Memory in megabytes.
    #[serde(default)]
    pub memory: u64,
}

/// A deploy request for one service instance.
///
/// Field names on the wire follow the control plane's job model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Control plane job identifier.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// Service name.
    #[serde(rename = "job_name")]
    pub service_name: String,
    /// Instance number within the service.
    #[serde(rename = "instance_number", default)]
    pub instance: u32,
    /// Image reference.
    pub image: String,
    /// Command override; empty keeps the image default.
    #[serde(rename = "cmd", default)]
    pub command: Vec<String>,
    /// Health-check command executed inside the container; empty disables checks.
    #[serde(rename = "health-check", default)]
    pub health_check: Vec<String>,
    /// Environment entries in `KEY=VALUE` form.
    #[serde(rename = "environment", default)]
    pub env: Vec<String>,
    /// Port publishing spec, forwarded verbatim to the network manager.
    #[serde(rename = "port", default)]
    pub ports: String,
    /// Declared resources.
    #[serde(flatten)]
    pub resources: ResourceShape,
}

impl ServiceSpec {
    /// Creates a spec with only the mandatory fields set.
    #[must_use]
    pub fn new(service_name: impl Into<String>, instance: u32, image: impl Into<String>) -> Self {
        Self {
            job_id: None,
            service_name: service_name.into(),
            instance,
            image: image.into(),
            command: Vec::new(),
            health_check: Vec::new(),
            env: Vec::new(),
            ports: String::new(),
            resources: ResourceShape::default(),
        }
    }

    /// Returns the task identifier of this instance.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        TaskId::encode(&self.service_name, self.instance)
    }
}

/// Lifecycle status of a service instance.
///
/// Serialized with the status strings the control plane understands. The
/// control plane has no separate string for a started but not yet healthy
/// instance, so `Running` goes out as `NODE_SCHEDULED` and that string
/// always reads back as `Scheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// Reserved in the registry, bring-up in progress.
    #[serde(rename = "NODE_SCHEDULED")]
    Scheduled,
    /// Process started, health not yet confirmed.
    #[serde(rename = "NODE_SCHEDULED", skip_deserializing)]
    Running,
    /// Healthy and serving.
    #[serde(rename = "RUNNING")]
    Active,
    /// Bring-up or supervision failed.
    #[serde(rename = "FAILED")]
    Failed,
    /// Exited or was killed.
    #[serde(rename = "DEAD")]
    Dead,
}

impl ServiceStatus {
    /// Returns whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Dead)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled | Self::Running => write!(f, "NODE_SCHEDULED"),
            Self::Active => write!(f, "RUNNING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Dead => write!(f, "DEAD"),
        }
    }
}

/// Point-in-time resource usage of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// CPU usage in percent.
    pub cpu: f64,
    /// Memory usage in bytes.
    pub memory: u64,
    /// Writable snapshot size in bytes.
    pub disk: u64,
    /// Service name.
    #[serde(rename = "job_name")]
    pub service_name: String,
    /// Instance number.
    pub instance: u32,
    /// Runtime kind.
    #[serde(rename = "virtualization")]
    pub runtime: String,
    /// Host process ID of the task.
    pub pid: u32,
}
