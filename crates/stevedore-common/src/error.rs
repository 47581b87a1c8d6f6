//! Unified error types for the Stevedore workspace.
//!
//! The variants follow the steps of a service instance's lifecycle so that a
//! caller can tell which stage of bring-up or teardown failed. Per-instance
//! failures never leak into other instances.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum StevedoreError {
    /// The image could neither be found locally nor pulled.
    #[error("unable to resolve image {image}: {message}")]
    ImageResolution {
        /// Image reference that failed to resolve.
        image: String,
        /// Description of the failure.
        message: String,
    },

    /// A live record already exists for this task.
    #[error("service already deployed: {task_id}")]
    AlreadyDeployed {
        /// Task that is already deployed.
        task_id: String,
    },

    /// The execution spec could not be assembled.
    #[error("failed to build execution spec for {task_id}: {message}")]
    SpecBuild {
        /// Task whose spec failed.
        task_id: String,
        /// Description of the failure.
        message: String,
    },

    /// The engine refused to create the container.
    #[error("failed to create container {task_id}: {message}")]
    ContainerCreate {
        /// Task whose container failed.
        task_id: String,
        /// Description of the failure.
        message: String,
    },

    /// The engine refused to create the task for an existing container.
    #[error("failed to create task {task_id}: {message}")]
    TaskCreate {
        /// Task that failed.
        task_id: String,
        /// Description of the failure.
        message: String,
    },

    /// Attaching the task to the overlay network failed.
    #[error("failed to attach network for {task_id}: {message}")]
    NetworkAttach {
        /// Task that failed.
        task_id: String,
        /// Description of the failure.
        message: String,
    },

    /// The task could not be started.
    #[error("failed to start task {task_id}: {message}")]
    TaskStart {
        /// Task that failed.
        task_id: String,
        /// Description of the failure.
        message: String,
    },

    /// The health check could not be executed at all.
    #[error("health check for {task_id} could not run: {message}")]
    HealthCheckFatal {
        /// Task whose health check failed.
        task_id: String,
        /// Description of the failure.
        message: String,
    },

    /// The supervisor acknowledged the stop request but teardown failed.
    #[error("unable to stop service {task_id}")]
    StopFailure {
        /// Task that failed to stop.
        task_id: String,
    },

    /// The supervisor did not acknowledge the stop request in time.
    #[error("undeployment timeout for {task_id}")]
    StopTimeout {
        /// Task that timed out.
        task_id: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Any other failure reported by the container engine.
    #[error("container engine error: {message}")]
    Engine {
        /// Description of the engine failure.
        message: String,
    },

    /// The network manager rejected a request or was unreachable.
    #[error("network manager error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl StevedoreError {
    /// Shorthand for an engine error with the given message.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    /// Returns whether this error reports a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StevedoreError>;
