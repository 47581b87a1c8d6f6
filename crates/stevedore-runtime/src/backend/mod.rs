//! Container engine abstraction.
//!
//! The node engine never talks to a container runtime directly. Everything
//! it needs (images, containers, tasks, exec, statistics) goes through the
//! [`ContainerEngine`] contract so that lifecycle logic stays independent of
//! the engine implementation.

pub mod docker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::BoxFuture;
use stevedore_common::error::Result;
use stevedore_common::types::TaskId;

pub use docker::DockerEngine;

/// An image known to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Reference the image was requested by.
    pub reference: String,
    /// Engine-side image identifier.
    pub id: String,
}

/// A read-only or read-write bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the container.
    pub destination: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// Everything the engine needs to create one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSpec {
    /// Container and task name.
    pub task_id: TaskId,
    /// Image to run.
    pub image: ImageRef,
    /// Hostname inside the container.
    pub hostname: String,
    /// Environment in `KEY=VALUE` form.
    pub env: Vec<String>,
    /// Command override; `None` keeps the image default.
    pub command: Option<Vec<String>>,
    /// Bind mounts.
    pub mounts: Vec<BindMount>,
    /// Expose every GPU device with all capabilities.
    pub gpus: bool,
    /// CPU limit in whole CPUs; 0 means unlimited.
    pub cpus: u32,
    /// Memory limit in megabytes; 0 means unlimited.
    pub memory_mb: u64,
    /// Labels attached to the container.
    pub labels: BTreeMap<String, String>,
}

/// Output of a command executed inside a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code of the command.
    pub exit_code: i64,
    /// Interleaved stdout and stderr.
    pub output: String,
}

/// Per-task resource statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskStats {
    /// Host PID of the task's init process.
    pub pid: u32,
    /// CPU usage in percent.
    pub cpu_percent: f64,
    /// Memory usage in bytes.
    pub memory_bytes: u64,
}

/// A container visible to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container name, which is the task ID for containers this node created.
    pub task_id: TaskId,
    /// Whether the container currently has a running task.
    pub running: bool,
}

/// Resolves to the exit code of a task once it exits.
pub type ExitWaiter = BoxFuture<'static, Result<i64>>;

/// Contract with the external container engine.
///
/// Implementors report a missing container or task as
/// `StevedoreError::NotFound` so that cleanup paths can tell "already gone"
/// apart from real failures.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Looks the image up in local storage.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the image is not present locally.
    async fn get_image(&self, reference: &str) -> Result<ImageRef>;

    /// Pulls and unpacks the image from its registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    async fn pull_image(&self, reference: &str) -> Result<ImageRef>;

    /// Creates a container and its snapshot from the execution spec.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created.
    async fn create_container(&self, spec: &ExecutionSpec) -> Result<()>;

    /// Creates the task of an existing container, sending its stdout and
    /// stderr to the log file at `log_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be created.
    async fn create_task(&self, task_id: &TaskId, log_path: &Path) -> Result<()>;

    /// Registers interest in the task's exit.
    ///
    /// Must be called before [`start_task`](Self::start_task). The returned
    /// waiter resolves with the exit code even when the task exits between
    /// the start and the first poll of the waiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the waiter cannot be registered.
    async fn wait_task(&self, task_id: &TaskId) -> Result<ExitWaiter>;

    /// Starts the task and returns its host PID.
    ///
    /// Never returns a zero PID: a task with no PID to report fails to start.
    ///
    /// # Errors
    ///
    /// Returns an error if the task cannot be started.
    async fn start_task(&self, task_id: &TaskId) -> Result<u32>;

    /// Runs a command inside the running task, capturing combined output.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be launched or awaited. A
    /// command that runs and fails is reported through the exit code.
    async fn exec(&self, task_id: &TaskId, exec_id: &str, args: &[String]) -> Result<ExecOutput>;

    /// Kills and deletes the task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container has no task.
    async fn kill_task(&self, task_id: &TaskId) -> Result<()>;

    /// Deletes the container and its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container does not exist.
    async fn delete_container(&self, task_id: &TaskId) -> Result<()>;

    /// Lists every container in this node's namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Samples CPU and memory usage of the task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container has no running task.
    async fn task_stats(&self, task_id: &TaskId) -> Result<TaskStats>;

    /// Returns the disk usage of the container's writable snapshot in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be inspected.
    async fn snapshot_usage(&self, task_id: &TaskId) -> Result<u64>;
}
