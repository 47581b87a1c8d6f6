//! Container engine backed by the Docker Engine API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions, Stats,
    StatsOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerState, DeviceRequest, HostConfig, Mount, MountTypeEnum};
use futures::StreamExt;
use parking_lot::Mutex;
use stevedore_common::constants::NAMESPACE_LABEL;
use stevedore_common::error::{Result, StevedoreError};
use stevedore_common::types::TaskId;
use tokio::io::AsyncWriteExt;

use super::{
    ContainerEngine, ContainerInfo, ExecOutput, ExecutionSpec, ExitWaiter, ImageRef, TaskStats,
};

/// Seconds the client waits for an API answer.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Container engine driving a local Docker daemon.
///
/// Docker has no separate task object: a started container is its task.
/// Task creation therefore only validates the container and remembers where
/// its output should go; the log follower starts together with the task.
pub struct DockerEngine {
    docker: Docker,
    namespace: String,
    log_paths: Mutex<HashMap<TaskId, PathBuf>>,
}

impl DockerEngine {
    /// Connects to the daemon at `socket`, or to the local defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be configured.
    pub fn connect(socket: Option<&Path>, namespace: impl Into<String>) -> Result<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(
                &path.to_string_lossy(),
                CLIENT_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| StevedoreError::engine(format!("unable to connect to docker: {e}")))?;
        Ok(Self {
            docker,
            namespace: namespace.into(),
            log_paths: Mutex::new(HashMap::new()),
        })
    }

    /// Checks that the daemon answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable.
    pub async fn ping(&self) -> Result<()> {
        let _ = self
            .docker
            .ping()
            .await
            .map_err(|e| StevedoreError::engine(format!("docker ping failed: {e}")))?;
        Ok(())
    }

    async fn inspect_state(&self, task_id: &TaskId) -> Result<ContainerState> {
        let info = self
            .docker
            .inspect_container(task_id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(task_id, e))?;
        Ok(info.state.unwrap_or_default())
    }

    async fn inspect_pid(&self, task_id: &TaskId) -> Result<Option<u32>> {
        let state = self.inspect_state(task_id).await?;
        if !state.running.unwrap_or(false) {
            return Ok(None);
        }
        Ok(state.pid.and_then(|pid| u32::try_from(pid).ok()))
    }

    fn follow_logs(&self, task_id: &TaskId, log_path: PathBuf) {
        let docker = self.docker.clone();
        let name = task_id.to_string();
        let _ = tokio::spawn(async move {
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .await
            {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(task_id = %name, path = %log_path.display(), error = %e, "cannot open service log");
                    return;
                }
            };
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                tail: "all".to_string(),
                ..Default::default()
            };
            let mut stream = Box::pin(docker.logs(&name, Some(options)));
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(output) => {
                        if let Err(e) = file.write_all(&output.into_bytes()).await {
                            tracing::warn!(task_id = %name, error = %e, "service log write failed");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(task_id = %name, error = %e, "log stream closed");
                        break;
                    }
                }
            }
            let _ = file.flush().await;
        });
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn get_image(&self, reference: &str) -> Result<ImageRef> {
        let image = self
            .docker
            .inspect_image(reference)
            .await
            .map_err(|e| match e {
                DockerError::DockerResponseServerError {
                    status_code: 404, ..
                } => StevedoreError::NotFound {
                    kind: "image",
                    id: reference.to_string(),
                },
                other => StevedoreError::engine(other.to_string()),
            })?;
        Ok(ImageRef {
            reference: reference.to_string(),
            id: image.id.unwrap_or_else(|| reference.to_string()),
        })
    }

    async fn pull_image(&self, reference: &str) -> Result<ImageRef> {
        tracing::info!(image = reference, "pulling image");
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };
        let mut progress = Box::pin(self.docker.create_image(Some(options), None, None));
        while let Some(step) = progress.next().await {
            let step = step.map_err(|e| StevedoreError::engine(e.to_string()))?;
            if let Some(status) = step.status {
                tracing::debug!(image = reference, status = %status, "pull progress");
            }
        }
        self.get_image(reference).await
    }

    async fn create_container(&self, spec: &ExecutionSpec) -> Result<()> {
        let mounts = spec
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.destination.clone()),
                source: Some(m.source.to_string_lossy().into_owned()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();
        let device_requests = spec.gpus.then(|| {
            vec![DeviceRequest {
                count: Some(-1),
                capabilities: Some(vec![vec!["gpu".to_string()]]),
                ..Default::default()
            }]
        });
        let host_config = HostConfig {
            mounts: Some(mounts),
            device_requests,
            nano_cpus: (spec.cpus > 0).then(|| i64::from(spec.cpus) * 1_000_000_000),
            memory: (spec.memory_mb > 0)
                .then(|| i64::try_from(memory_bytes(spec.memory_mb)).unwrap_or(i64::MAX)),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.id.clone()),
            hostname: Some(spec.hostname.clone()),
            env: Some(spec.env.clone()),
            cmd: spec.command.clone(),
            labels: Some(spec.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: spec.task_id.as_str(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_error(&spec.task_id, e))?;
        for warning in response.warnings {
            tracing::warn!(task_id = %spec.task_id, warning = %warning, "container created with warning");
        }
        Ok(())
    }

    async fn create_task(&self, task_id: &TaskId, log_path: &Path) -> Result<()> {
        let _ = self
            .docker
            .inspect_container(task_id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(task_id, e))?;
        let _ = self
            .log_paths
            .lock()
            .insert(task_id.clone(), log_path.to_path_buf());
        Ok(())
    }

    async fn wait_task(&self, task_id: &TaskId) -> Result<ExitWaiter> {
        let docker = self.docker.clone();
        let task_id = task_id.clone();
        // "not-running" answers at once for a container that already exited,
        // so the request is only sent when the waiter is first polled.
        Ok(Box::pin(async move {
            let options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut stream = Box::pin(docker.wait_container(task_id.as_str(), Some(options)));
            match stream.next().await {
                Some(Ok(response)) => Ok(response.status_code),
                Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
                Some(Err(e)) => Err(map_error(&task_id, e)),
                None => Err(StevedoreError::engine(format!(
                    "wait stream for {task_id} ended without an exit status"
                ))),
            }
        }))
    }

    async fn start_task(&self, task_id: &TaskId) -> Result<u32> {
        self.docker
            .start_container(task_id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error(task_id, e))?;
        let log_path = self.log_paths.lock().get(task_id).cloned();
        if let Some(path) = log_path {
            self.follow_logs(task_id, path);
        }
        let state = self.inspect_state(task_id).await?;
        started_pid(task_id, &state)
    }

    async fn exec(&self, task_id: &TaskId, exec_id: &str, args: &[String]) -> Result<ExecOutput> {
        tracing::debug!(task_id = %task_id, exec_id, cmd = ?args, "exec in container");
        let options = CreateExecOptions {
            cmd: Some(args.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(task_id.as_str(), options)
            .await
            .map_err(|e| map_error(task_id, e))?;
        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| StevedoreError::engine(e.to_string()))?;

        let mut output = String::new();
        if let StartExecResults::Attached { output: mut stream, .. } = started {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| StevedoreError::engine(e.to_string()))?;
                output.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| StevedoreError::engine(e.to_string()))?;
        let exit_code = inspect.exit_code.ok_or_else(|| {
            StevedoreError::engine(format!("exec {exec_id} finished without an exit code"))
        })?;
        Ok(ExecOutput { exit_code, output })
    }

    async fn kill_task(&self, task_id: &TaskId) -> Result<()> {
        self.docker
            .kill_container(task_id.as_str(), None::<KillContainerOptions<String>>)
            .await
            .map_err(|e| map_error(task_id, e))
    }

    async fn delete_container(&self, task_id: &TaskId) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        let removed = self
            .docker
            .remove_container(task_id.as_str(), Some(options))
            .await
            .map_err(|e| map_error(task_id, e));
        let _ = self.log_paths.lock().remove(task_id);
        removed
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{NAMESPACE_LABEL}={}", self.namespace)],
        )]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| StevedoreError::engine(e.to_string()))?;
        Ok(summaries
            .into_iter()
            .filter_map(|summary| {
                let name = summary.names?.into_iter().next()?;
                Some(ContainerInfo {
                    task_id: TaskId::new(name.trim_start_matches('/')),
                    running: summary.state.as_deref() == Some("running"),
                })
            })
            .collect())
    }

    async fn task_stats(&self, task_id: &TaskId) -> Result<TaskStats> {
        let pid = self
            .inspect_pid(task_id)
            .await?
            .ok_or_else(|| StevedoreError::NotFound {
                kind: "task",
                id: task_id.to_string(),
            })?;
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let stats = Box::pin(self.docker.stats(task_id.as_str(), Some(options)))
            .next()
            .await
            .ok_or_else(|| StevedoreError::engine(format!("no stats for {task_id}")))?
            .map_err(|e| map_error(task_id, e))?;
        Ok(TaskStats {
            pid,
            cpu_percent: cpu_percent(&stats),
            memory_bytes: stats.memory_stats.usage.unwrap_or(0),
        })
    }

    async fn snapshot_usage(&self, task_id: &TaskId) -> Result<u64> {
        let info = self
            .docker
            .inspect_container(task_id.as_str(), Some(InspectContainerOptions { size: true }))
            .await
            .map_err(|e| map_error(task_id, e))?;
        Ok(info
            .size_rw
            .and_then(|size| u64::try_from(size).ok())
            .unwrap_or(0))
    }
}

/// Memory limit in bytes, saturating for absurd megabyte counts.
const fn memory_bytes(memory_mb: u64) -> u64 {
    memory_mb.saturating_mul(1024 * 1024)
}

/// Host pid of a freshly started container.
///
/// A container that is already gone by the time it is inspected has no pid
/// to report, so the start is treated as failed.
fn started_pid(task_id: &TaskId, state: &ContainerState) -> Result<u32> {
    let pid = state.pid.and_then(|pid| u32::try_from(pid).ok()).unwrap_or(0);
    if state.running.unwrap_or(false) && pid > 0 {
        return Ok(pid);
    }
    Err(StevedoreError::engine(format!(
        "{task_id} exited during start with status {}",
        state.exit_code.unwrap_or_default()
    )))
}

/// CPU usage between the two samples of a stats reading, in percent of one CPU.
#[allow(clippy::cast_precision_loss)]
fn cpu_percent(stats: &Stats) -> f64 {
    let cpu = &stats.cpu_stats;
    let pre = &stats.precpu_stats;
    let cpu_delta = cpu.cpu_usage.total_usage as f64 - pre.cpu_usage.total_usage as f64;
    let system_delta =
        cpu.system_cpu_usage.unwrap_or(0) as f64 - pre.system_cpu_usage.unwrap_or(0) as f64;
    let online = cpu
        .online_cpus
        .or_else(|| cpu.cpu_usage.percpu_usage.as_ref().map(|v| v.len() as u64))
        .unwrap_or(1);
    if cpu_delta > 0.0 && system_delta > 0.0 {
        cpu_delta / system_delta * online as f64 * 100.0
    } else {
        0.0
    }
}

/// Translates daemon answers that mean "gone" into `NotFound`.
fn map_error(task_id: &TaskId, err: DockerError) -> StevedoreError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => StevedoreError::NotFound {
            kind: "container",
            id: task_id.to_string(),
        },
        DockerError::DockerResponseServerError {
            status_code: 409,
            message,
        } if message.contains("is not running") => StevedoreError::NotFound {
            kind: "task",
            id: task_id.to_string(),
        },
        other => StevedoreError::engine(other.to_string()),
    }
}
