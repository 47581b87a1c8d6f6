//! Shared fixtures for runtime integration tests.
//!
//! `FakeEngine` is a scripted in-memory container engine and `FakeNetwork`
//! records overlay calls. Both are driven directly by the tests.

#![allow(
    dead_code,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc
)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use stevedore_common::config::NodeConfig;
use stevedore_common::error::{Result, StevedoreError};
use stevedore_common::types::TaskId;
use stevedore_net::NetworkManager;
use stevedore_runtime::backend::{
    ContainerEngine, ContainerInfo, ExecOutput, ExecutionSpec, ExitWaiter, ImageRef, TaskStats,
};
use stevedore_runtime::container::ServiceSnapshot;
use stevedore_runtime::{Engine, StatusCallback};
use tokio::sync::{Notify, oneshot};

// ── Fake container engine ────────────────────────────────────────────

#[derive(Debug)]
struct FakeContainer {
    has_task: bool,
    running: bool,
    pid: u32,
}

#[derive(Default)]
struct FakeState {
    local_images: HashSet<String>,
    pullable_images: HashSet<String>,
    containers: HashMap<TaskId, FakeContainer>,
    exits: HashMap<TaskId, oneshot::Sender<Result<i64>>>,
    health_codes: VecDeque<i64>,
    next_pid: u32,

    fail_create: bool,
    fail_task: bool,
    fail_start: bool,
    fail_exec: bool,
    fail_list: bool,
    fail_delete: bool,
    hang_kill: bool,
    exit_on_start: Option<i64>,
    panic_on_start: bool,
    start_gate: Option<Arc<Notify>>,
    start_entered: bool,

    created: Vec<ExecutionSpec>,
    pulled: Vec<String>,
    execs: Vec<(TaskId, String, Vec<String>)>,
    killed: Vec<TaskId>,
    deleted: Vec<TaskId>,
}

/// Scripted in-memory container engine.
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        let engine = Self::default();
        engine.state.lock().next_pid = 1000;
        Arc::new(engine)
    }

    pub fn with_local_image(self: &Arc<Self>, image: &str) -> Arc<Self> {
        let _ = self.state.lock().local_images.insert(image.to_string());
        Arc::clone(self)
    }

    pub fn with_pullable_image(self: &Arc<Self>, image: &str) -> Arc<Self> {
        let _ = self.state.lock().pullable_images.insert(image.to_string());
        Arc::clone(self)
    }

    pub fn fail_create(&self) {
        self.state.lock().fail_create = true;
    }

    pub fn fail_task(&self) {
        self.state.lock().fail_task = true;
    }

    pub fn fail_start(&self) {
        self.state.lock().fail_start = true;
    }

    pub fn fail_exec(&self) {
        self.state.lock().fail_exec = true;
    }

    pub fn fail_list(&self) {
        self.state.lock().fail_list = true;
    }

    pub fn fail_delete(&self) {
        self.state.lock().fail_delete = true;
    }

    pub fn hang_kill(&self) {
        self.state.lock().hang_kill = true;
    }

    /// Makes every started task exit with `code` before its waiter is polled.
    pub fn exit_on_start(&self, code: i64) {
        self.state.lock().exit_on_start = Some(code);
    }

    /// Makes `start_task` panic, taking the supervisor down with it.
    pub fn panic_on_start(&self) {
        self.state.lock().panic_on_start = true;
    }

    /// Parks `start_task` until the returned gate is notified.
    pub fn hold_start(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().start_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn start_entered(&self) -> bool {
        self.state.lock().start_entered
    }

    /// Exit codes returned by successive health-check execs; 0 once exhausted.
    pub fn script_health(&self, codes: &[i64]) {
        self.state.lock().health_codes = codes.iter().copied().collect();
    }

    /// Places a container directly in the engine, bypassing the node.
    pub fn insert_container(&self, task_id: &TaskId, running: bool) {
        let mut state = self.state.lock();
        state.next_pid += 1;
        let pid = state.next_pid;
        let _ = state.containers.insert(
            task_id.clone(),
            FakeContainer {
                has_task: running,
                running,
                pid,
            },
        );
    }

    /// Makes the task exit on its own with `code`.
    pub fn exit(&self, task_id: &TaskId, code: i64) {
        let mut state = self.state.lock();
        if let Some(container) = state.containers.get_mut(task_id) {
            container.running = false;
        }
        if let Some(tx) = state.exits.remove(task_id) {
            let _ = tx.send(Ok(code));
        }
    }

    pub fn has_container(&self, task_id: &TaskId) -> bool {
        self.state.lock().containers.contains_key(task_id)
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().containers.len()
    }

    pub fn created(&self) -> Vec<ExecutionSpec> {
        self.state.lock().created.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().pulled.clone()
    }

    pub fn execs(&self) -> Vec<(TaskId, String, Vec<String>)> {
        self.state.lock().execs.clone()
    }

    pub fn killed(&self) -> Vec<TaskId> {
        self.state.lock().killed.clone()
    }

    pub fn deleted(&self) -> Vec<TaskId> {
        self.state.lock().deleted.clone()
    }
}

fn not_found(kind: &'static str, task_id: &TaskId) -> StevedoreError {
    StevedoreError::NotFound {
        kind,
        id: task_id.to_string(),
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn get_image(&self, reference: &str) -> Result<ImageRef> {
        if self.state.lock().local_images.contains(reference) {
            return Ok(ImageRef {
                reference: reference.to_string(),
                id: format!("sha256:{reference}"),
            });
        }
        Err(StevedoreError::NotFound {
            kind: "image",
            id: reference.to_string(),
        })
    }

    async fn pull_image(&self, reference: &str) -> Result<ImageRef> {
        let mut state = self.state.lock();
        if !state.pullable_images.contains(reference) {
            return Err(StevedoreError::engine(format!("pull access denied for {reference}")));
        }
        state.pulled.push(reference.to_string());
        let _ = state.local_images.insert(reference.to_string());
        Ok(ImageRef {
            reference: reference.to_string(),
            id: format!("sha256:{reference}"),
        })
    }

    async fn create_container(&self, spec: &ExecutionSpec) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_create {
            return Err(StevedoreError::engine("no space left on device"));
        }
        if state.containers.contains_key(&spec.task_id) {
            return Err(StevedoreError::engine(format!("name {} already in use", spec.task_id)));
        }
        state.created.push(spec.clone());
        let _ = state.containers.insert(
            spec.task_id.clone(),
            FakeContainer {
                has_task: false,
                running: false,
                pid: 0,
            },
        );
        Ok(())
    }

    async fn create_task(&self, task_id: &TaskId, log_path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_task {
            return Err(StevedoreError::engine("task create failed"));
        }
        assert!(log_path.exists(), "log sink must exist before task creation");
        state.next_pid += 1;
        let pid = state.next_pid;
        let container = state
            .containers
            .get_mut(task_id)
            .ok_or_else(|| not_found("container", task_id))?;
        container.has_task = true;
        container.pid = pid;
        Ok(())
    }

    async fn wait_task(&self, task_id: &TaskId) -> Result<ExitWaiter> {
        let (tx, rx) = oneshot::channel();
        let _ = self.state.lock().exits.insert(task_id.clone(), tx);
        Ok(Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(StevedoreError::engine("task deleted")))
        }))
    }

    async fn start_task(&self, task_id: &TaskId) -> Result<u32> {
        let gate = {
            let mut state = self.state.lock();
            state.start_entered = true;
            state.start_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let crash = self.state.lock().panic_on_start;
        if crash {
            panic!("engine crashed while starting {task_id}");
        }

        let mut state = self.state.lock();
        if state.fail_start {
            return Err(StevedoreError::engine("exec format error"));
        }
        let exit_code = state.exit_on_start;
        let container = state
            .containers
            .get_mut(task_id)
            .filter(|c| c.has_task)
            .ok_or_else(|| not_found("task", task_id))?;
        container.running = exit_code.is_none();
        let pid = container.pid;
        if let Some(code) = exit_code {
            if let Some(tx) = state.exits.remove(task_id) {
                let _ = tx.send(Ok(code));
            }
        }
        Ok(pid)
    }

    async fn exec(&self, task_id: &TaskId, exec_id: &str, args: &[String]) -> Result<ExecOutput> {
        let mut state = self.state.lock();
        state
            .execs
            .push((task_id.clone(), exec_id.to_string(), args.to_vec()));
        if state.fail_exec {
            return Err(StevedoreError::engine("executable file not found in $PATH"));
        }
        let exit_code = state.health_codes.pop_front().unwrap_or(0);
        Ok(ExecOutput {
            exit_code,
            output: format!("probe exited {exit_code}"),
        })
    }

    async fn kill_task(&self, task_id: &TaskId) -> Result<()> {
        let hang = self.state.lock().hang_kill;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(task_id)
            .ok_or_else(|| not_found("container", task_id))?;
        if !container.has_task {
            return Err(not_found("task", task_id));
        }
        container.has_task = false;
        container.running = false;
        state.killed.push(task_id.clone());
        if let Some(tx) = state.exits.remove(task_id) {
            let _ = tx.send(Ok(137));
        }
        Ok(())
    }

    async fn delete_container(&self, task_id: &TaskId) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_delete {
            return Err(StevedoreError::engine("device or resource busy"));
        }
        let _ = state
            .containers
            .remove(task_id)
            .ok_or_else(|| not_found("container", task_id))?;
        let _ = state.exits.remove(task_id);
        state.deleted.push(task_id.clone());
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock();
        if state.fail_list {
            return Err(StevedoreError::engine("engine unavailable"));
        }
        Ok(state
            .containers
            .iter()
            .map(|(task_id, c)| ContainerInfo {
                task_id: task_id.clone(),
                running: c.running,
            })
            .collect())
    }

    async fn task_stats(&self, task_id: &TaskId) -> Result<TaskStats> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(task_id)
            .filter(|c| c.running)
            .ok_or_else(|| not_found("task", task_id))?;
        Ok(TaskStats {
            pid: container.pid,
            cpu_percent: 12.5,
            memory_bytes: 64 * 1024 * 1024,
        })
    }

    async fn snapshot_usage(&self, task_id: &TaskId) -> Result<u64> {
        if self.state.lock().containers.contains_key(task_id) {
            Ok(4096)
        } else {
            Err(not_found("snapshot", task_id))
        }
    }
}

// ── Fake network manager ─────────────────────────────────────────────

/// Records overlay attach and detach calls.
#[derive(Default)]
pub struct FakeNetwork {
    pub attached: Mutex<Vec<(u32, String, u32, String)>>,
    pub detached: Mutex<Vec<(String, u32)>>,
    fail_attach: Mutex<bool>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_attach(&self) {
        *self.fail_attach.lock() = true;
    }
}

#[async_trait]
impl NetworkManager for FakeNetwork {
    async fn attach(&self, pid: u32, service_name: &str, instance: u32, ports: &str) -> Result<()> {
        if *self.fail_attach.lock() {
            return Err(StevedoreError::Network {
                message: "overlay unreachable".into(),
            });
        }
        self.attached
            .lock()
            .push((pid, service_name.to_string(), instance, ports.to_string()));
        Ok(())
    }

    async fn detach(&self, service_name: &str, instance: u32) -> Result<()> {
        self.detached
            .lock()
            .push((service_name.to_string(), instance));
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

pub const IMAGE: &str = "docker.io/library/nginx:latest";

pub fn test_config(dir: &Path, overlay: bool) -> NodeConfig {
    NodeConfig {
        overlay,
        event_log: dir.join("eventLogger.csv"),
        log_dir: dir.join("logs"),
        undeploy_timeout_ms: 1_000,
        health_check_backoff_ms: 10,
        ..NodeConfig::default()
    }
}

pub async fn start_engine(
    dir: &Path,
    engine: &Arc<FakeEngine>,
    network: &Arc<FakeNetwork>,
    overlay: bool,
) -> Engine {
    Engine::with_collaborators(
        test_config(dir, overlay),
        Arc::clone(engine) as Arc<dyn ContainerEngine>,
        Arc::clone(network) as Arc<dyn NetworkManager>,
    )
    .await
    .expect("engine starts")
}

/// Status callback that stores every snapshot it receives.
pub fn recorder() -> (StatusCallback, Arc<Mutex<Vec<ServiceSnapshot>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: StatusCallback = Arc::new(move |snapshot| sink.lock().push(snapshot));
    (callback, seen)
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
