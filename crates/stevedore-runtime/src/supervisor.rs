//! Per-instance lifecycle supervisor.
//!
//! One supervisor task brings an instance up, watches it, and tears it down.
//! Everything after container creation is covered by [`CleanupGuard`], which
//! runs exactly once whether the supervisor returns, fails, panics or is
//! aborted.

use std::sync::Arc;

use stevedore_common::error::{Result, StevedoreError};
use stevedore_common::types::{ServiceSpec, ServiceStatus, TaskId};
use tempfile::NamedTempFile;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::backend::ImageRef;
use crate::container::ServiceSnapshot;
use crate::engine::{EngineContext, StatusCallback};
use crate::events::EventKind;
use crate::health;
use crate::logs;
use crate::recovery;
use crate::spec;
use crate::stop::{StopAck, StopListener, StopRequests};

/// Startup handshake answered once the task runs, or with the bring-up error.
pub(crate) type StartupSender = oneshot::Sender<Result<()>>;

const ABORTED_DETAIL: &str = "supervisor terminated unexpectedly";

/// How a supervised instance ended.
#[derive(Debug)]
enum Exit {
    Exited(i64),
    Killed,
    Failed(StevedoreError),
}

impl Exit {
    const fn status(&self) -> ServiceStatus {
        match self {
            Self::Exited(_) | Self::Killed => ServiceStatus::Dead,
            Self::Failed(_) => ServiceStatus::Failed,
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Exited(code) => format!("Container exited with status: {code}"),
            Self::Killed => "Killed by undeploy request".to_string(),
            Self::Failed(e) => e.to_string(),
        }
    }

    fn into_startup_error(self, task_id: &TaskId) -> StevedoreError {
        match self {
            Self::Failed(e) => e,
            other => StevedoreError::TaskStart {
                task_id: task_id.to_string(),
                message: other.detail(),
            },
        }
    }
}

/// Supervises one instance from container creation to teardown.
///
/// The registry record must already be reserved by the caller.
pub(crate) async fn supervise(
    ctx: Arc<EngineContext>,
    spec: ServiceSpec,
    image: ImageRef,
    listener: StopListener,
    on_status: StatusCallback,
    startup: StartupSender,
) {
    let task_id = spec.task_id();
    let (mut requests, mut ack) = listener.into_parts();

    let resolv = match provision(&ctx, &spec, image).await {
        Ok(resolv) => resolv,
        Err(e) => {
            tracing::error!(task_id = %task_id, error = %e, "bring-up failed, rolling back");
            let _ = ctx.registry.remove(&task_id);
            ack.acknowledge(true);
            let _ = startup.send(Err(e));
            return;
        }
    };

    let mut guard = CleanupGuard {
        ctx: Arc::clone(&ctx),
        spec,
        task_id,
        on_status,
        ack: Some(ack),
        startup: Some(startup),
        health: None,
        resolv: Some(resolv),
        dead_recorded: false,
        reported: false,
        teardown_done: false,
        finished: false,
    };
    let exit = run(&ctx, &mut guard, &mut requests).await;
    guard.finish(exit).await;
}

/// Creates the container and its task. Leaves nothing behind on failure.
async fn provision(
    ctx: &EngineContext,
    spec: &ServiceSpec,
    image: ImageRef,
) -> Result<NamedTempFile> {
    let task_id = spec.task_id();
    let resolv = spec::write_resolv_conf(task_id.as_str(), &ctx.config.nameserver)?;
    let execution = spec::build_execution_spec(spec, image, &ctx.config.namespace, &resolv);

    ctx.engine
        .create_container(&execution)
        .await
        .map_err(|e| StevedoreError::ContainerCreate {
            task_id: task_id.to_string(),
            message: e.to_string(),
        })?;
    tracing::debug!(task_id = %task_id, "container created");

    let created = match logs::prepare_service_log(&ctx.config.log_dir, &task_id) {
        Ok(log_path) => ctx.engine.create_task(&task_id, &log_path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = created {
        if let Err(delete) = ctx.engine.delete_container(&task_id).await {
            tracing::warn!(task_id = %task_id, error = %delete, "unable to delete container after task failure");
        }
        return Err(StevedoreError::TaskCreate {
            task_id: task_id.to_string(),
            message: e.to_string(),
        });
    }
    Ok(resolv)
}

/// Starts the task and waits for the first terminal event.
async fn run(ctx: &EngineContext, guard: &mut CleanupGuard, requests: &mut StopRequests) -> Exit {
    let task_id = guard.task_id.clone();
    let spec = guard.spec.clone();
    let start_error = |e: StevedoreError| {
        Exit::Failed(StevedoreError::TaskStart {
            task_id: task_id.to_string(),
            message: e.to_string(),
        })
    };

    let mut waiter = match ctx.engine.wait_task(&task_id).await {
        Ok(waiter) => waiter,
        Err(e) => return start_error(e),
    };
    let pid = match ctx.engine.start_task(&task_id).await {
        Ok(pid) => pid,
        Err(e) => return start_error(e),
    };

    if ctx.config.overlay {
        if let Err(e) = ctx
            .network
            .attach(pid, &spec.service_name, spec.instance, &spec.ports)
            .await
        {
            return Exit::Failed(StevedoreError::NetworkAttach {
                task_id: task_id.to_string(),
                message: e.to_string(),
            });
        }
    }

    let _ = ctx.registry.update(&task_id, |record| {
        record.status = ServiceStatus::Running;
        record.pid = Some(pid);
    });
    guard.startup_succeeded();
    ctx.events.record(EventKind::Deployed, task_id.as_str(), "");
    tracing::info!(task_id = %task_id, pid, "service started");

    let mut health = tokio::spawn(health::health_loop(
        Arc::clone(&ctx.engine),
        Arc::clone(&ctx.registry),
        spec,
        ctx.config.health_check_backoff(),
    ));
    guard.health = Some(health.abort_handle());
    let mut health_done = false;

    loop {
        tokio::select! {
            exit = &mut waiter => {
                return match exit {
                    Ok(code) => Exit::Exited(code),
                    Err(e) => Exit::Failed(e),
                };
            }
            () = requests.requested() => {
                tracing::info!(task_id = %task_id, "stop requested");
                return Exit::Killed;
            }
            joined = &mut health, if !health_done => {
                health_done = true;
                match joined {
                    Ok(None) => {}
                    Ok(Some(e)) => return Exit::Failed(e),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        return Exit::Failed(StevedoreError::HealthCheckFatal {
                            task_id: task_id.to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Scoped teardown of one instance.
///
/// [`finish`](Self::finish) is the normal path. If the supervisor is dropped
/// before finishing, `Drop` performs the synchronous steps and hands the
/// engine teardown to the runtime.
struct CleanupGuard {
    ctx: Arc<EngineContext>,
    spec: ServiceSpec,
    task_id: TaskId,
    on_status: StatusCallback,
    ack: Option<StopAck>,
    startup: Option<StartupSender>,
    health: Option<AbortHandle>,
    resolv: Option<NamedTempFile>,
    dead_recorded: bool,
    reported: bool,
    teardown_done: bool,
    finished: bool,
}

impl CleanupGuard {
    fn startup_succeeded(&mut self) {
        if let Some(startup) = self.startup.take() {
            let _ = startup.send(Ok(()));
        }
    }

    fn record_dead(&mut self) {
        if !self.dead_recorded {
            self.dead_recorded = true;
            self.ctx
                .events
                .record(EventKind::Dead, self.task_id.as_str(), "");
        }
    }

    fn stop_health(&mut self) {
        if let Some(health) = self.health.take() {
            health.abort();
        }
    }

    /// Removes the record with its terminal status and returns the final snapshot.
    fn retire(&self, status: ServiceStatus, detail: String) -> ServiceSnapshot {
        let _ = self.ctx.registry.update(&self.task_id, |record| {
            record.status = status;
            record.status_detail.clone_from(&detail);
        });
        self.ctx.registry.remove(&self.task_id).map_or_else(
            || ServiceSnapshot {
                spec: self.spec.clone(),
                status,
                status_detail: detail.clone(),
                pid: None,
            },
            |record| record.snapshot(),
        )
    }

    fn report(&mut self, snapshot: ServiceSnapshot) {
        if !self.reported {
            self.reported = true;
            (self.on_status)(snapshot);
        }
    }

    async fn finish(mut self, exit: Exit) {
        let ctx = Arc::clone(&self.ctx);
        if let Exit::Exited(code) = exit {
            ctx.events.record(
                EventKind::Dead,
                self.task_id.as_str(),
                &format!("{{'status': {code}}}"),
            );
        }
        self.record_dead();
        self.stop_health();

        let removed = recovery::remove_container(ctx.engine.as_ref(), &self.task_id).await;
        let snapshot = self.retire(exit.status(), exit.detail());
        if ctx.config.overlay {
            if let Err(e) = ctx
                .network
                .detach(&self.spec.service_name, self.spec.instance)
                .await
            {
                tracing::warn!(task_id = %self.task_id, error = %e, "unable to detach network");
            }
        }
        self.teardown_done = true;

        match exit.status() {
            ServiceStatus::Failed => {
                tracing::error!(task_id = %self.task_id, detail = %snapshot.status_detail, "service failed");
            }
            _ => tracing::info!(task_id = %self.task_id, detail = %snapshot.status_detail, "service ended"),
        }
        self.report(snapshot);
        if let Some(mut ack) = self.ack.take() {
            ack.acknowledge(removed);
        }
        if let Some(startup) = self.startup.take() {
            let _ = startup.send(Err(exit.into_startup_error(&self.task_id)));
        }
        drop(self.resolv.take());
        self.finished = true;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        tracing::error!(task_id = %self.task_id, "supervisor ended without cleanup, tearing down");
        self.record_dead();
        self.stop_health();
        let snapshot = self.retire(ServiceStatus::Failed, ABORTED_DETAIL.to_string());
        self.report(snapshot);
        if let Some(startup) = self.startup.take() {
            let _ = startup.send(Err(StevedoreError::TaskStart {
                task_id: self.task_id.to_string(),
                message: ABORTED_DETAIL.to_string(),
            }));
        }

        let ack = self.ack.take();
        if self.teardown_done {
            if let Some(mut ack) = ack {
                ack.acknowledge(true);
            }
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let ctx = Arc::clone(&self.ctx);
            let task_id = self.task_id.clone();
            let spec = self.spec.clone();
            let _ = handle.spawn(async move {
                let removed = recovery::remove_container(ctx.engine.as_ref(), &task_id).await;
                if ctx.config.overlay {
                    let _ = ctx.network.detach(&spec.service_name, spec.instance).await;
                }
                if let Some(mut ack) = ack {
                    ack.acknowledge(removed);
                }
            });
        } else if let Some(mut ack) = ack {
            ack.acknowledge(false);
        }
    }
}
