//! Node engine façade: deploy, undeploy, monitoring and shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use stevedore_common::config::NodeConfig;
use stevedore_common::error::{Result, StevedoreError};
use stevedore_common::types::{ResourceSample, ServiceSpec, TaskId};
use stevedore_net::{HttpNetManager, NetworkManager};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::{ContainerEngine, DockerEngine, ImageRef};
use crate::container::{ServiceRecord, ServiceSnapshot};
use crate::events::{EventKind, EventLog};
use crate::state::ServiceRegistry;
use crate::stop::{StopOutcome, stop_mailbox};
use crate::{logs, metrics, recovery, supervisor};

/// Called once with the final snapshot when an instance ends.
pub type StatusCallback = Arc<dyn Fn(ServiceSnapshot) + Send + Sync>;

/// Called once per monitoring pass with the collected batch.
pub type SampleCallback = Arc<dyn Fn(Vec<ResourceSample>) + Send + Sync>;

/// Collaborators shared by the façade, the supervisors and the monitor.
pub(crate) struct EngineContext {
    pub(crate) engine: Arc<dyn ContainerEngine>,
    pub(crate) network: Arc<dyn NetworkManager>,
    pub(crate) registry: Arc<ServiceRegistry>,
    pub(crate) events: Arc<EventLog>,
    pub(crate) config: NodeConfig,
}

/// The node engine.
///
/// Created once per process. Initialization removes every container left in
/// the node namespace by a previous run; nothing is re-adopted.
pub struct Engine {
    ctx: Arc<EngineContext>,
    monitoring: AtomicBool,
    recovered: usize,
}

impl Engine {
    /// Connects to the local Docker daemon and the network manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the daemon is
    /// unreachable or the event log cannot be opened.
    pub async fn connect(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let docker = DockerEngine::connect(config.engine_socket.as_deref(), config.namespace.clone())?;
        docker.ping().await?;
        let network = HttpNetManager::new(config.net_manager_url.clone());
        Self::with_collaborators(config, Arc::new(docker), Arc::new(network)).await
    }

    /// Builds an engine over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the event log cannot be opened.
    pub async fn with_collaborators(
        config: NodeConfig,
        engine: Arc<dyn ContainerEngine>,
        network: Arc<dyn NetworkManager>,
    ) -> Result<Self> {
        let events = Arc::new(EventLog::open(&config.event_log)?);
        let recovered = recovery::force_cleanup(engine.as_ref(), None).await;
        tracing::info!(
            namespace = %config.namespace,
            overlay = config.overlay,
            recovered,
            "engine initialized"
        );
        Ok(Self {
            ctx: Arc::new(EngineContext {
                engine,
                network,
                registry: Arc::new(ServiceRegistry::new()),
                events,
                config,
            }),
            monitoring: AtomicBool::new(false),
            recovered,
        })
    }

    /// Deploys one service instance.
    ///
    /// Returns once the task has started, without waiting for it to become
    /// healthy. `on_status` is called once when the instance ends.
    ///
    /// # Errors
    ///
    /// Returns `ImageResolution` if the image is unavailable,
    /// `AlreadyDeployed` if the instance is live, or the step-specific error
    /// of a failed bring-up.
    pub async fn deploy(&self, spec: ServiceSpec, on_status: StatusCallback) -> Result<()> {
        let task_id = spec.task_id();
        self.ctx
            .events
            .record(EventKind::DeployRequest, task_id.as_str(), "");
        tracing::info!(task_id = %task_id, image = %spec.image, "deploy requested");

        let image = self.resolve_image(&spec.image).await?;

        let (handle, listener) = stop_mailbox();
        if !self
            .ctx
            .registry
            .insert_if_absent(task_id.clone(), ServiceRecord::new(spec.clone(), handle))
        {
            return Err(StevedoreError::AlreadyDeployed {
                task_id: task_id.to_string(),
            });
        }

        let (startup_tx, startup_rx) = oneshot::channel();
        let _ = tokio::spawn(supervisor::supervise(
            Arc::clone(&self.ctx),
            spec,
            image,
            listener,
            on_status,
            startup_tx,
        ));
        startup_rx.await.unwrap_or_else(|_| {
            Err(StevedoreError::TaskStart {
                task_id: task_id.to_string(),
                message: "supervisor ended before startup".into(),
            })
        })
    }

    async fn resolve_image(&self, reference: &str) -> Result<ImageRef> {
        match self.ctx.engine.get_image(reference).await {
            Ok(image) => return Ok(image),
            Err(e) if e.is_not_found() => {
                tracing::debug!(image = reference, "image not present locally");
            }
            Err(e) => tracing::warn!(image = reference, error = %e, "local image lookup failed"),
        }
        self.ctx
            .engine
            .pull_image(reference)
            .await
            .map_err(|e| StevedoreError::ImageResolution {
                image: reference.to_string(),
                message: e.to_string(),
            })
    }

    /// Stops one service instance and waits for its teardown.
    ///
    /// # Errors
    ///
    /// Returns `StopFailure` if teardown failed, `StopTimeout` if the
    /// supervisor did not answer in time, or `NotFound` if no record exists
    /// (any matching container is removed anyway).
    pub async fn undeploy(&self, service_name: &str, instance: u32) -> Result<()> {
        let task_id = TaskId::encode(service_name, instance);
        self.ctx
            .events
            .record(EventKind::UndeployRequest, task_id.as_str(), "");

        let Some(stop) = self.ctx.registry.stop_handle(&task_id) else {
            tracing::warn!(task_id = %task_id, "undeploy of unknown service, sweeping engine");
            let _ = recovery::force_cleanup(self.ctx.engine.as_ref(), Some(&task_id)).await;
            return Err(StevedoreError::NotFound {
                kind: "service",
                id: task_id.to_string(),
            });
        };

        let _ = stop.request_stop();
        match stop
            .await_stop_result(self.ctx.config.undeploy_timeout())
            .await
        {
            StopOutcome::Stopped => {
                tracing::info!(task_id = %task_id, "service undeployed");
                Ok(())
            }
            StopOutcome::Failed => Err(StevedoreError::StopFailure {
                task_id: task_id.to_string(),
            }),
            StopOutcome::TimedOut => Err(StevedoreError::StopTimeout {
                task_id: task_id.to_string(),
            }),
        }
    }

    /// Starts the periodic resource monitor.
    ///
    /// Only the first call starts a loop; later calls return `None`.
    pub fn resource_monitoring(
        &self,
        interval: Duration,
        on_sample: SampleCallback,
    ) -> Option<JoinHandle<()>> {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            tracing::warn!("resource monitoring already running");
            return None;
        }
        let interval = if interval.is_zero() {
            self.ctx.config.monitoring_interval()
        } else {
            interval
        };
        let ctx = Arc::clone(&self.ctx);
        tracing::info!(?interval, "resource monitoring started");
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let _ = ticker.tick().await;
                let batch =
                    metrics::collect_samples(ctx.engine.as_ref(), &ctx.registry, &ctx.events).await;
                on_sample(batch);
            }
        }))
    }

    /// Runs one monitoring pass.
    pub async fn collect_samples(&self) -> Vec<ResourceSample> {
        metrics::collect_samples(self.ctx.engine.as_ref(), &self.ctx.registry, &self.ctx.events)
            .await
    }

    /// Undeploys every registered instance. Individual failures are logged.
    pub async fn shutdown(&self) {
        let task_ids = self.ctx.registry.task_ids();
        tracing::info!(count = task_ids.len(), "shutting down services");
        for task_id in task_ids {
            if let Err(e) = self.undeploy(task_id.service_name(), task_id.instance()).await {
                tracing::warn!(task_id = %task_id, error = %e, "undeploy during shutdown failed");
            }
        }
    }

    /// Returns a snapshot of one instance, if deployed.
    #[must_use]
    pub fn get(&self, service_name: &str, instance: u32) -> Option<ServiceSnapshot> {
        self.ctx
            .registry
            .get(&TaskId::encode(service_name, instance))
    }

    /// Reads the captured output of one instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file exists but cannot be read.
    pub fn logs(&self, service_name: &str, instance: u32) -> Result<String> {
        logs::read_logs(
            &self.ctx.config.log_dir,
            &TaskId::encode(service_name, instance),
        )
    }

    /// The service registry.
    #[must_use]
    pub fn registry(&self) -> &ServiceRegistry {
        &self.ctx.registry
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.ctx.config
    }

    /// Number of leftover containers removed during initialization.
    #[must_use]
    pub const fn recovered(&self) -> usize {
        self.recovered
    }
}
