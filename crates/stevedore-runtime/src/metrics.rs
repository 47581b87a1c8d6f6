//! Periodic resource usage sampling.
//!
//! Each pass asks the engine for every container in the node namespace and
//! reports CPU, memory and disk usage for the running ones. Containers whose
//! registry record is not yet `Active` are left out; containers unknown to the
//! registry are still reported.

use stevedore_common::constants::CONTAINER_RUNTIME;
use stevedore_common::types::{ResourceSample, ServiceStatus};

use crate::backend::{ContainerEngine, ContainerInfo};
use crate::events::{EventKind, EventLog};
use crate::state::ServiceRegistry;

/// Collects one batch of samples and records it in the event log.
pub async fn collect_samples(
    engine: &dyn ContainerEngine,
    registry: &ServiceRegistry,
    events: &EventLog,
) -> Vec<ResourceSample> {
    let containers = match engine.list_containers().await {
        Ok(containers) => containers,
        Err(e) => {
            tracing::warn!(error = %e, "resource monitor cannot list containers");
            Vec::new()
        }
    };

    let mut batch = Vec::with_capacity(containers.len());
    for info in containers.iter().filter(|info| info.running) {
        let status = registry.status(&info.task_id);
        if status.is_some_and(|s| s != ServiceStatus::Active) {
            tracing::trace!(task_id = %info.task_id, ?status, "skipping sample, service not active");
            continue;
        }
        if let Some(sample) = sample(engine, info).await {
            batch.push(sample);
        }
    }

    let payload = serde_json::to_string(&batch).unwrap_or_default();
    events.record(EventKind::ServiceResources, "", &payload);
    batch
}

async fn sample(engine: &dyn ContainerEngine, info: &ContainerInfo) -> Option<ResourceSample> {
    let stats = match engine.task_stats(&info.task_id).await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::debug!(task_id = %info.task_id, error = %e, "no task stats");
            return None;
        }
    };
    let disk = match engine.snapshot_usage(&info.task_id).await {
        Ok(disk) => disk,
        Err(e) => {
            tracing::debug!(task_id = %info.task_id, error = %e, "no snapshot usage");
            return None;
        }
    };
    Some(ResourceSample {
        cpu: stats.cpu_percent,
        memory: stats.memory_bytes,
        disk,
        service_name: info.task_id.service_name().to_string(),
        instance: info.task_id.instance(),
        runtime: CONTAINER_RUNTIME.to_string(),
        pid: stats.pid,
    })
}
