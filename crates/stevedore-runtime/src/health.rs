//! Health checking of running service instances.

use std::sync::Arc;
use std::time::Duration;

use stevedore_common::error::StevedoreError;
use stevedore_common::types::{ServiceSpec, ServiceStatus};

use crate::backend::ContainerEngine;
use crate::state::ServiceRegistry;

/// Result of one health check.
#[derive(Debug)]
pub enum HealthStatus {
    /// The check passed, or none is configured.
    Healthy,
    /// The check ran and failed.
    Unhealthy(String),
    /// The check could not be run.
    Fatal(StevedoreError),
}

/// Runs the instance's health-check command once.
pub async fn check_once(engine: &dyn ContainerEngine, spec: &ServiceSpec) -> HealthStatus {
    if spec.health_check.is_empty() {
        return HealthStatus::Healthy;
    }
    let task_id = spec.task_id();
    let exec_id = format!("{}.{}-health-check", spec.service_name, spec.instance);
    match engine.exec(&task_id, &exec_id, &spec.health_check).await {
        Ok(out) if out.exit_code == 0 => HealthStatus::Healthy,
        Ok(out) => HealthStatus::Unhealthy(format!(
            "health check exited with {}: {}",
            out.exit_code,
            out.output.trim()
        )),
        Err(e) => HealthStatus::Fatal(StevedoreError::HealthCheckFatal {
            task_id: task_id.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Checks until healthy, marking the record `Active`.
///
/// Returns `Some(error)` only for a fatal failure. Ends quietly with `None`
/// once healthy or when the record has left the registry.
pub async fn health_loop(
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<ServiceRegistry>,
    spec: ServiceSpec,
    backoff: Duration,
) -> Option<StevedoreError> {
    let task_id = spec.task_id();
    loop {
        match check_once(engine.as_ref(), &spec).await {
            HealthStatus::Healthy => {
                let updated = registry.update(&task_id, |record| {
                    record.status = ServiceStatus::Active;
                    record.status_detail.clear();
                });
                if updated {
                    tracing::info!(task_id = %task_id, "service healthy");
                }
                return None;
            }
            HealthStatus::Unhealthy(detail) => {
                tracing::debug!(task_id = %task_id, detail = %detail, "service not healthy yet");
                if !registry.update(&task_id, |record| record.status_detail = detail) {
                    return None;
                }
                tokio::time::sleep(backoff).await;
            }
            HealthStatus::Fatal(e) => {
                tracing::error!(task_id = %task_id, error = %e, "health check failed fatally");
                return Some(e);
            }
        }
    }
}
