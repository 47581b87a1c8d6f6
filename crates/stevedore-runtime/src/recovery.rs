//! Forced cleanup of containers left behind in the node namespace.

use stevedore_common::types::TaskId;

use crate::backend::ContainerEngine;

/// Kills the task (if any) and deletes the container.
///
/// Returns `true` when the container is gone afterwards. A missing task is
/// not an error.
pub async fn remove_container(engine: &dyn ContainerEngine, task_id: &TaskId) -> bool {
    match engine.kill_task(task_id).await {
        Ok(()) => tracing::debug!(task_id = %task_id, "task killed"),
        Err(e) if e.is_not_found() => {}
        Err(e) => tracing::warn!(task_id = %task_id, error = %e, "unable to kill task"),
    }
    match engine.delete_container(task_id).await {
        Ok(()) => true,
        Err(e) if e.is_not_found() => true,
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "unable to delete container");
            false
        }
    }
}

/// Removes every container in the namespace, or only `only` when given.
///
/// Never touches the registry. Returns the number of containers removed.
pub async fn force_cleanup(engine: &dyn ContainerEngine, only: Option<&TaskId>) -> usize {
    let containers = match engine.list_containers().await {
        Ok(containers) => containers,
        Err(e) => {
            tracing::warn!(error = %e, "recovery sweep cannot list containers");
            return 0;
        }
    };
    let mut removed = 0;
    for info in containers
        .iter()
        .filter(|info| only.is_none_or(|id| *id == info.task_id))
    {
        tracing::info!(task_id = %info.task_id, "removing leftover container");
        if remove_container(engine, &info.task_id).await {
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::info!(removed, "recovery sweep finished");
    }
    removed
}
