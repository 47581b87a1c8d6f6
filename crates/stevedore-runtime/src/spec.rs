//! Execution spec assembly for a service instance.

use std::collections::BTreeMap;
use std::io::Write;

use stevedore_common::constants::{
    INSTANCE_LABEL, NAMESPACE_LABEL, RESOLV_CONF_PATH, SERVICE_LABEL,
};
use stevedore_common::error::{Result, StevedoreError};
use stevedore_common::types::ServiceSpec;
use tempfile::NamedTempFile;

use crate::backend::{BindMount, ExecutionSpec, ImageRef};

/// Writes a resolver file pointing at `nameserver`.
///
/// The file is deleted when the returned handle is dropped, so the caller
/// keeps it for as long as the container may read it.
///
/// # Errors
///
/// Returns `SpecBuild` if the file cannot be created or written.
pub fn write_resolv_conf(task_id: &str, nameserver: &str) -> Result<NamedTempFile> {
    let spec_err = |message: String| StevedoreError::SpecBuild {
        task_id: task_id.to_string(),
        message,
    };
    let mut file = tempfile::Builder::new()
        .prefix("stevedore-resolv-conf")
        .tempfile()
        .map_err(|e| spec_err(format!("cannot create resolver file: {e}")))?;
    writeln!(file, "nameserver {nameserver}")
        .and_then(|()| file.flush())
        .map_err(|e| spec_err(format!("cannot write resolver file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o444))
            .map_err(|e| spec_err(format!("cannot set resolver file mode: {e}")))?;
    }

    Ok(file)
}

/// Builds the engine-facing spec for one instance.
#[must_use]
pub fn build_execution_spec(
    spec: &ServiceSpec,
    image: ImageRef,
    namespace: &str,
    resolv_conf: &NamedTempFile,
) -> ExecutionSpec {
    let task_id = spec.task_id();

    let mut env = Vec::with_capacity(spec.env.len() + 1);
    env.push(format!("HOSTNAME={task_id}"));
    env.extend(spec.env.iter().cloned());

    let labels = BTreeMap::from([
        (NAMESPACE_LABEL.to_string(), namespace.to_string()),
        (SERVICE_LABEL.to_string(), spec.service_name.clone()),
        (INSTANCE_LABEL.to_string(), spec.instance.to_string()),
    ]);

    ExecutionSpec {
        hostname: task_id.to_string(),
        task_id,
        image,
        env,
        command: (!spec.command.is_empty()).then(|| spec.command.clone()),
        mounts: vec![BindMount {
            source: resolv_conf.path().to_path_buf(),
            destination: RESOLV_CONF_PATH.to_string(),
            read_only: true,
        }],
        gpus: spec.resources.vgpus > 0,
        cpus: spec.resources.vcpus,
        memory_mb: spec.resources.memory,
        labels,
    }
}
