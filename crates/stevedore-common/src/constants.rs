//! System-wide constants and default paths.

use std::time::Duration;

/// Literal separator between the service name and the instance number in a task ID.
pub const INSTANCE_SEPARATOR: &str = ".instance";

/// Container label namespace used to tag every container this node creates.
pub const DEFAULT_NAMESPACE: &str = "stevedore";

/// Label key carrying the node namespace on engine containers.
pub const NAMESPACE_LABEL: &str = "io.stevedore.namespace";

/// Label key carrying the service name on engine containers.
pub const SERVICE_LABEL: &str = "io.stevedore.service";

/// Label key carrying the instance number on engine containers.
pub const INSTANCE_LABEL: &str = "io.stevedore.instance";

/// Nameserver written into the resolver file mounted into every container.
pub const DEFAULT_NAMESERVER: &str = "8.8.8.8";

/// Conventional resolver configuration path inside a container.
pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Default append-only event log location.
pub const DEFAULT_EVENT_LOG: &str = "eventLogger.csv";

/// Default directory holding per-service stdout/stderr logs.
pub const DEFAULT_LOG_DIR: &str = "/var/log/stevedore";

/// Default URL of the node-local network manager daemon.
pub const DEFAULT_NET_MANAGER_URL: &str = "http://localhost:6000";

/// Upper bound an undeploy waits for the supervisor's stop acknowledgement.
pub const UNDEPLOY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between two health-check attempts after an unhealthy result.
pub const HEALTH_CHECK_BACKOFF: Duration = Duration::from_millis(200);

/// Default resource monitoring interval in seconds.
pub const DEFAULT_MONITORING_INTERVAL_SECS: u64 = 5;

/// Runtime kind reported in resource samples for container workloads.
pub const CONTAINER_RUNTIME: &str = "docker";

/// Application name used in logs and labels.
pub const APP_NAME: &str = "stevedore";

/// Binary name for the node agent.
pub const BIN_NAME: &str = "stevedored";
