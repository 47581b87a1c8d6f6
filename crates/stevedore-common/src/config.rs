//! Node configuration model for the Stevedore engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, StevedoreError};

/// Root configuration for one node engine.
///
/// Every field has a default, so a configuration file only needs to list
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Container engine socket; `None` uses the engine's local defaults.
    pub engine_socket: Option<PathBuf>,
    /// Label namespace owned by this node on the container engine.
    pub namespace: String,
    /// Whether overlay networking is enabled on this node.
    pub overlay: bool,
    /// Base URL of the node-local network manager.
    pub net_manager_url: String,
    /// Append-only event log path.
    pub event_log: PathBuf,
    /// Directory receiving per-service stdout/stderr logs.
    pub log_dir: PathBuf,
    /// Resource monitoring interval in seconds.
    pub monitoring_interval_secs: u64,
    /// Nameserver written into each container's resolver file.
    pub nameserver: String,
    /// Undeploy acknowledgement timeout in milliseconds.
    pub undeploy_timeout_ms: u64,
    /// Pause between failed health checks in milliseconds.
    pub health_check_backoff_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            engine_socket: None,
            namespace: constants::DEFAULT_NAMESPACE.to_string(),
            overlay: false,
            net_manager_url: constants::DEFAULT_NET_MANAGER_URL.to_string(),
            event_log: PathBuf::from(constants::DEFAULT_EVENT_LOG),
            log_dir: PathBuf::from(constants::DEFAULT_LOG_DIR),
            monitoring_interval_secs: constants::DEFAULT_MONITORING_INTERVAL_SECS,
            nameserver: constants::DEFAULT_NAMESERVER.to_string(),
            undeploy_timeout_ms: duration_millis(constants::UNDEPLOY_TIMEOUT),
            health_check_backoff_ms: duration_millis(constants::HEALTH_CHECK_BACKOFF),
        }
    }
}

impl NodeConfig {
    /// Loads a configuration file, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or holds invalid values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StevedoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks values that would make the engine misbehave.
    ///
    /// # Errors
    ///
    /// Returns `StevedoreError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(StevedoreError::Config {
                message: "namespace must not be empty".into(),
            });
        }
        if self.monitoring_interval_secs == 0 {
            return Err(StevedoreError::Config {
                message: "monitoring_interval_secs must be positive".into(),
            });
        }
        if self.nameserver.trim().is_empty() {
            return Err(StevedoreError::Config {
                message: "nameserver must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Resource monitoring interval.
    #[must_use]
    pub const fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }

    /// Undeploy acknowledgement timeout.
    #[must_use]
    pub const fn undeploy_timeout(&self) -> Duration {
        Duration::from_millis(self.undeploy_timeout_ms)
    }

    /// Pause between failed health checks.
    #[must_use]
    pub const fn health_check_backoff(&self) -> Duration {
        Duration::from_millis(self.health_check_backoff_ms)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
