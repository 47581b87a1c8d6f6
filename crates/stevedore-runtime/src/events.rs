//! Append-only event log.
//!
//! One record per line: `<unix millis>;<task id>;<EVENT>;{log:"<payload>"};`.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use stevedore_common::error::{Result, StevedoreError};

/// Kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A deploy request was received.
    DeployRequest,
    /// An undeploy request was received.
    UndeployRequest,
    /// A task started.
    Deployed,
    /// A task ended.
    Dead,
    /// A resource sample batch was taken.
    ServiceResources,
}

impl EventKind {
    /// Name written to the log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeployRequest => "DEPLOY_REQUEST",
            Self::UndeployRequest => "UNDEPLOY_REQUEST",
            Self::Deployed => "DEPLOYED",
            Self::Dead => "DEAD",
            Self::ServiceResources => "SERVICE_RESOURCES",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "DEPLOY_REQUEST" => Some(Self::DeployRequest),
            "UNDEPLOY_REQUEST" => Some(Self::UndeployRequest),
            "DEPLOYED" => Some(Self::Deployed),
            "DEAD" => Some(Self::Dead),
            "SERVICE_RESOURCES" => Some(Self::ServiceResources),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed event log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Task the event refers to; empty for node-wide events.
    pub task_id: String,
    /// Event kind.
    pub kind: EventKind,
    /// Free-form payload.
    pub payload: String,
}

/// File-backed event sink shared by every component of the engine.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl EventLog {
    /// Opens (or creates) the log for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the file cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StevedoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StevedoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one event. Write failures are logged and swallowed.
    pub fn record(&self, kind: EventKind, task_id: &str, payload: &str) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        tracing::info!(target: "stevedore::events", event = kind.as_str(), task_id, payload);
        let line = format!("{timestamp};{task_id};{kind};{{log:\"{payload}\"}};");
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.path.display(), error = %e, "event log write failed");
        }
    }

    /// Parses every well-formed record of the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_records(path: &Path) -> Result<Vec<EventRecord>> {
        let content = std::fs::read_to_string(path).map_err(|e| StevedoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(content.lines().filter_map(parse_line).collect())
    }
}

fn parse_line(line: &str) -> Option<EventRecord> {
    let mut fields = line.splitn(4, ';');
    let timestamp_ms = fields.next()?.parse().ok()?;
    let task_id = fields.next()?.to_string();
    let kind = EventKind::parse(fields.next()?)?;
    let payload = fields
        .next()?
        .strip_suffix(';')?
        .strip_prefix("{log:\"")?
        .strip_suffix("\"}")?
        .to_string();
    Some(EventRecord {
        timestamp_ms,
        task_id,
        kind,
        payload,
    })
}
