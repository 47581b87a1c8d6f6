//! Per-service stdout/stderr log files.

use std::path::{Path, PathBuf};

use stevedore_common::error::{Result, StevedoreError};
use stevedore_common::types::TaskId;

/// Returns the log file path for a task.
#[must_use]
pub fn service_log_path(log_dir: &Path, task_id: &TaskId) -> PathBuf {
    log_dir.join(format!("logfile-{task_id}.log"))
}

/// Creates the log directory and an empty log file if missing, returning its path.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn prepare_service_log(log_dir: &Path, task_id: &TaskId) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir).map_err(|e| StevedoreError::Io {
        path: log_dir.to_path_buf(),
        source: e,
    })?;
    let path = service_log_path(log_dir, task_id);
    let _ = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StevedoreError::Io {
            path: path.clone(),
            source: e,
        })?;
    Ok(path)
}

/// Reads a task's logs.
///
/// Returns an empty string if the log file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(log_dir: &Path, task_id: &TaskId) -> Result<String> {
    let path = service_log_path(log_dir, task_id);
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(&path).map_err(|e| StevedoreError::Io { path, source: e })
}
