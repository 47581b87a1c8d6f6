//! `stevedored logs` — View service logs.

use clap::Args;
use stevedore_common::config::NodeConfig;
use stevedore_common::types::TaskId;
use stevedore_runtime::logs;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Service name.
    pub service: String,

    /// Instance number.
    pub instance: u32,
}

/// Executes the `logs` command.
///
/// Reads the log file directly, so it works whether or not the agent runs.
///
/// # Errors
///
/// Returns an error if the log file exists but cannot be read.
pub fn execute(args: &LogsArgs, config: &NodeConfig) -> anyhow::Result<()> {
    let task_id = TaskId::encode(&args.service, args.instance);
    let content = logs::read_logs(&config.log_dir, &task_id)?;

    if content.is_empty() {
        println!("No logs available for service: {task_id}");
    } else {
        print!("{content}");
    }

    Ok(())
}
