//! `stevedored config` — Print the effective configuration.

use stevedore_common::config::NodeConfig;

/// Executes the `config` command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn execute(config: &NodeConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
