//! `stevedored cleanup` — Remove leftover containers.

use stevedore_common::config::NodeConfig;
use stevedore_runtime::Engine;

/// Executes the `cleanup` command.
///
/// Connecting the engine already sweeps the node namespace, so this only
/// reports how many containers were removed.
///
/// # Errors
///
/// Returns an error if the engine cannot be reached.
pub async fn execute(config: NodeConfig) -> anyhow::Result<()> {
    let namespace = config.namespace.clone();
    let engine = Engine::connect(config).await?;
    println!(
        "Removed {} container(s) from namespace {namespace}.",
        engine.recovered()
    );
    Ok(())
}
