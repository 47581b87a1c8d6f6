//! CLI command definitions and dispatch.

pub mod cleanup;
pub mod config;
pub mod logs;
pub mod run;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use stevedore_common::config::NodeConfig;

/// Stevedore — node-local container lifecycle engine.
#[derive(Parser, Debug)]
#[command(name = "stevedored", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "STEVEDORE_LOG_JSON")]
    pub log_json: bool,

    /// Node configuration overrides.
    #[command(flatten)]
    pub node: NodeArgs,
}

/// Flags overriding values of the node configuration file.
#[derive(Args, Debug, Default)]
pub struct NodeArgs {
    /// Path to the node configuration file (JSON).
    #[arg(long, global = true, env = "STEVEDORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Container engine socket.
    #[arg(long, global = true, env = "STEVEDORE_ENGINE_SOCKET")]
    pub engine_socket: Option<PathBuf>,

    /// Label namespace owned by this node.
    #[arg(long, global = true, env = "STEVEDORE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Enable overlay networking.
    #[arg(long, global = true, env = "STEVEDORE_OVERLAY")]
    pub overlay: bool,

    /// Base URL of the network manager.
    #[arg(long, global = true, env = "STEVEDORE_NET_MANAGER_URL")]
    pub net_manager_url: Option<String>,

    /// Event log file.
    #[arg(long, global = true, env = "STEVEDORE_EVENT_LOG")]
    pub event_log: Option<PathBuf>,

    /// Directory for per-service logs.
    #[arg(long, global = true, env = "STEVEDORE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl NodeArgs {
    /// Loads the configuration file (or defaults) and applies the flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub fn resolve(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(socket) = &self.engine_socket {
            config.engine_socket = Some(socket.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.namespace.clone_from(namespace);
        }
        if self.overlay {
            config.overlay = true;
        }
        if let Some(url) = &self.net_manager_url {
            config.net_manager_url.clone_from(url);
        }
        if let Some(path) = &self.event_log {
            config.event_log.clone_from(path);
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir.clone_from(dir);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the services of a manifest and supervise them until Ctrl+C.
    Run(run::RunArgs),
    /// Remove every container left in the node namespace.
    Cleanup,
    /// Print the captured output of a service instance.
    Logs(logs::LogsArgs),
    /// Print the effective node configuration.
    Config,
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.node.resolve()?;
    match cli.command {
        Command::Run(args) => run::execute(args, config).await,
        Command::Cleanup => cleanup::execute(config).await,
        Command::Logs(args) => logs::execute(&args, &config),
        Command::Config => config::execute(&config),
    }
}
