//! depgated - dependency approval watcher
//!
//! Watches a workspace's manifests, submits newly declared dependencies to
//! the approval service and reports verdicts as structured log events.

use anyhow::Context;
use clap::{Parser, Subcommand};
use depgate_core::BootstrapOutcome;
use depgate_daemon::{Daemon, DaemonConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// depgate daemon CLI
#[derive(Parser)]
#[command(name = "depgated")]
#[command(about = "depgate - dependency approval watcher", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DEPGATE_CONFIG")]
    config: Option<String>,

    /// Workspace root
    #[arg(short, long, env = "DEPGATE_ROOT")]
    root: Option<PathBuf>,

    /// Approval service base URL
    #[arg(long, env = "DEPGATE_API_URL")]
    api_url: Option<String>,

    /// Bearer token for the approval service
    #[arg(long, env = "DEPGATE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Project name reported to the approval service
    #[arg(short, long, env = "DEPGATE_PROJECT")]
    project: Option<String>,

    /// Log level
    #[arg(long, env = "DEPGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DEPGATE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap if needed, then watch manifests (default)
    Watch,
    /// Submit the whole workspace inventory again
    Scan,
    /// Forget the bootstrap record so the next start bootstraps again
    Reset,
    /// Print the workspace and bootstrap state
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(root) = cli.root {
        config.workspace.root = root;
    }
    if let Some(url) = cli.api_url {
        config.api.base_url = url;
    }
    if cli.token.is_some() {
        config.api.token = cli.token;
    }
    if cli.project.is_some() {
        config.workspace.project_name = cli.project;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let daemon = Daemon::new(config).context("Failed to start depgated")?;

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => daemon.watch().await?,
        Command::Scan => {
            let outcome = daemon.scan().await?;
            daemon.shutdown();
            if let BootstrapOutcome::Completed {
                manifests,
                packages,
            } = outcome
            {
                println!("Submitted {packages} packages from {manifests} manifests");
            }
        }
        Command::Reset => {
            if daemon.reset().await? {
                println!("Bootstrap record removed; the next start scans the workspace");
            } else {
                println!("No bootstrap record found");
            }
        }
        Command::Status => {
            let report = daemon.status().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
