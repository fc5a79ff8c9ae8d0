//! Terminal Exec MCP Server.
//!
//! Usage:
//!   terminal-exec                     Run MCP server (default)
//!   terminal-exec serve [OPTIONS]     Run MCP server (explicit)
//!   terminal-exec config              Print the effective configuration as JSON

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{self, EnvFilter};

use terminal_exec::{GlobalConfig, Server};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "terminal-exec")]
#[command(about = "MCP server that executes shell commands in interactive terminals")]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server (default if no command specified)
    Serve,

    /// Print the effective configuration
    Config,
}

#[derive(Args, Clone)]
struct Options {
    /// JSON configuration file
    #[arg(long, global = true, env = "TERMINAL_EXEC_CONFIG")]
    config: Option<PathBuf>,

    /// Shell for new terminals
    #[arg(long, global = true)]
    shell: Option<String>,

    /// Command timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Do not open a terminal at startup
    #[arg(long, global = true)]
    no_open: bool,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions: Main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.options)?;

    match cli.command {
        None | Some(Commands::Serve) => run_server(config, cli.options.debug).await,
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(options: &Options) -> Result<GlobalConfig> {
    let mut config = match &options.config {
        Some(path) => GlobalConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GlobalConfig::default(),
    };

    if let Some(shell) = &options.shell {
        config.local.default_shell = shell.clone();
    }
    if let Some(timeout_ms) = options.timeout_ms {
        config.exec.command_timeout_ms = timeout_ms;
    }
    if options.no_open {
        config.local.open_on_start = false;
    }

    config.validate()?;
    Ok(config)
}

//--------------------------------------------------------------------------------------------------
// Functions: MCP Server
//--------------------------------------------------------------------------------------------------

async fn run_server(config: GlobalConfig, debug: bool) -> Result<()> {
    // Logging to stderr only (stdout is reserved for MCP protocol)
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting Terminal Exec MCP Server");

    let server = Server::with_config(config)?;
    server.open_initial_terminal()?;
    let server_for_shutdown = server.clone();

    // Set up graceful shutdown
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown_clone.notify_one();
    });

    let service = server.serve(stdio()).await?;

    tokio::select! {
        result = service.waiting() => {
            result?;
        }
        _ = shutdown.notified() => {
            tracing::info!("Shutting down");
        }
    }

    server_for_shutdown.shutdown().await;
    tracing::info!("Terminal Exec MCP Server stopped");
    Ok(())
}
