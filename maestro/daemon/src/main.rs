//! Maestro Daemon
//!
//! Standalone server process for streaming composition sessions. Browsers
//! connect over WebSocket at `ws://<bind>/ws/compose`.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:8000, config from ~/.config/maestro/maestro.toml)
//! maestro-daemon
//!
//! # Listen elsewhere with local models
//! maestro-daemon serve --bind 0.0.0.0:9000 --provider ollama --model llama3.2
//!
//! # Print the instrument banks or the available models as JSON
//! maestro-daemon catalogs
//! maestro-daemon models
//!
//! # With verbose logging
//! RUST_LOG=debug maestro-daemon
//! ```
//!
//! # Environment Variables
//!
//! - `MAESTRO_CONFIG`: Path to the TOML configuration file
//! - `MAESTRO_BIND`, `MAESTRO_DEFAULT_MODEL`, `MAESTRO_DEFAULT_PROVIDER`, ...:
//!   see `maestro_core::config`
//! - `OPENROUTER_API_KEY`: OpenRouter credentials
//! - `OLLAMA_URL`: Ollama server URL (default: `http://localhost:11434`)
//! - `RUST_LOG`: Log filter (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (open sessions are cancelled)

mod server;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use maestro_core::config::{self, ConfigOverrides};
use maestro_core::{catalog, BackendRegistry};

use server::DaemonServer;

/// Streaming composition daemon
#[derive(Debug, Parser)]
#[command(name = "maestro-daemon", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "MAESTRO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level for maestro crates (overridden per target by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the WebSocket server (default)
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Maximum simultaneous connections
        #[arg(long)]
        max_connections: Option<usize>,

        /// Default model for requests that do not name one
        #[arg(long)]
        model: Option<String>,

        /// Default provider for requests that do not name one
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print the instrument banks as JSON
    Catalogs,
    /// Print the models every configured provider offers as JSON
    Models,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("maestro_daemon={level}").parse()?)
                .add_directive(format!("maestro_core={level}").parse()?),
        )
        .with_target(true)
        .init();
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config_path = cli.config.or_else(config::default_config_path);
    let mut config = config::load_config_from_path(config_path).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve {
        bind: None,
        max_connections: None,
        model: None,
        provider: None,
    }) {
        Command::Serve {
            bind,
            max_connections,
            model,
            provider,
        } => {
            let mut overrides = ConfigOverrides::new();
            overrides.bind_address = bind;
            overrides.max_connections = max_connections;
            overrides.default_model = model;
            overrides.default_provider = provider;
            overrides.apply(&mut config);
            config.validate().context("Invalid configuration")?;

            info!(
                source = %config.source(),
                bind = %config.server.bind_address,
                provider = %config.conductor.default_provider,
                model = %config.conductor.default_model,
                "Starting maestro daemon"
            );

            let server = DaemonServer::new(config);
            let listener = server.bind().await?;

            let shutdown = CancellationToken::new();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    shutdown_signal().await;
                    shutdown.cancel();
                }
            });

            server.serve(listener, shutdown).await
        }
        Command::Catalogs => {
            println!("{}", serde_json::to_string_pretty(&catalog::listing())?);
            Ok(())
        }
        Command::Models => {
            let registry = BackendRegistry::from_config(&config.backends);
            let models = registry.list_models().await;
            println!("{}", serde_json::to_string_pretty(&models)?);
            Ok(())
        }
    }
}
