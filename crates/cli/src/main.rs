//! MiniLuma CLI, the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP API and chat UI
//! - `chat`: Interactive chat or single-message mode
//! - `config`: Write or show the configuration
//! - `tools`: List the built-in tools

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use miniluma_config::{AppConfig, LoggingConfig};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "miniluma",
    about = "MiniLuma: a tool-using AI assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.miniluma/config.toml)
    #[arg(long, global = true, env = "MINILUMA_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server and the web chat UI
    Serve {
        /// Override the bind address
        #[arg(long)]
        host: Option<String>,

        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Provider to use instead of the configured default
        #[arg(long)]
        provider: Option<String>,

        /// Model to use instead of the provider's configured model
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage the configuration file
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,

        /// Print the effective configuration with secrets redacted
        #[arg(long)]
        show: bool,
    },

    /// List the available tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    if let Commands::Config { init, show } = cli.command {
        init_tracing(cli.verbose, &LoggingConfig::default());
        return commands::config_cmd::run(&config_path, init, show);
    }

    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    init_tracing(cli.verbose, &config.logging);
    tracing::debug!(path = %config_path.display(), provider = %config.default_provider, "Config loaded");

    match cli.command {
        Commands::Serve { host, port } => commands::serve::run(config, host, port).await?,
        Commands::Chat {
            message,
            provider,
            model,
        } => {
            let options = commands::chat::ChatOptions {
                message,
                provider,
                model,
            };
            commands::chat::run(config, options).await?
        }
        Commands::Tools => commands::tools::run(&config),
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `debug` with `-v`, else the configured level.
fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
