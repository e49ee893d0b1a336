// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Tenantry CLI
//!
//! - `tenantry serve` - run the HTTP API
//! - `tenantry config show|validate` - configuration management
//! - `tenantry bootstrap` - create the restricted role and row-level security
//!   policies, exit non-zero on failure

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use tenantry::commands::{self, ConfigCommand};
use tenantry::server;

/// Tenantry - multi-tenant isolation service
#[derive(Parser)]
#[command(name = "tenantry")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "TENANTRY_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API port (overrides network.port)
    #[arg(long, global = true, env = "TENANTRY_PORT")]
    port: Option<u16>,

    /// HTTP API host (overrides network.bind_address)
    #[arg(long, global = true, env = "TENANTRY_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TENANTRY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Create the restricted role and row-level security policies
    #[command(name = "bootstrap")]
    Bootstrap,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let mut config = commands::config::load(cli.config)?;
            if let Some(host) = cli.host {
                config.network.bind_address = host;
            }
            if let Some(port) = cli.port {
                config.network.port = port;
            }
            let level = cli.log_level.unwrap_or_else(|| config.observability.logging.level.clone());
            init_logging(&level, &config.observability.logging.format)?;

            info!("Starting Tenantry {}", env!("CARGO_PKG_VERSION"));
            server::serve(config).await
        }
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
        Commands::Bootstrap => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"), "compact")?;
            commands::bootstrap::handle_command(cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over `level`.
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).compact().init();
    }

    Ok(())
}
