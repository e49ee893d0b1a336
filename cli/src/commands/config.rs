// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use tenantry_core::domain::config::IsolationConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets redacted)
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
    }
}

/// Load from discovery; environment overrides are applied on top.
pub fn load(config_path: Option<PathBuf>) -> Result<IsolationConfig> {
    IsolationConfig::load_or_default(config_path).context("Failed to load configuration")
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. TENANTRY_CONFIG_PATH: {}",
            std::env::var("TENANTRY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./tenantry.yaml");
        println!("  4. ~/.tenantry/config.yaml");
        println!("  5. /etc/tenantry/config.yaml");
        println!();
    }

    let mut config = load(config_override)?;
    config.database.url = redact_url(&config.database.url);
    config.rate_limit.redis_url = config.rate_limit.redis_url.as_deref().map(redact_url);
    if !config.auth.jwt_secret.is_empty() {
        config.auth.jwt_secret = "***".to_string();
    }

    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", config.to_yaml_string()?);
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = load(config_path)?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}
