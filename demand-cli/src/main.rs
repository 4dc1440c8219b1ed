mod assistant;
mod cli;
mod commands;
mod render;
mod session_store;

use anyhow::{Context, Result};
use clap::Parser;
use demand_core::Settings;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let config_file = cli.config.clone().or_else(Settings::config_path);
    let settings = demand_core::read_config(config_file.as_deref())
        .context("Failed to load configuration")?;

    commands::run(cli, settings)
}
