use clap::Parser;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;
mod collector;
mod commands;
mod config;
mod export;
mod reading;
mod shutdown;
mod sse;
mod store;

use cli::{Cli, Commands};
use config::{Config, LogLevel};

fn setup_logging(log_level: LogLevel) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sensorlog")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("sensorlog.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG env var takes precedence, otherwise use config log_level
    let mut builder = env_logger::Builder::new();

    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(log_level.to_level_filter());
    }

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    info!(
        "Log level: {} (from {})",
        log_level.as_filter(),
        if std::env::var("RUST_LOG").is_ok() { "RUST_LOG env" } else { "config" }
    );
    Ok(())
}

fn run(cli: Cli, mut config: Config) -> Result<()> {
    match cli.command {
        Commands::Collect { url, database } => {
            if let Some(url) = url {
                config.device.base_url = url;
            }
            if let Some(database) = database {
                config.paths.database = database;
            }
            commands::collect::run(&config, cli.quiet)
        }
        Commands::Export { output, database } => {
            if let Some(output) = output {
                config.paths.export = output;
            }
            if let Some(database) = database {
                config.paths.database = database;
            }
            commands::export::run(&config, cli.quiet)
        }
        Commands::Status { database, format } => {
            if let Some(database) = database {
                config.paths.database = database;
            }
            commands::status::run(cli::OutputFormat::resolve(format), &config)
        }
        Commands::Config { action } => commands::config::run(action, &config),
        Commands::Completions { shell } => commands::completions::run(shell),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration (before logging, so log messages in Config::load are silent)
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_level).context("Failed to setup logging")?;

    info!("Starting sensorlog with config from: {:?}", cli.config);

    run(cli, config).context("Command failed")?;

    Ok(())
}
