use colored::*;
use eyre::Result;

use crate::cli::{ConfigAction, OutputFormat};
use crate::config::Config;

pub fn run(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show { format } => show(OutputFormat::resolve(format), config),
    }
}

fn show(format: OutputFormat, config: &Config) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Yaml => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        OutputFormat::Text => {
            println!("{}", "sensorlog configuration".bold());
            println!();

            println!("{}:", "device".cyan());
            println!("  base_url: {}", config.device.base_url);
            println!("  events_path: {}", config.device.events_path);
            println!("  retry_delay_secs: {}", config.device.retry_delay_secs);
            println!("  connect_timeout_secs: {}", config.device.connect_timeout_secs);
            println!();

            println!("{}:", "paths".cyan());
            println!("  database: {}", config.database_path().display());
            println!("  export: {}", config.export_path().display());
            println!();

            println!("log_level: {}", config.log_level.as_filter());
        }
    }

    Ok(())
}
