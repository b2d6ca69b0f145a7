//! Database status command
//!
//! Shows where the readings live and what is in there.

use colored::*;
use eyre::Result;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::reading::SensorReading;
use crate::store::Store;

#[derive(Serialize)]
struct Status {
    version: String,
    database: String,
    exists: bool,
    schema_ok: Option<bool>,
    readings: Option<u64>,
    latest: Option<SensorReading>,
    export: String,
    events_url: String,
}

pub fn run(format: OutputFormat, config: &Config) -> Result<()> {
    let status = gather(config);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&status)?),
        OutputFormat::Text => print_text_status(&status),
    }

    Ok(())
}

fn gather(config: &Config) -> Status {
    let db_path = config.database_path();
    let exists = db_path.exists();

    let mut status = Status {
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_path.display().to_string(),
        exists,
        schema_ok: None,
        readings: None,
        latest: None,
        export: config.export_path().display().to_string(),
        events_url: config.device.events_url(),
    };

    if !exists {
        return status;
    }

    match Store::open_read_only(&db_path) {
        Ok(store) => {
            let schema_ok = store.schema_matches().unwrap_or(false);
            status.schema_ok = Some(schema_ok);
            if schema_ok {
                status.readings = store.count().ok();
                status.latest = store.latest().ok().flatten();
            }
        }
        Err(e) => log::warn!("Failed to open {}: {}", db_path.display(), e),
    }

    status
}

fn print_text_status(status: &Status) {
    println!("{} {}", "sensorlog".bold(), status.version.dimmed());
    println!();

    println!("{}:", "device".cyan());
    println!("  events: {}", status.events_url);
    println!();

    println!("{}:", "database".cyan());
    println!("  path: {}", status.database);
    if !status.exists {
        println!("  {} not created yet (run {})", "⚠".yellow(), "sensorlog collect".cyan());
    } else {
        match status.schema_ok {
            Some(true) => println!("  {} schema matches", "✓".green()),
            Some(false) => println!("  {} schema mismatch, delete the file and collect again", "✗".red()),
            None => println!("  {} could not be opened", "✗".red()),
        }
        if let Some(count) = status.readings {
            println!("  readings: {}", count);
        }
        if let Some(latest) = &status.latest {
            println!("  latest: #{} at {}", latest.id, latest.receive_time);
            println!("    {}", latest.event.summary().dimmed());
        }
    }
    println!();

    println!("{}:", "export".cyan());
    println!("  path: {}", status.export);
}
