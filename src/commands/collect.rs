//! Collect readings from the board until interrupted

use colored::*;
use eyre::{Context, Result};

use crate::collector::Collector;
use crate::config::Config;
use crate::shutdown::Shutdown;
use crate::sse::HttpEventSource;
use crate::store::Store;

pub fn run(config: &Config, quiet: bool) -> Result<()> {
    let db_path = config.database_path();
    let existed = db_path.exists();

    let store = Store::open(&db_path).context("Database initialization failed")?;
    if !quiet {
        println!("{} Database ready: {}", "✓".green(), db_path.display());
    }

    if existed && !store.schema_matches().unwrap_or(false) {
        log::warn!("Existing database {} has an outdated schema", db_path.display());
        eprintln!(
            "{} {} was created by an older version and is missing columns.",
            "⚠".yellow(),
            db_path.display()
        );
        eprintln!("  Inserts will fail with 'no such column'; delete the old file and restart.");
    }

    let shutdown = Shutdown::new();
    shutdown.install_ctrl_c(quiet).context("Failed to install Ctrl+C handler")?;

    let url = config.device.events_url();
    let source = HttpEventSource::new(&url, config.device.connect_timeout());

    if !quiet {
        println!("{} Connecting to {} ...", "→".blue(), url.cyan());
    }

    let stats = Collector::new(&store, config.device.retry_delay())
        .quiet(quiet)
        .run(&source, &shutdown);

    shutdown.announce_stopped(quiet);
    if !quiet {
        println!(
            "  {} stored, {} skipped, {} failed over {} connection(s)",
            stats.stored.to_string().green(),
            stats.skipped,
            stats.failed,
            stats.connections
        );
    }

    Ok(())
}
