//! Export the database to CSV

use colored::*;
use eyre::Result;

use crate::config::Config;
use crate::export::{self, ExportError};

pub fn run(config: &Config, quiet: bool) -> Result<()> {
    let db_path = config.database_path();
    let csv_path = config.export_path();

    if !quiet {
        println!("{} Reading database: {}", "→".blue(), db_path.display());
    }

    match export::export(&db_path, &csv_path) {
        Ok(rows) => {
            if !quiet {
                println!(
                    "{} Success! Exported {} rows to -> {}",
                    "✓".green(),
                    rows.to_string().bold(),
                    csv_path.display()
                );
            }
            Ok(())
        }
        Err(e) if e.is_warning() => {
            log::warn!("Export skipped: {}", e);
            println!("{} Warning: {}", "⚠".yellow(), e);
            Ok(())
        }
        Err(e) => {
            log::error!("Export failed: {:?}", e);
            report(&e);
            std::process::exit(1);
        }
    }
}

fn report(err: &ExportError) {
    let label = match err {
        ExportError::NotFound(_) => "Error",
        ExportError::SchemaMismatch(_) | ExportError::Database(_) => "Database error",
        ExportError::OutputLocked { .. } => "Cannot write file",
        _ => "Unknown error occurred",
    };

    eprintln!("{} {}: {}", "✗".red(), label, err);
    if let Some(hint) = err.hint() {
        eprintln!("  {}", hint);
    }
}
