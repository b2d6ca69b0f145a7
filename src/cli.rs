use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

impl OutputFormat {
    /// Resolve the effective output format.
    /// If user specified a format, use it.
    /// Otherwise: TTY → Text, non-TTY (pipe) → Json
    pub fn resolve(user_choice: Option<OutputFormat>) -> OutputFormat {
        match user_choice {
            Some(fmt) => fmt,
            None => {
                if std::io::stdout().is_terminal() {
                    OutputFormat::Text
                } else {
                    OutputFormat::Json
                }
            }
        }
    }
}

#[derive(Parser)]
#[command(
    name = "sensorlog",
    about = "Collect ESP32 sensor events into SQLite and export them to CSV",
    version,
    after_help = "Logs are written to: ~/.local/share/sensorlog/logs/sensorlog.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to sensorlog.yaml config file")]
    pub config: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream readings from the sensor board into the database
    Collect {
        /// Base URL of the board (overrides device.base_url)
        #[arg(long)]
        url: Option<String>,

        /// Database file (overrides paths.database)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Export all stored readings to CSV
    Export {
        /// Destination CSV file (overrides paths.export)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Database file (overrides paths.database)
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Show database status
    Status {
        /// Database file (overrides paths.database)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'f', value_enum)]
        format: Option<OutputFormat>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format (default: text for TTY, json for pipes)
        #[arg(long, short = 'f', value_enum)]
        format: Option<OutputFormat>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_collect_overrides() {
        let cli = Cli::try_parse_from([
            "sensorlog",
            "collect",
            "--url",
            "http://192.168.4.1",
            "--database",
            "/tmp/x.sqlite3",
        ])
        .unwrap();
        match cli.command {
            Commands::Collect { url, database } => {
                assert_eq!(url.as_deref(), Some("http://192.168.4.1"));
                assert_eq!(database, Some(PathBuf::from("/tmp/x.sqlite3")));
            }
            _ => panic!("expected collect"),
        }
    }

    #[test]
    fn test_parse_export_defaults() {
        let cli = Cli::try_parse_from(["sensorlog", "export"]).unwrap();
        match cli.command {
            Commands::Export { output, database } => {
                assert!(output.is_none());
                assert!(database.is_none());
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_global_quiet_after_subcommand() {
        let cli = Cli::try_parse_from(["sensorlog", "export", "-q"]).unwrap();
        assert!(cli.quiet);
    }
}
