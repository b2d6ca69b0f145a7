use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SQLite file written by the collector
pub const DATABASE_FILE: &str = "esp32_sse_data.sqlite3";

/// CSV file written by the exporter
pub const EXPORT_FILE: &str = "sensor_data_export.csv";

/// Main sensorlog configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub paths: PathsConfig,
    pub log_level: LogLevel,
}

/// Where the sensor board lives and how to talk to it
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Base URL of the board, e.g. the IP shown on its OLED screen
    pub base_url: String,
    /// Path of the SSE endpoint on the board
    pub events_path: String,
    /// Fixed delay between reconnection attempts
    pub retry_delay_secs: u64,
    /// Upper bound for establishing the TCP connection
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
    pub export: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://172.20.10.6".to_string(),
            events_path: "/events".to_string(),
            retry_delay_secs: 3,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base_dir = Config::base_dir();

        Self {
            database: base_dir.join(DATABASE_FILE),
            export: base_dir.join(EXPORT_FILE),
        }
    }
}

impl DeviceConfig {
    /// Full URL of the event stream
    pub fn events_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.events_path.trim_start_matches('/')
        )
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        if let Ok(env_path) = std::env::var("SENSORLOG_CONFIG") {
            let path = PathBuf::from(env_path);
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from SENSORLOG_CONFIG: {}", e);
                    }
                }
            }
        }

        if let Ok(dir) = std::env::var("SENSORLOG_DIR") {
            let path = PathBuf::from(dir).join("sensorlog.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from SENSORLOG_DIR: {}", e);
                    }
                }
            }
        }

        // Try ~/.config/sensorlog/sensorlog.yaml
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("sensorlog").join("sensorlog.yaml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        // Try ./sensorlog.yaml (for development)
        let local_config = PathBuf::from("sensorlog.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load local config: {}", e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Directory the data files default to.
    ///
    /// `SENSORLOG_DIR` wins; otherwise the directory holding the running
    /// executable, so the database sits next to the tool like the old scripts.
    pub fn base_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SENSORLOG_DIR") {
            return PathBuf::from(dir);
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }

    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.paths.database)
    }

    pub fn export_path(&self) -> PathBuf {
        Self::expand_path(&self.paths.export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.base_url, "http://172.20.10.6");
        assert_eq!(config.retry_delay(), Duration::from_secs(3));
        assert_eq!(config.events_url(), "http://172.20.10.6/events");
    }

    #[test]
    fn test_events_url_joins_slashes() {
        let config = DeviceConfig {
            base_url: "http://10.0.0.7/".to_string(),
            events_path: "/events".to_string(),
            ..DeviceConfig::default()
        };
        assert_eq!(config.events_url(), "http://10.0.0.7/events");

        let config = DeviceConfig {
            base_url: "http://10.0.0.7".to_string(),
            events_path: "stream".to_string(),
            ..DeviceConfig::default()
        };
        assert_eq!(config.events_url(), "http://10.0.0.7/stream");
    }

    #[test]
    fn test_default_paths_share_directory() {
        let paths = PathsConfig::default();
        assert_eq!(paths.database.file_name().unwrap(), DATABASE_FILE);
        assert_eq!(paths.export.file_name().unwrap(), EXPORT_FILE);
        assert_eq!(paths.database.parent(), paths.export.parent());
    }

    #[test]
    fn test_expand_path_no_expansion() {
        let path = PathBuf::from("/var/lib/sensorlog/data.sqlite3");
        let expanded = Config::expand_path(&path);
        assert_eq!(expanded, path);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/sensors.sqlite3");
        let expanded = Config::expand_path(&path);
        assert!(!expanded.to_string_lossy().contains('~'));
        assert!(expanded.to_string_lossy().contains("sensors.sqlite3"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "device:\n  base_url: http://192.168.4.1\nlog_level: debug\n";
        let config: Config = serde_yaml::from_str(yaml).expect("Failed to parse");
        assert_eq!(config.device.base_url, "http://192.168.4.1");
        assert_eq!(config.device.events_path, "/events");
        assert_eq!(config.device.retry_delay_secs, 3);
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sensorlog.yaml");
        fs::write(&path, "paths:\n  database: /tmp/custom.sqlite3\n").unwrap();

        let config = Config::load(Some(&path)).expect("Failed to load");
        assert_eq!(config.paths.database, PathBuf::from("/tmp/custom.sqlite3"));
        assert_eq!(config.paths.export.file_name().unwrap(), EXPORT_FILE);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/sensorlog.yaml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let yaml_str = serde_yaml::to_string(&config).expect("Failed to serialize");
        let parsed: Config = serde_yaml::from_str(&yaml_str).expect("Failed to deserialize");
        assert_eq!(parsed.device.base_url, config.device.base_url);
        assert_eq!(parsed.paths.database, config.paths.database);
        assert_eq!(parsed.log_level, config.log_level);
    }
}
