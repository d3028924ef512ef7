//! Configuration loading from file and environment variables.

use serde::Deserialize;
use tabula_db::DbConfig;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings, including an optional `[database.backup]` table.
    #[serde(default)]
    pub database: DbConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "warn", "tabula_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `TABULA_DB_PATH` overrides `database.path`
/// - `TABULA_LOG_LEVEL` overrides `logging.level`
/// - `TABULA_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_overrides(config, |name| std::env::var(name).ok()))
}

/// Applies `TABULA_*` overrides read through `lookup`.
pub fn apply_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(db_path) = lookup("TABULA_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("TABULA_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("TABULA_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_database_and_backup_tables() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "main.db"
            busy_timeout_ms = 250

            [database.backup]
            path = "replica.db"
            create_if_missing = false

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.database.path, "main.db");
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.database.pool_max_size, 8);
        let backup = config.database.backup.expect("backup should be set");
        assert_eq!(backup.path, "replica.db");
        assert!(!backup.create_if_missing);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.database.path, "tabula.db");
        assert!(config.database.backup.is_none());
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.json);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("TABULA_DB_PATH", "/tmp/override.db"),
            ("TABULA_LOG_LEVEL", "trace"),
            ("TABULA_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();
        let config = apply_overrides(Config::default(), |name| {
            env.get(name).map(|value| value.to_string())
        });
        assert_eq!(config.database.path, "/tmp/override.db");
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert!(config.database.backup.is_none());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[database\npath = 1").expect("failed to write config");
        let err = load_config(path.to_str()).expect_err("bad toml should fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
