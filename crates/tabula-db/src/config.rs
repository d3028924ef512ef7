//! Connection configuration.

use std::fmt;

use serde::Deserialize;

/// Connection settings for a [`Db`](crate::Db) handle.
///
/// `backup` is tried, recursively, when the database cannot be opened with
/// these settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// How long to wait for a connection before giving up, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Create the database file when it does not exist.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,

    /// Settings to fall back to when this database cannot be opened.
    #[serde(default)]
    pub backup: Option<Box<DbConfig>>,
}

fn default_path() -> String {
    "tabula.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_create_if_missing() -> bool {
    true
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            create_if_missing: default_create_if_missing(),
            backup: None,
        }
    }
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// A private in-memory database. Every pooled connection sees its own
    /// database, so forks of a handle do not share data.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    pub fn with_backup(mut self, backup: DbConfig) -> Self {
        self.backup = Some(Box::new(backup));
        self
    }
}

impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sqlite:{} (pool {}, busy timeout {}ms)",
            self.path, self.pool_max_size, self.busy_timeout_ms
        )?;
        if let Some(backup) = &self.backup {
            write!(f, ", backup {backup}")?;
        }
        Ok(())
    }
}
