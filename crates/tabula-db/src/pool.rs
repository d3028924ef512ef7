//! Connection pool creation.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use crate::config::DbConfig;
use crate::error::DbError;

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Creates a connection pool with WAL mode and foreign keys enabled on every
/// connection.
///
/// # Errors
///
/// Returns `DbError::PoolInit` if no connection can be opened within the
/// configured connect timeout.
pub fn create_pool(config: &DbConfig) -> Result<DbPool, DbError> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX
        | OpenFlags::SQLITE_OPEN_URI;
    if config.create_if_missing {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }

    let busy_timeout_ms = config.busy_timeout_ms;
    let manager = SqliteConnectionManager::file(&config.path)
        .with_flags(flags)
        .with_init(move |conn| {
            // In-memory databases report "memory", which is acceptable.
            let journal_mode: String =
                conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
            if journal_mode != "wal" && journal_mode != "memory" {
                return Err(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                    Some(format!(
                        "failed to set WAL journal mode, got: {}",
                        journal_mode
                    )),
                ));
            }
            conn.execute_batch(&format!(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = {};",
                busy_timeout_ms
            ))
        });

    Pool::builder()
        .max_size(config.pool_max_size)
        .min_idle(Some(1))
        .connection_timeout(Duration::from_millis(config.connect_timeout_ms))
        .build(manager)
        .map_err(|source| DbError::PoolInit {
            path: config.path.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_in_memory_pool() {
        let config = DbConfig {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
            ..DbConfig::in_memory()
        };

        let pool = create_pool(&config).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert!(
            mode == "wal" || mode == "memory",
            "unexpected journal_mode: {mode}"
        );

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500, "busy timeout should match settings");

        assert_eq!(pool.max_size(), 3, "pool max size should match settings");
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("absent.db");
        let config = DbConfig {
            create_if_missing: false,
            connect_timeout_ms: 200,
            ..DbConfig::new(path.to_string_lossy())
        };

        let err = create_pool(&config).expect_err("opening a missing file should fail");
        assert!(matches!(err, DbError::PoolInit { .. }), "got {err:?}");
    }
}
