//! Error types for the database handle.

/// Errors that can occur while connecting or running statements.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The connection pool could not be built for the configured database.
    #[error("failed to create database connection pool for '{path}': {source}")]
    PoolInit {
        /// Database path the pool was built for.
        path: String,
        /// The underlying pool error.
        source: r2d2::Error,
    },

    /// No connection could be checked out of the pool.
    #[error("failed to check out database connection: {0}")]
    Checkout(#[from] r2d2::Error),

    /// A statement failed.
    #[error("database error: {source}\n ===SQL: {sql}")]
    Query {
        /// The statement that failed.
        sql: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// The connection was lost and reconnecting did not help.
    #[error("no result, likely connection timeout\n ===SQL: {sql}")]
    ConnectionLost {
        /// The statement that was being retried.
        sql: String,
    },

    /// The handle holds no connection after loading.
    #[error("no database connection available")]
    NotConnected,

    /// An update or delete without a where clause.
    #[error("unqualified {operation} is too risky; use 1=1 to verify")]
    Unqualified {
        /// `update` or `delete`.
        operation: &'static str,
    },

    /// No instance is registered under this name.
    #[error("unknown database instance '{0}'")]
    UnknownInstance(String),

    /// The registry has no instances yet.
    #[error("no primary database instance registered")]
    NoPrimary,
}
