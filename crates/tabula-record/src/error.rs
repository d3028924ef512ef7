//! Error types for records.

use tabula_db::DbError;

/// Errors that can occur while loading, changing, or saving a record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The getter found no row for the identifier.
    #[error("getter did not find row in table '{table}' on identifier: {identifier}")]
    NotFound {
        /// Table that was searched.
        table: String,
        /// The identifier as a where condition.
        identifier: String,
    },

    /// The underlying database handle failed.
    #[error(transparent)]
    Database(#[from] DbError),

    /// A `__json` column could not be decoded or encoded.
    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),

    /// A before-hook refused the change.
    #[error("change rejected: {0}")]
    Rejected(String),

    /// A record model declared no table.
    #[error("record model must provide a table")]
    MissingTable,
}
