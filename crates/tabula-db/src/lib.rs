//! Database handle and SQL fragment builder.
//!
//! [`Db`] is a lazily connecting handle over a pooled SQLite connection. It
//! never touches the database until the first statement runs, reconnects
//! once when the driver reports a lost connection, and can fall back to a
//! backup configuration when the primary one cannot be opened.
//!
//! Most fetch helpers accept anything convertible into a [`Query`]:
//!
//! ```rust,ignore
//! use tabula_db::{Conditions, Db, DbConfig, Select};
//!
//! let db = Db::new(DbConfig::new("app.db"));
//!
//! // plain SQL
//! let rows = db.rows("select * from user where id > 20")?;
//! // a single word is a table name
//! let everyone = db.rows("user")?;
//! // built select
//! let name = db.value(
//!     Select::from("user")
//!         .filter(Conditions::new().with("id?>", 20))
//!         .columns("name"),
//! )?;
//! ```
//!
//! # Condition keys
//!
//! Where clauses and update assignments are built from [`Conditions`], an
//! ordered list of key/value pairs whose keys carry a small syntax:
//!
//! | Key | Rendered |
//! |-----|----------|
//! | `name` | `"name" = 'value'` |
//! | `name?<>` | `"name" <> 'value'` |
//! | `?name` | skipped unless the value is truthy |
//! | `:name` | value inserted unescaped |
//! | `"anything` | value taken as the whole line |
//!
//! Null values render as `null`, and in a where clause `= null` becomes
//! `is null`.

mod batch;
mod config;
mod db;
mod error;
mod lock;
mod pool;
mod registry;
mod schema;
pub mod sql;
mod value;

pub use batch::BatchGetter;
pub use config::DbConfig;
pub use db::{ColumnKey, Db, Inserted, QueryResult};
pub use error::DbError;
pub use lock::{DbLock, LockOptions};
pub use pool::{create_pool, DbPool};
pub use registry::DbRegistry;
pub use schema::{ColumnInfo, IndexInfo, TableInfo};
pub use sql::{
    Assignments, ColumnType, Columns, Conditions, FormatContext, Query, Select, Source, Where,
};
pub use value::{from_sql, is_int_like, row, to_sql, truthy, Row, Value};
