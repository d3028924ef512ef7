//! The lazily connecting database handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode};

use crate::config::DbConfig;
use crate::error::DbError;
use crate::pool::{create_pool, DbPool};
use crate::schema::{IndexInfo, TableInfo};
use crate::sql::{
    apply_limit_one, count_sql, count_subquery_sql, kvf, ktvf, quote, quote_identity, Assignments,
    Conditions, FormatContext, Query, Select, Where,
};
use crate::value::{from_sql, is_int_like, raw_text, to_sql, truthy, Row, Value};

type SqliteConnection = PooledConnection<SqliteConnectionManager>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rows and counters of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    affected: u64,
    inserted_id: Option<i64>,
}

impl QueryResult {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows changed by a write, or rows returned by a read.
    pub fn row_count(&self) -> u64 {
        if self.columns.is_empty() {
            self.affected
        } else {
            self.rows.len() as u64
        }
    }

    /// The row id generated by this statement, if it generated one.
    pub fn inserted_id(&self) -> Option<i64> {
        self.inserted_id
    }

    /// First column of the first row.
    pub fn as_value(&self) -> Option<Value> {
        self.rows.first().and_then(|row| row.first()).cloned()
    }

    /// First row keyed by column name.
    pub fn as_row(&self) -> Option<Row> {
        self.rows.first().map(|values| self.keyed(values))
    }

    pub fn as_rows(&self) -> Vec<Row> {
        self.rows.iter().map(|values| self.keyed(values)).collect()
    }

    /// First column of every row.
    pub fn as_column(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.first().cloned())
            .collect()
    }

    /// Every row as positional values.
    pub fn as_columns(&self) -> Vec<Vec<Value>> {
        self.rows.clone()
    }

    /// First row as positional values.
    pub fn as_enumerate(&self) -> Option<Vec<Value>> {
        self.rows.first().cloned()
    }

    fn keyed(&self, values: &[Value]) -> Row {
        self.columns
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect()
    }
}

/// Outcome of an insert-like statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted {
    /// Id of the inserted (or matched) row.
    Id(Value),
    /// No id could be determined; rows affected by the statement.
    RowCount(u64),
}

impl Inserted {
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Id(id) => Some(id),
            Self::RowCount(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Id(Value::Number(n)) => n.as_i64(),
            Self::Id(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Id(id) => id,
            Self::RowCount(count) => Value::from(count),
        }
    }
}

/// How [`Db::column_key`] maps rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    /// Key column → whole row.
    Whole(String),
    /// Key column → value column.
    Pair(String, String),
}

impl From<&str> for ColumnKey {
    fn from(key: &str) -> Self {
        Self::Whole(key.to_string())
    }
}

impl From<(&str, &str)> for ColumnKey {
    fn from((key, value): (&str, &str)) -> Self {
        Self::Pair(key.to_string(), value.to_string())
    }
}

/// A lazily connecting database handle.
///
/// The handle owns one connection checked out of a shared pool. Nothing is
/// opened until the first statement runs. Statements are serialised on the
/// handle; use [`Db::fork`] for a second handle on the same pool.
pub struct Db {
    config: Mutex<DbConfig>,
    pool: Arc<Mutex<Option<DbPool>>>,
    conn: Mutex<Option<SqliteConnection>>,
    last_sql: Mutex<Option<String>>,
    pub(crate) tables_info: Mutex<HashMap<String, TableInfo>>,
    pub(crate) indices: Mutex<HashMap<String, Vec<(String, IndexInfo)>>>,
}

impl Db {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config: Mutex::new(config),
            pool: Arc::new(Mutex::new(None)),
            conn: Mutex::new(None),
            last_sql: Mutex::new(None),
            tables_info: Mutex::new(HashMap::new()),
            indices: Mutex::new(HashMap::new()),
        }
    }

    /// A second handle sharing this handle's pool but holding its own
    /// connection.
    pub fn fork(&self) -> Self {
        Self {
            config: Mutex::new(self.config()),
            pool: Arc::clone(&self.pool),
            conn: Mutex::new(None),
            last_sql: Mutex::new(None),
            tables_info: Mutex::new(HashMap::new()),
            indices: Mutex::new(HashMap::new()),
        }
    }

    /// The settings in use, which may be a backup after a failed connect.
    pub fn config(&self) -> DbConfig {
        lock(&self.config).clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.conn).is_some()
    }

    /// Connects now instead of on first use.
    ///
    /// # Errors
    ///
    /// Returns the connection error of the last configuration tried.
    pub fn load(&self) -> Result<(), DbError> {
        let mut guard = lock(&self.conn);
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        Ok(())
    }

    /// Drops the held connection; the next statement reconnects.
    pub fn disconnect(&self) {
        lock(&self.conn).take();
    }

    fn connect(&self) -> Result<SqliteConnection, DbError> {
        loop {
            let config = self.config();
            match self.checkout(&config) {
                Ok(conn) => {
                    tracing::info!(path = %config.path, "database connection established");
                    return Ok(conn);
                }
                Err(err) => match config.backup {
                    Some(backup) => {
                        tracing::warn!(
                            path = %config.path,
                            backup = %backup.path,
                            error = %err,
                            "database connection failed, switching to backup"
                        );
                        *lock(&self.config) = *backup;
                        lock(&self.pool).take();
                    }
                    None => return Err(err),
                },
            }
        }
    }

    fn checkout(&self, config: &DbConfig) -> Result<SqliteConnection, DbError> {
        let mut slot = lock(&self.pool);
        if slot.is_none() {
            *slot = Some(create_pool(config)?);
        }
        let pool = slot.as_ref().ok_or(DbError::NotConnected)?;
        Ok(pool.get()?)
    }

    /// Escapes a value as an SQL literal.
    pub fn quote(&self, value: &Value) -> String {
        quote(value)
    }

    /// The last statement sent to the database.
    pub fn last_sql(&self) -> Option<String> {
        lock(&self.last_sql).clone()
    }

    /// Runs raw SQL.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` when the statement fails, or
    /// `DbError::ConnectionLost` when reconnecting once did not help.
    pub fn query(&self, sql: &str) -> Result<QueryResult, DbError> {
        self.run(sql, &[])
    }

    /// Runs SQL with positional `?` parameters.
    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        self.run(sql, params)
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        *lock(&self.last_sql) = Some(sql.to_string());
        tracing::debug!(sql, params = params.len(), "running statement");
        retry_on_lost_connection(sql, || self.run_once(sql, params), || self.disconnect())
    }

    fn run_once(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DbError> {
        let mut guard = lock(&self.conn);
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let conn = guard.as_deref().ok_or(DbError::NotConnected)?;
        execute(conn, sql, params).map_err(|source| DbError::Query {
            sql: sql.to_string(),
            source,
        })
    }

    fn run_query(&self, query: impl Into<Query>) -> Result<QueryResult, DbError> {
        let (sql, params) = query.into().into_statement();
        self.run(&sql, &params)
    }

    fn run_limited(&self, query: impl Into<Query>) -> Result<QueryResult, DbError> {
        let (sql, params) = query.into().into_statement();
        self.run(&apply_limit_one(&sql), &params)
    }

    /// First column of the first row. `LIMIT 1` is appended when missing.
    pub fn value(&self, query: impl Into<Query>) -> Result<Option<Value>, DbError> {
        Ok(self.run_limited(query)?.as_value())
    }

    /// First row. `LIMIT 1` is appended when missing.
    pub fn row(&self, query: impl Into<Query>) -> Result<Option<Row>, DbError> {
        Ok(self.run_limited(query)?.as_row())
    }

    /// Same as [`Db::row`]; the row is keyed even with a single column.
    pub fn assoc(&self, query: impl Into<Query>) -> Result<Option<Row>, DbError> {
        self.row(query)
    }

    pub fn rows(&self, query: impl Into<Query>) -> Result<Vec<Row>, DbError> {
        Ok(self.run_query(query)?.as_rows())
    }

    /// First column of every row.
    pub fn column(&self, query: impl Into<Query>) -> Result<Vec<Value>, DbError> {
        Ok(self.run_query(query)?.as_column())
    }

    /// Every row as positional values.
    pub fn columns(&self, query: impl Into<Query>) -> Result<Vec<Vec<Value>>, DbError> {
        Ok(self.run_query(query)?.as_columns())
    }

    /// First row as positional values; `LIMIT 1` is always appended.
    pub fn enumerate(&self, query: impl Into<Query>) -> Result<Option<Vec<Value>>, DbError> {
        let (sql, params) = query.into().into_statement();
        Ok(self
            .run(&format!("{sql}\nLIMIT 1"), &params)?
            .as_enumerate())
    }

    /// Rows keyed by one of their columns, mapped either to the whole row
    /// or to another column. Later rows win on duplicate keys.
    pub fn column_key(
        &self,
        key: impl Into<ColumnKey>,
        query: impl Into<Query>,
    ) -> Result<Row, DbError> {
        let key = key.into();
        let rows = self.rows(query)?;
        let mut keyed = Row::new();
        for mut row in rows {
            let key_column = match &key {
                ColumnKey::Whole(column) | ColumnKey::Pair(column, _) => column,
            };
            let Some(key_value) = row.get(key_column).map(raw_text) else {
                continue;
            };
            let mapped = match &key {
                ColumnKey::Whole(_) => Value::Object(row),
                ColumnKey::Pair(_, value_column) => {
                    row.remove(value_column).unwrap_or(Value::Null)
                }
            };
            keyed.insert(key_value, mapped);
        }
        Ok(keyed)
    }

    /// Inserts a row. See [`Inserted`] for the returned id.
    pub fn insert(&self, table: &str, row: &Row) -> Result<Inserted, DbError> {
        self.into_table("INSERT", table, row, "", &[])
    }

    /// Inserts a row unless it collides with a unique key.
    ///
    /// When nothing was inserted, `match_keys` columns of `row` are used to
    /// look up the id of the existing row.
    pub fn insert_ignore(
        &self,
        table: &str,
        row: &Row,
        match_keys: &[&str],
    ) -> Result<Inserted, DbError> {
        self.into_table("INSERT OR IGNORE", table, row, "", match_keys)
    }

    /// Inserts a row, updating the existing row on a unique key collision.
    ///
    /// Without `update`, every column of `row` is written.
    pub fn insert_update(
        &self,
        table: &str,
        row: &Row,
        update: Option<Assignments>,
        match_keys: &[&str],
    ) -> Result<Inserted, DbError> {
        let update = update
            .unwrap_or_else(|| Assignments::Fields(Conditions::from(row)))
            .render();
        let clause = format!("\nON CONFLICT DO UPDATE SET\n{update}");
        self.into_table("INSERT", table, row, &clause, match_keys)
    }

    /// Inserts a row, deleting any row it collides with first.
    pub fn replace(&self, table: &str, row: &Row, match_keys: &[&str]) -> Result<Inserted, DbError> {
        self.into_table("REPLACE", table, row, "", match_keys)
    }

    fn into_table(
        &self,
        command: &str,
        table: &str,
        row: &Row,
        update: &str,
        match_keys: &[&str],
    ) -> Result<Inserted, DbError> {
        let sql = format!(
            "{command} INTO {}{}{update}",
            quote_identity(table, true),
            kvf(row)
        );
        let result = self.query(&sql)?;

        if let Some(id) = result.inserted_id() {
            return Ok(Inserted::Id(Value::from(id)));
        }
        if let Some(id) = row.get("id").filter(|id| truthy(id)) {
            return Ok(Inserted::Id(id.clone()));
        }
        if !match_keys.is_empty() {
            let lookup: Conditions = match_keys
                .iter()
                .filter_map(|key| row.get(*key).map(|value| (*key, value.clone())))
                .collect();
            if let Some(id) = self.value(Select::from(table).filter(lookup).columns("id"))? {
                return Ok(Inserted::Id(id));
            }
        }
        Ok(Inserted::RowCount(result.row_count()))
    }

    /// Inserts many rows in one statement. The first row supplies the
    /// column list. Returns the number of rows inserted.
    pub fn intos(&self, command: &str, table: &str, rows: &[Row]) -> Result<u64, DbError> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let keys: Vec<&String> = first.keys().collect();
        let (columns, _) = crate::sql::kvp(first);
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| {
                let values: Vec<String> = keys
                    .iter()
                    .map(|key| match key.strip_prefix(':') {
                        Some(_) => row.get(*key).map(raw_text).unwrap_or_else(|| "null".into()),
                        None => row.get(*key).map(quote).unwrap_or_else(|| "null".into()),
                    })
                    .collect();
                format!("({})", values.join(","))
            })
            .collect();
        let sql = format!(
            "{command} INTO {} ({})\t\nVALUES {}",
            quote_identity(table, true),
            columns.join(","),
            tuples.join(",")
        );
        Ok(self.query(&sql)?.row_count())
    }

    /// Updates rows and returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Unqualified` when `filter` is empty; pass `"1=1"`
    /// to update every row.
    pub fn update(
        &self,
        table: &str,
        changes: impl Into<Conditions>,
        filter: impl Into<Where>,
    ) -> Result<u64, DbError> {
        let filter = filter.into();
        if filter.is_empty() {
            return Err(DbError::Unqualified {
                operation: "update",
            });
        }
        let assignments = ktvf(&changes.into(), FormatContext::Update);
        if assignments.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_identity(table, true),
            assignments.join(", "),
            filter.render()
        );
        Ok(self.query(&sql)?.row_count())
    }

    /// Deletes rows and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Unqualified` when `filter` is empty; pass `"1=1"`
    /// to delete every row.
    pub fn delete(&self, table: &str, filter: impl Into<Where>) -> Result<u64, DbError> {
        let filter = filter.into();
        if filter.is_empty() {
            return Err(DbError::Unqualified {
                operation: "delete",
            });
        }
        let sql = format!(
            "DELETE FROM {}{}",
            quote_identity(table, true),
            filter.render()
        );
        Ok(self.query(&sql)?.row_count())
    }

    /// Whether any row matches.
    pub fn check(&self, table: &str, filter: impl Into<Where>) -> Result<bool, DbError> {
        let found = self.value(Select::from(table).filter(filter).columns("1"))?;
        Ok(found.as_ref().is_some_and(truthy))
    }

    /// Id of the row matching `filter`, inserting `filter` merged with
    /// `additional` when there is none.
    pub fn id(
        &self,
        table: &str,
        filter: Conditions,
        additional: Option<Conditions>,
    ) -> Result<Value, DbError> {
        let existing = self.value(Select::from(table).filter(filter.clone()).columns("id"))?;
        if let Some(id) = existing.filter(truthy) {
            return Ok(id);
        }
        let values = match additional {
            Some(additional) => filter.merge(additional),
            None => filter,
        };
        Ok(self.insert(table, &values.to_row())?.into_value())
    }

    /// Resolves a name to an id through the table's `name` column.
    /// Integer-like input is returned as is. Lookups are recorded in `dict`
    /// when given.
    pub fn named_id(
        &self,
        table: &str,
        name: &Value,
        dict: Option<&mut HashMap<String, Value>>,
    ) -> Result<Option<Value>, DbError> {
        if is_int_like(name) {
            return Ok(Some(name.clone()));
        }
        let id = self.value(
            Select::from(table)
                .filter(Conditions::new().with("name", name.clone()))
                .columns("id"),
        )?;
        if let Some(dict) = dict {
            dict.insert(raw_text(name), id.clone().unwrap_or(Value::Null));
        }
        Ok(id)
    }

    /// Counts the rows a select would return, ignoring its `LIMIT`, and
    /// returns the count with the limited rows.
    ///
    /// The `ORDER BY` must be on a single trailing line and the `LIMIT` on
    /// its own line, as [`Select`] renders them. Statements with parameters
    /// are counted as a subquery so every placeholder stays bound; their
    /// `LIMIT` must be a literal.
    pub fn count_and_rows(
        &self,
        count_limit: Option<u64>,
        query: impl Into<Query>,
    ) -> Result<(i64, Vec<Row>), DbError> {
        let (sql, params) = query.into().into_statement();
        let counting = if params.is_empty() {
            count_sql(&sql, count_limit)
        } else {
            count_subquery_sql(&sql, count_limit)
        };
        let count = self
            .run(&apply_limit_one(&counting), &params)?
            .as_value()
            .and_then(|count| count.as_i64())
            .unwrap_or(0);
        let rows = self.run(&sql, &params)?.as_rows();
        Ok((count, rows))
    }

    pub fn start_transaction(&self) -> Result<(), DbError> {
        self.query("BEGIN").map(drop)
    }

    pub fn commit_transaction(&self) -> Result<(), DbError> {
        self.query("COMMIT").map(drop)
    }

    pub fn rollback_transaction(&self) -> Result<(), DbError> {
        self.query("ROLLBACK").map(drop)
    }

    /// Runs `work` inside a transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Db) -> Result<T, E>,
        E: From<DbError>,
    {
        self.start_transaction()?;
        match work(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback_transaction() {
                    tracing::error!(error = %rollback, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl fmt::Display for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.config())
    }
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("config", &self.config())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Runs `attempt`, reconnecting and running it once more when the driver
/// reports a lost connection.
fn retry_on_lost_connection<A, R>(
    sql: &str,
    mut attempt: A,
    reconnect: R,
) -> Result<QueryResult, DbError>
where
    A: FnMut() -> Result<QueryResult, DbError>,
    R: FnOnce(),
{
    match attempt() {
        Err(DbError::Query { source, .. }) if is_connection_lost(&source) => {
            tracing::warn!(error = %source, "database connection lost, reconnecting");
            reconnect();
            match attempt() {
                Err(DbError::Query { source, .. }) if is_connection_lost(&source) => {
                    Err(DbError::ConnectionLost {
                        sql: sql.to_string(),
                    })
                }
                other => other,
            }
        }
        other => other,
    }
}

fn is_connection_lost(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::NotADatabase
        ),
        _ => false,
    }
}

fn total_changes(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT total_changes()", [], |row| row.get(0))
}

/// Whether the statement may generate a row id, and whether it may instead
/// update an existing row (an upsert).
fn insert_kind(sql: &str) -> (bool, bool) {
    let upper = sql.trim_start().to_ascii_uppercase();
    let inserts = upper.starts_with("INSERT") || upper.starts_with("REPLACE");
    (inserts, inserts && upper.contains("ON CONFLICT"))
}

fn execute(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let bound: Vec<SqlValue> = params.iter().map(to_sql).collect();
    let rowid_before = conn.last_insert_rowid();
    let total_before = total_changes(conn)?;

    let mut values = Vec::new();
    let mut rows = stmt.query(rusqlite::params_from_iter(bound.iter()))?;
    while let Some(row) = rows.next()? {
        let mut record = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            record.push(from_sql(row.get_ref(index)?));
        }
        values.push(record);
    }
    drop(rows);

    // changes() keeps the count of the last DML statement, so it only
    // belongs to this one when the running total moved.
    let changed = total_changes(conn)? != total_before;
    let affected = if columns.is_empty() && changed {
        conn.changes() as u64
    } else {
        0
    };

    // Row ids are per table but last_insert_rowid is per connection: a new
    // row may get the same id as the previous insert into another table.
    // An upsert that updated leaves last_insert_rowid untouched, so only
    // there does an unchanged value mean nothing was inserted.
    let rowid_after = conn.last_insert_rowid();
    let (inserts, upsert) = insert_kind(sql);
    let inserted_id = (inserts
        && changed
        && rowid_after != 0
        && (!upsert || rowid_after != rowid_before))
        .then_some(rowid_after);

    Ok(QueryResult {
        columns,
        rows: values,
        affected,
        inserted_id,
    })
}
