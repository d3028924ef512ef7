//! Paged iteration over a query.

use crate::db::Db;
use crate::error::DbError;
use crate::sql::{limit_apply, Query};
use crate::value::{Row, Value};

/// Fetches a query in pages of `step` rows by rewriting its `LIMIT`.
///
/// Iteration ends at the first empty page, or after yielding an error.
///
/// ```rust,ignore
/// let sql = Select::from("user").filter(Conditions::new().with("id?>", 1)).columns("id");
/// for batch in BatchGetter::new(&db, sql, 50) {
///     for row in batch? {
///         // ...
///     }
/// }
/// ```
pub struct BatchGetter<'a> {
    db: &'a Db,
    sql: String,
    params: Vec<Value>,
    step: u64,
    position: u64,
    finished: bool,
}

impl<'a> BatchGetter<'a> {
    pub fn new(db: &'a Db, query: impl Into<Query>, step: u64) -> Self {
        let (sql, params) = query.into().into_statement();
        Self {
            db,
            sql,
            params,
            step: step.max(1),
            position: 0,
            finished: false,
        }
    }

    /// Index of the next page.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Starts over from the first page.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.finished = false;
    }
}

impl Iterator for BatchGetter<'_> {
    type Item = Result<Vec<Row>, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let limit = format!("{}, {}", self.position * self.step, self.step);
        let sql = limit_apply(&self.sql, &limit);
        match self.db.exec(&sql, &self.params) {
            Ok(result) => {
                let rows = result.as_rows();
                if rows.is_empty() {
                    self.finished = true;
                    None
                } else {
                    self.position += 1;
                    Some(Ok(rows))
                }
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}
