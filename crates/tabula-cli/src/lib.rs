//! Command line access to a tabula database.
//!
//! Every command prints its result as JSON:
//!
//! ```text
//! tabula --database app.db tables
//! tabula --database app.db row "select * from user where id = 2"
//! tabula --database app.db count user --limit 1000
//! ```

pub mod config;

use clap::Subcommand;
use serde_json::{json, Value};
use tabula_db::{Db, DbError};
use thiserror::Error;

/// Errors surfaced by the command line tool.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a statement; selects print their rows, writes their counters.
    Query {
        /// SQL text.
        sql: String,
    },
    /// Print the first row of a query or table.
    Row {
        /// SQL text or a table name.
        query: String,
    },
    /// Print the first column of the first row.
    Value {
        /// SQL text or a table name.
        query: String,
    },
    /// List the tables of the database.
    Tables,
    /// Describe the columns and unique keys of a table.
    Describe {
        /// Table name.
        table: String,
    },
    /// Count the rows of a query, ignoring its limit.
    Count {
        /// SQL text or a table name.
        query: String,

        /// Stop counting after this many rows.
        #[arg(long)]
        limit: Option<u64>,
    },
}

/// Runs one command and returns its JSON output.
///
/// # Errors
///
/// Returns `CliError::Database` when the statement fails.
pub fn run(db: &Db, command: &Command) -> Result<Value, CliError> {
    tracing::debug!(?command, database = %db, "running command");
    let output = match command {
        Command::Query { sql } => {
            let result = db.query(sql)?;
            if result.columns().is_empty() {
                json!({
                    "affected": result.row_count(),
                    "inserted_id": result.inserted_id(),
                })
            } else {
                serde_json::to_value(result.as_rows())?
            }
        }
        Command::Row { query } => serde_json::to_value(db.row(query.as_str())?)?,
        Command::Value { query } => db.value(query.as_str())?.unwrap_or(Value::Null),
        Command::Tables => serde_json::to_value(db.tables()?)?,
        Command::Describe { table } => serde_json::to_value(db.table_info(table)?)?,
        Command::Count { query, limit } => {
            let (count, _) = db.count_and_rows(*limit, query.as_str())?;
            json!({ "count": count })
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_db::DbConfig;

    fn test_db() -> Db {
        let db = Db::new(DbConfig::in_memory());
        db.query("CREATE TABLE user (id INTEGER PRIMARY KEY, name VARCHAR(40) NOT NULL)")
            .expect("should create table");
        db
    }

    #[test]
    fn writes_report_counters() {
        let db = test_db();
        let output = run(
            &db,
            &Command::Query {
                sql: "insert into user (name) values ('bob'), ('sue')".into(),
            },
        )
        .expect("insert");
        assert_eq!(output, json!({"affected": 2, "inserted_id": 2}));
    }

    #[test]
    fn reads_print_rows_and_values() {
        let db = test_db();
        db.query("insert into user (name) values ('bob'), ('sue')")
            .expect("insert");

        let rows = run(&db, &Command::Query { sql: "select name from user".into() })
            .expect("select");
        assert_eq!(rows, json!([{"name": "bob"}, {"name": "sue"}]));

        let row = run(&db, &Command::Row { query: "user".into() }).expect("row");
        assert_eq!(row, json!({"id": 1, "name": "bob"}));

        let value = run(
            &db,
            &Command::Value {
                query: "select name from user where id = 2".into(),
            },
        )
        .expect("value");
        assert_eq!(value, json!("sue"));

        let count = run(
            &db,
            &Command::Count {
                query: "user".into(),
                limit: None,
            },
        )
        .expect("count");
        assert_eq!(count, json!({"count": 2}));
    }

    #[test]
    fn schema_commands() {
        let db = test_db();
        assert_eq!(run(&db, &Command::Tables).expect("tables"), json!(["user"]));

        let described = run(&db, &Command::Describe { table: "user".into() }).expect("describe");
        assert_eq!(described["columns"][1]["name"], json!("name"));
        assert_eq!(described["columns"][1]["limit"], json!(40));
        assert_eq!(described["keys"]["PRIMARY"], json!(["id"]));
    }

    #[test]
    fn failures_are_database_errors() {
        let db = test_db();
        let err = run(&db, &Command::Row { query: "select * from nowhere".into() })
            .expect_err("missing table");
        assert!(matches!(err, CliError::Database(_)));
    }
}
