//! Table introspection, cached per handle.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::{lock, Db};
use crate::error::DbError;
use crate::sql::{parse_column_limit, parse_column_type, quote_identity, ColumnType, Query};
use crate::value::{raw_text, truthy, Row, Value};

/// Name under which primary key columns are reported.
pub const PRIMARY_KEY: &str = "PRIMARY";

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Type as declared in the schema.
    pub declared_type: String,
    /// Portable type, when the declared type is recognised.
    pub column_type: Option<ColumnType>,
    /// Length from the declared type, e.g. 255 for `VARCHAR(255)`.
    pub limit: Option<i64>,
    pub nullable: bool,
    pub auto_increment: bool,
    /// Default expression as declared.
    pub default: Value,
    /// `primary`, `unique`, or `None`.
    pub key: Option<String>,
}

/// Columns and unique keys of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    /// Unique keys by name, each with its columns in key order. The primary
    /// key is listed as `PRIMARY`.
    pub keys: BTreeMap<String, Vec<String>>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// An index of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub unique: bool,
    /// Columns by 1-based position in the index.
    pub columns: BTreeMap<u32, String>,
}

fn text(row: &Row, key: &str) -> String {
    row.get(key).map(raw_text).unwrap_or_default()
}

fn int(row: &Row, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or(0)
}

impl Db {
    /// Names of the user tables, sorted.
    pub fn tables(&self) -> Result<Vec<String>, DbError> {
        let names = self.column(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        Ok(names.iter().map(raw_text).collect())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, DbError> {
        if lock(&self.tables_info).contains_key(table) {
            return Ok(true);
        }
        let found = self.value(Query::prepared(
            "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?",
            [table],
        ))?;
        Ok(found.as_ref().is_some_and(truthy))
    }

    /// Columns and unique keys of a table.
    pub fn table_info(&self, table: &str) -> Result<TableInfo, DbError> {
        if let Some(info) = lock(&self.tables_info).get(table) {
            return Ok(info.clone());
        }

        let quoted = quote_identity(table, false);
        let rows = self.rows(format!("PRAGMA table_info({quoted})"))?;

        let mut primary: Vec<(i64, String)> = rows
            .iter()
            .filter(|row| int(row, "pk") > 0)
            .map(|row| (int(row, "pk"), text(row, "name")))
            .collect();
        primary.sort();
        let primary: Vec<String> = primary.into_iter().map(|(_, name)| name).collect();

        let mut keys = BTreeMap::new();
        if !primary.is_empty() {
            keys.insert(PRIMARY_KEY.to_string(), primary.clone());
        }
        for (name, index) in self.indices(table)? {
            if index.unique && name != PRIMARY_KEY {
                keys.insert(name, index.columns.into_values().collect());
            }
        }
        let unique_leads: Vec<&String> = keys
            .iter()
            .filter(|(name, _)| name.as_str() != PRIMARY_KEY)
            .filter_map(|(_, columns)| columns.first())
            .collect();

        let columns = rows
            .iter()
            .map(|row| {
                let name = text(row, "name");
                let declared_type = text(row, "type");
                let in_primary = primary.contains(&name);
                // INTEGER PRIMARY KEY aliases the rowid and numbers itself.
                let auto_increment = in_primary
                    && primary.len() == 1
                    && declared_type.eq_ignore_ascii_case("integer");
                let key = if in_primary {
                    Some("primary".to_string())
                } else if unique_leads.contains(&&name) {
                    Some("unique".to_string())
                } else {
                    None
                };
                ColumnInfo {
                    column_type: parse_column_type(&declared_type),
                    limit: parse_column_limit(&declared_type),
                    nullable: int(row, "notnull") == 0 && !auto_increment,
                    auto_increment,
                    default: row.get("dflt_value").cloned().unwrap_or(Value::Null),
                    key,
                    name,
                    declared_type,
                }
            })
            .collect();

        let info = TableInfo { columns, keys };
        lock(&self.tables_info).insert(table.to_string(), info.clone());
        Ok(info)
    }

    /// Every index of a table, unique or not, by name. The primary key is
    /// listed as `PRIMARY` even when SQLite stores it as the rowid.
    pub fn indices(&self, table: &str) -> Result<Vec<(String, IndexInfo)>, DbError> {
        if let Some(indices) = lock(&self.indices).get(table) {
            return Ok(indices.clone());
        }

        let quoted = quote_identity(table, false);
        let mut indices = Vec::new();
        let mut has_primary = false;

        for entry in self.rows(format!("PRAGMA index_list({quoted})"))? {
            let index_name = text(&entry, "name");
            let origin = text(&entry, "origin");
            let mut columns = BTreeMap::new();
            let info_sql = format!("PRAGMA index_info({})", quote_identity(&index_name, false));
            for column in self.rows(info_sql)? {
                let position = u32::try_from(int(&column, "seqno") + 1).unwrap_or(u32::MAX);
                columns.insert(position, text(&column, "name"));
            }
            let name = if origin == "pk" {
                has_primary = true;
                PRIMARY_KEY.to_string()
            } else {
                index_name
            };
            indices.push((
                name,
                IndexInfo {
                    unique: int(&entry, "unique") == 1,
                    columns,
                },
            ));
        }

        if !has_primary {
            let mut rowid_key: Vec<(i64, String)> = self
                .rows(format!("PRAGMA table_info({quoted})"))?
                .iter()
                .filter(|row| int(row, "pk") > 0)
                .map(|row| (int(row, "pk"), text(row, "name")))
                .collect();
            rowid_key.sort();
            if !rowid_key.is_empty() {
                let columns = rowid_key
                    .into_iter()
                    .enumerate()
                    .map(|(position, (_, name))| (position as u32 + 1, name))
                    .collect();
                indices.insert(
                    0,
                    (
                        PRIMARY_KEY.to_string(),
                        IndexInfo {
                            unique: true,
                            columns,
                        },
                    ),
                );
            }
        }

        lock(&self.indices).insert(table.to_string(), indices.clone());
        Ok(indices)
    }

    /// Column names of a table in declaration order.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, DbError> {
        Ok(self.table_info(table)?.column_names())
    }

    /// Forgets cached table and index information, e.g. after a migration.
    pub fn clear_schema_cache(&self) {
        lock(&self.tables_info).clear();
        lock(&self.indices).clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::{ColumnType, Db, DbConfig};
    use serde_json::json;

    fn schema_db() -> Db {
        let db = Db::new(DbConfig::in_memory());
        db.query(
            "CREATE TABLE account (
                id INTEGER PRIMARY KEY,
                email VARCHAR(120) NOT NULL,
                balance DECIMAL(10,2) DEFAULT 0,
                created DATETIME
            )",
        )
        .expect("should create account");
        db.query("CREATE UNIQUE INDEX account_email ON account (email)")
            .expect("should create unique index");
        db.query("CREATE INDEX account_created ON account (created, balance)")
            .expect("should create index");
        db.query("CREATE TABLE tag (owner INTEGER, label TEXT, PRIMARY KEY (owner, label))")
            .expect("should create tag");
        db
    }

    #[test]
    fn lists_tables() {
        let db = schema_db();
        assert_eq!(db.tables().expect("tables"), ["account", "tag"]);
        assert!(db.table_exists("tag").expect("exists"));
        assert!(!db.table_exists("nope").expect("exists"));
    }

    #[test]
    fn describes_columns_and_unique_keys() {
        let db = schema_db();
        let info = db.table_info("account").expect("table info");

        let id = info.column("id").expect("id column");
        assert!(id.auto_increment);
        assert!(!id.nullable);
        assert_eq!(id.key.as_deref(), Some("primary"));
        assert_eq!(id.column_type, Some(ColumnType::Int));

        let email = info.column("email").expect("email column");
        assert_eq!(email.limit, Some(120));
        assert_eq!(email.column_type, Some(ColumnType::Text));
        assert!(!email.nullable);
        assert_eq!(email.key.as_deref(), Some("unique"));

        let balance = info.column("balance").expect("balance column");
        assert_eq!(balance.column_type, Some(ColumnType::Decimal));
        assert_eq!(balance.default, json!("0"));
        assert!(balance.nullable);

        assert_eq!(info.keys.get("PRIMARY"), Some(&vec!["id".to_string()]));
        assert_eq!(
            info.keys.get("account_email"),
            Some(&vec!["email".to_string()])
        );
        assert!(!info.keys.contains_key("account_created"));
        assert_eq!(
            db.column_names("account").expect("names"),
            ["id", "email", "balance", "created"]
        );
    }

    #[test]
    fn lists_all_indices() {
        let db = schema_db();
        let indices = db.indices("account").expect("indices");
        let created = indices
            .iter()
            .find(|(name, _)| name == "account_created")
            .map(|(_, index)| index)
            .expect("created index");
        assert!(!created.unique);
        assert_eq!(created.columns.get(&1).map(String::as_str), Some("created"));
        assert_eq!(created.columns.get(&2).map(String::as_str), Some("balance"));
        assert_eq!(indices[0].0, "PRIMARY");

        let tag = db.indices("tag").expect("tag indices");
        let primary = tag
            .iter()
            .find(|(name, _)| name == "PRIMARY")
            .map(|(_, index)| index)
            .expect("composite primary key");
        assert!(primary.unique);
        assert_eq!(primary.columns.len(), 2);
    }
}
