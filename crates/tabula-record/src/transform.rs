//! Row transformers applied between the database and a record.
//!
//! Columns whose name ends in `__json` hold JSON text. On the way out of the
//! database they are decoded, and mapped columns lose the affix so the
//! record sees `settings` instead of `settings__json`. On the way back in the
//! affix is restored and the values are encoded again.

use std::fmt;
use std::sync::Arc;

use tabula_db::{Db, Row, Value};

use crate::error::RecordError;

/// Column name suffix marking JSON text columns.
pub const JSON_AFFIX: &str = "__json";

/// A row-to-row conversion.
pub type TransformFn = Arc<dyn Fn(Row) -> Result<Row, RecordError> + Send + Sync>;

/// Custom conversions for rows read from (`get`) and written to (`set`) the
/// database.
#[derive(Clone, Default)]
pub struct Transformers {
    pub get: Option<TransformFn>,
    pub set: Option<TransformFn>,
}

impl Transformers {
    pub fn on_get<F>(mut self, transform: F) -> Self
    where
        F: Fn(Row) -> Result<Row, RecordError> + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(transform));
        self
    }

    pub fn on_set<F>(mut self, transform: F) -> Self
    where
        F: Fn(Row) -> Result<Row, RecordError> + Send + Sync + 'static,
    {
        self.set = Some(Arc::new(transform));
        self
    }
}

impl fmt::Debug for Transformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformers")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

/// Which `__json` columns a record sees without their affix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JsonColumns {
    /// No JSON handling.
    #[default]
    None,
    /// Map every `__json` column of the first row read.
    Auto,
    /// Map these columns, named without the affix.
    Columns(Vec<String>),
}

impl From<bool> for JsonColumns {
    fn from(auto: bool) -> Self {
        if auto {
            Self::Auto
        } else {
            Self::None
        }
    }
}

impl From<Vec<String>> for JsonColumns {
    fn from(columns: Vec<String>) -> Self {
        Self::Columns(columns)
    }
}

impl From<&[&str]> for JsonColumns {
    fn from(columns: &[&str]) -> Self {
        Self::Columns(columns.iter().map(|column| column.to_string()).collect())
    }
}

/// The transformation pipeline of one record: custom transformers take
/// precedence over JSON column mapping.
#[derive(Debug, Clone, Default)]
pub struct RowTransform {
    transformers: Transformers,
    json: JsonColumns,
}

impl RowTransform {
    pub fn new(transformers: Transformers, json: JsonColumns) -> Self {
        Self { transformers, json }
    }

    pub fn json_columns(&self) -> &JsonColumns {
        &self.json
    }

    /// Whether rows read from the database are converted at all.
    pub fn has_get(&self) -> bool {
        self.transformers.get.is_some() || self.json != JsonColumns::None
    }

    /// Converts a database row into record form. With
    /// [`JsonColumns::Auto`], the first row fixes the mapped columns.
    pub fn on_get(&mut self, row: Row) -> Result<Row, RecordError> {
        if let Some(get) = &self.transformers.get {
            return get(row);
        }
        if self.json == JsonColumns::None {
            return Ok(row);
        }

        let mut decoded = json_decode_row(row)?;
        if self.json == JsonColumns::Auto {
            self.json = JsonColumns::Columns(json_columns_extract_by_affix(&decoded));
        }
        if let JsonColumns::Columns(columns) = &self.json {
            for column in columns {
                if let Some(value) = decoded.remove(&format!("{column}{JSON_AFFIX}")) {
                    decoded.insert(column.clone(), value);
                }
            }
        }
        Ok(decoded)
    }

    /// Converts record columns back into database form.
    pub fn on_set(&self, row: Row) -> Result<Row, RecordError> {
        if let Some(set) = &self.transformers.set {
            return set(row);
        }
        if self.json == JsonColumns::None {
            return Ok(row);
        }

        let mut affixed = row;
        if let JsonColumns::Columns(columns) = &self.json {
            for column in columns {
                if let Some(value) = affixed.remove(column) {
                    affixed.insert(format!("{column}{JSON_AFFIX}"), value);
                }
            }
        }
        json_encode_row(affixed)
    }
}

/// Decodes the JSON text of every `__json` column. Empty text decodes to
/// null.
pub fn json_decode_row(row: Row) -> Result<Row, RecordError> {
    row.into_iter()
        .map(|(key, value)| -> Result<(String, Value), RecordError> {
            if !key.ends_with(JSON_AFFIX) {
                return Ok((key, value));
            }
            let decoded = match value {
                Value::String(text) if text.is_empty() => Value::Null,
                Value::String(text) => serde_json::from_str(&text)?,
                other => other,
            };
            Ok((key, decoded))
        })
        .collect()
}

/// Encodes every `__json` column as JSON text. Nulls stay null.
pub fn json_encode_row(row: Row) -> Result<Row, RecordError> {
    row.into_iter()
        .map(|(key, value)| -> Result<(String, Value), RecordError> {
            if !key.ends_with(JSON_AFFIX) || value.is_null() {
                return Ok((key, value));
            }
            Ok((key, Value::String(serde_json::to_string(&value)?)))
        })
        .collect()
}

/// Names, without the affix, of the `__json` columns in a row.
pub fn json_columns_extract_by_affix(row: &Row) -> Vec<String> {
    json_columns_from_names(row.keys())
}

fn json_columns_from_names<'a>(names: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    names
        .into_iter()
        .filter_map(|name| name.strip_suffix(JSON_AFFIX))
        .map(str::to_string)
        .collect()
}

/// Names, without the affix, of the `__json` columns of a table.
pub fn json_columns_from_db(db: &Db, table: &str) -> Result<Vec<String>, RecordError> {
    let names = db.column_names(table)?;
    Ok(json_columns_from_names(&names))
}
