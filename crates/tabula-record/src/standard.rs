//! Records backed by a database table.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tabula_db::{Conditions, Db, Row, Select, Where};

use crate::error::RecordError;
use crate::record::{Diff, Record, RecordStore};
use crate::transform::{json_columns_from_db, JsonColumns, RowTransform, Transformers};

/// Loads a record's row from a table and writes changed columns back.
#[derive(Debug)]
pub struct TableStore {
    db: Arc<Db>,
    table: String,
    transform: RowTransform,
}

impl TableStore {
    pub fn new(db: Arc<Db>, table: impl Into<String>, transform: RowTransform) -> Self {
        Self {
            db,
            table: table.into(),
            transform,
        }
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn transform(&self) -> &RowTransform {
        &self.transform
    }
}

impl RecordStore for TableStore {
    fn load(&mut self, identifier: &Where) -> Result<Row, RecordError> {
        let row = self
            .db
            .row(Select::from(self.table.as_str()).filter(identifier.clone()))?
            .ok_or_else(|| RecordError::NotFound {
                table: self.table.clone(),
                identifier: identifier.to_string(),
            })?;
        self.transform.on_get(row)
    }

    fn save(&mut self, identifier: &Where, record: &Row, diff: &Diff) -> Result<Row, RecordError> {
        // Removed columns are absent from the record; whole columns are
        // written, never parts of a JSON value.
        let picked: Row = diff
            .keys()
            .filter_map(|key| record.get(key).map(|value| (key.clone(), value.clone())))
            .collect();
        let picked = self.transform.on_set(picked)?;
        if !picked.is_empty() {
            let changed = self.db.update(&self.table, picked, identifier.clone())?;
            tracing::debug!(table = %self.table, changed, "record saved");
        }
        Ok(record.clone())
    }
}

/// Options for [`StandardRecord::new`] and [`StandardRecord::create`].
#[derive(Debug, Clone, Default)]
pub struct StandardOptions {
    pub json_mapped_columns: JsonColumns,
    pub transformers: Transformers,
    /// A row as read from the database; passed through the get transformer.
    pub initial_record: Option<Row>,
    /// A row already in record form.
    pub transformed_initial_record: Option<Row>,
    /// Id column for [`StandardRecord::create`]; `id` when unset.
    pub id_column: Option<String>,
}

/// A [`Record`] over one row of a table.
///
/// ```rust,ignore
/// let mut user = StandardRecord::new(db, 2, "user", StandardOptions::default())?;
/// user.set("name", "sue")?;
/// user.apply()?;
/// ```
#[derive(Debug)]
pub struct StandardRecord {
    inner: Record<TableStore>,
}

impl StandardRecord {
    pub fn new(
        db: Arc<Db>,
        identifier: impl Into<Where>,
        table: impl Into<String>,
        options: StandardOptions,
    ) -> Result<Self, RecordError> {
        let mut transform =
            RowTransform::new(options.transformers, options.json_mapped_columns);
        let initial = match options.initial_record {
            Some(initial) if transform.has_get() => Some(transform.on_get(initial)?),
            initial => options.transformed_initial_record.or(initial),
        };
        let store = TableStore::new(db, table, transform);
        let inner = match initial {
            Some(row) => Record::with_initial(identifier, store, row),
            None => Record::new(identifier, store),
        };
        Ok(Self { inner })
    }

    /// Inserts `row` and returns a record for it, preloaded with `row` and
    /// the generated id.
    pub fn create(
        db: Arc<Db>,
        table: &str,
        mut row: Row,
        options: StandardOptions,
    ) -> Result<Self, RecordError> {
        let id = db.insert(table, &row)?.into_value();
        let id_column = options.id_column.clone().unwrap_or_else(|| "id".to_string());
        row.insert(id_column.clone(), id.clone());
        tracing::debug!(table, id = %id, "record created");

        let identifier = Conditions::new().with(id_column, id);
        Self::new(
            db,
            identifier,
            table,
            StandardOptions {
                initial_record: Some(row),
                transformed_initial_record: None,
                ..options
            },
        )
    }

    pub fn db(&self) -> &Arc<Db> {
        self.inner.store().db()
    }

    pub fn table(&self) -> &str {
        self.inner.store().table()
    }

    /// The local record in database form.
    pub fn record_untransformed(&mut self) -> Result<Row, RecordError> {
        let record = self.inner.record()?.clone();
        self.inner.store().transform().on_set(record)
    }

    /// Names, without the affix, of the `__json` columns of `table`.
    pub fn json_columns_from_db(db: &Db, table: &str) -> Result<Vec<String>, RecordError> {
        json_columns_from_db(db, table)
    }

    pub fn into_inner(self) -> Record<TableStore> {
        self.inner
    }
}

impl Deref for StandardRecord {
    type Target = Record<TableStore>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for StandardRecord {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
