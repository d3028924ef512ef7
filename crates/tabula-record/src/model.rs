//! Record types bound to one table.
//!
//! ```rust,ignore
//! struct User(StandardRecord);
//!
//! impl RecordModel for User {
//!     const TABLE: &'static str = "user";
//!
//!     fn json_mapped_columns() -> JsonColumns {
//!         JsonColumns::Auto
//!     }
//!
//!     fn from_record(record: StandardRecord) -> Self {
//!         User(record)
//!     }
//!
//!     fn record(&self) -> &StandardRecord {
//!         &self.0
//!     }
//!
//!     fn record_mut(&mut self) -> &mut StandardRecord {
//!         &mut self.0
//!     }
//! }
//!
//! let mut user = User::load(db, 7)?;
//! ```

use std::sync::Arc;

use tabula_db::{is_int_like, Conditions, Db, Row, Value, Where};

use crate::error::RecordError;
use crate::standard::{StandardOptions, StandardRecord};
use crate::transform::{json_columns_from_db, JsonColumns, RowTransform, Transformers};

/// Anything [`RecordModel::construct_from`] can turn into a model.
#[derive(Debug)]
pub enum ModelInput<M> {
    /// A value of the id column.
    Id(Value),
    /// A map: an identifier when it lacks the id column or holds nothing
    /// else, otherwise an initial record.
    Fields(Row),
    /// An existing model, returned as is.
    Model(M),
}

impl<M> From<i64> for ModelInput<M> {
    fn from(id: i64) -> Self {
        Self::Id(Value::from(id))
    }
}

impl<M> From<&str> for ModelInput<M> {
    fn from(id: &str) -> Self {
        Self::Id(Value::from(id))
    }
}

impl<M> From<Row> for ModelInput<M> {
    fn from(row: Row) -> Self {
        Self::Fields(row)
    }
}

/// A typed record over [`RecordModel::TABLE`].
pub trait RecordModel: Sized {
    const TABLE: &'static str;
    const ID_COLUMN: &'static str = "id";

    /// `__json` columns mapped for this model. Used when
    /// [`RecordModel::transformers`] leaves a direction unset.
    fn json_mapped_columns() -> JsonColumns {
        JsonColumns::None
    }

    /// Custom row transformers for this model.
    fn transformers() -> Transformers {
        Transformers::default()
    }

    fn from_record(record: StandardRecord) -> Self;

    fn record(&self) -> &StandardRecord;

    fn record_mut(&mut self) -> &mut StandardRecord;

    /// A lazily loaded model for `identifier`. Integer identifiers match
    /// [`RecordModel::ID_COLUMN`].
    fn load(db: Arc<Db>, identifier: impl Into<Where>) -> Result<Self, RecordError> {
        construct::<Self>(db, identifier.into(), None, None)
    }

    /// A model preloaded with a row in database form.
    fn from_initial(
        db: Arc<Db>,
        initial: Row,
        identifier: impl Into<Where>,
    ) -> Result<Self, RecordError> {
        construct::<Self>(db, identifier.into(), Some(initial), None)
    }

    /// A model preloaded with a row already in record form.
    fn from_transformed(
        db: Arc<Db>,
        transformed: Row,
        identifier: impl Into<Where>,
    ) -> Result<Self, RecordError> {
        construct::<Self>(db, identifier.into(), None, Some(transformed))
    }

    fn construct_from(db: Arc<Db>, input: ModelInput<Self>) -> Result<Self, RecordError> {
        match input {
            ModelInput::Model(model) => Ok(model),
            ModelInput::Id(id) => Self::load(db, Conditions::new().with(Self::ID_COLUMN, id)),
            ModelInput::Fields(fields) => match fields.get(Self::ID_COLUMN).cloned() {
                Some(id) if fields.len() > 1 => Self::from_initial(
                    db,
                    fields,
                    Conditions::new().with(Self::ID_COLUMN, id),
                ),
                _ => Self::load(db, fields),
            },
        }
    }

    /// Inserts `row` and returns the model preloaded with it.
    fn create(db: Arc<Db>, mut row: Row) -> Result<Self, RecordError> {
        if Self::TABLE.is_empty() {
            return Err(RecordError::MissingTable);
        }
        let id = db.insert(Self::TABLE, &row)?.into_value();
        row.insert(Self::ID_COLUMN.to_string(), id.clone());
        Self::from_initial(db, row, Conditions::new().with(Self::ID_COLUMN, id))
    }

    /// Converts a database row the way this model's records do.
    fn transform_on_get_apply(row: Row) -> Result<Row, RecordError> {
        model_transform::<Self>().on_get(row)
    }

    /// Converts a record row back into database form.
    fn transform_on_set_apply(row: Row) -> Result<Row, RecordError> {
        model_transform::<Self>().on_set(row)
    }

    fn json_columns_from_db(db: &Db) -> Result<Vec<String>, RecordError> {
        json_columns_from_db(db, Self::TABLE)
    }
}

fn model_transform<M: RecordModel>() -> RowTransform {
    RowTransform::new(M::transformers(), M::json_mapped_columns())
}

fn construct<M: RecordModel>(
    db: Arc<Db>,
    identifier: Where,
    initial_record: Option<Row>,
    transformed_initial_record: Option<Row>,
) -> Result<M, RecordError> {
    if M::TABLE.is_empty() {
        return Err(RecordError::MissingTable);
    }
    let identifier = match identifier {
        Where::Id(id) if is_int_like(&id) => Where::Fields(Conditions::new().with(M::ID_COLUMN, id)),
        other => other,
    };
    let options = StandardOptions {
        json_mapped_columns: M::json_mapped_columns(),
        transformers: M::transformers(),
        initial_record,
        transformed_initial_record,
        id_column: Some(M::ID_COLUMN.to_string()),
    };
    let record = StandardRecord::new(db, identifier, M::TABLE, options)?;
    Ok(M::from_record(record))
}
