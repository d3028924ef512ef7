//! Change-tracking records over database rows.
//!
//! A [`Record`] holds a row twice: as last stored and as locally changed.
//! Local changes run through `before_change`/`after_change` hooks, and
//! [`Record::apply`] saves the difference through its [`RecordStore`],
//! running `before_update`/`after_update` hooks around the save.
//!
//! [`StandardRecord`] stores its row in a table of a [`tabula_db::Db`], and
//! [`RecordModel`] binds record types to one table.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tabula_record::{StandardOptions, StandardRecord};
//!
//! let mut user = StandardRecord::new(db, 2, "user", StandardOptions::default())?;
//! user.after_change(|diff, _| tracing::info!(?diff, "user changed"));
//! user.set("name", "sue")?;
//! user.set("name", "sue")?; // no change, no event
//! user.apply()?;
//! ```
//!
//! # JSON columns
//!
//! Columns named with a `__json` suffix hold JSON text. With
//! [`JsonColumns::Auto`] or an explicit column list, records see them
//! decoded and without the suffix.

mod error;
mod model;
mod record;
mod standard;
mod transform;

pub use error::RecordError;
pub use model::{ModelInput, RecordModel};
pub use record::{AfterHook, BeforeHook, Change, Diff, Record, RecordStore};
pub use standard::{StandardOptions, StandardRecord, TableStore};
pub use transform::{
    json_columns_extract_by_affix, json_columns_from_db, json_decode_row, json_encode_row,
    JsonColumns, RowTransform, TransformFn, Transformers, JSON_AFFIX,
};
