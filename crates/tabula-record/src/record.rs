//! Change-tracking row objects.
//!
//! A [`Record`] keeps two copies of a row: the state last read from or
//! written to its store, and the local state that `set`/`change` modify.
//! [`Record::apply`] sends the difference between the two to the store.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tabula_db::{Row, Value, Where};

use crate::error::RecordError;

/// What happened to one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Set(Value),
    Removed,
}

/// Column changes between two states of a row, ordered by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diff(BTreeMap<String, Change>);

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes that turn `from` into `to`. Values are compared deeply.
    pub fn between(from: &Row, to: &Row) -> Self {
        let mut changes = BTreeMap::new();
        for (key, value) in to {
            if from.get(key) != Some(value) {
                changes.insert(key.clone(), Change::Set(value.clone()));
            }
        }
        for key in from.keys() {
            if !to.contains_key(key) {
                changes.insert(key.clone(), Change::Removed);
            }
        }
        Self(changes)
    }

    pub fn apply_to(&self, row: &mut Row) {
        for (key, change) in &self.0 {
            match change {
                Change::Set(value) => {
                    row.insert(key.clone(), value.clone());
                }
                Change::Removed => {
                    row.remove(key);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Change> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Change)> {
        self.0.iter()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), Change::Set(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<Change> {
        self.0.remove(key)
    }
}

/// Loads and saves the row behind a [`Record`].
pub trait RecordStore {
    /// Reads the row the identifier points at.
    fn load(&mut self, identifier: &Where) -> Result<Row, RecordError>;

    /// Persists `diff`, already applied to `record`, and returns the new
    /// stored state.
    fn save(&mut self, identifier: &Where, record: &Row, diff: &Diff)
        -> Result<Row, RecordError>;
}

/// Runs before a change or update. It may edit the diff, or return an
/// error to abandon the operation.
pub type BeforeHook = Box<dyn FnMut(&mut Diff, &Row) -> Result<(), RecordError> + Send>;

/// Runs after a change or update with the applied diff and the new row.
pub type AfterHook = Box<dyn FnMut(&Diff, &Row) + Send>;

#[derive(Default)]
struct Hooks {
    before_change: Vec<BeforeHook>,
    after_change: Vec<AfterHook>,
    before_update: Vec<BeforeHook>,
    after_update: Vec<AfterHook>,
}

fn run_before(hooks: &mut [BeforeHook], diff: &mut Diff, row: &Row) -> Result<(), RecordError> {
    for hook in hooks.iter_mut() {
        hook(diff, row)?;
    }
    Ok(())
}

fn run_after(hooks: &mut [AfterHook], diff: &Diff, row: &Row) {
    for hook in hooks.iter_mut() {
        hook(diff, row);
    }
}

/// A row with local change tracking, lazy loading and change hooks.
pub struct Record<S> {
    identifier: Where,
    store: S,
    stored: Row,
    record: Row,
    loaded: bool,
    hooks: Hooks,
}

impl<S: RecordStore> Record<S> {
    /// A record that loads through `store` on first access.
    pub fn new(identifier: impl Into<Where>, store: S) -> Self {
        Self {
            identifier: identifier.into(),
            store,
            stored: Row::new(),
            record: Row::new(),
            loaded: false,
            hooks: Hooks::default(),
        }
    }

    /// A record whose stored state is already known.
    pub fn with_initial(identifier: impl Into<Where>, store: S, initial: Row) -> Self {
        Self {
            identifier: identifier.into(),
            store,
            stored: initial.clone(),
            record: initial,
            loaded: true,
            hooks: Hooks::default(),
        }
    }

    pub fn identifier(&self) -> &Where {
        &self.identifier
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn ensure_loaded(&mut self) -> Result<(), RecordError> {
        if !self.loaded {
            let row = self.store.load(&self.identifier)?;
            self.stored = row.clone();
            self.record = row;
            self.loaded = true;
        }
        Ok(())
    }

    pub fn get(&mut self, key: &str) -> Result<Option<&Value>, RecordError> {
        self.ensure_loaded()?;
        Ok(self.record.get(key))
    }

    /// The local state, including changes not yet applied.
    pub fn record(&mut self) -> Result<&Row, RecordError> {
        self.ensure_loaded()?;
        Ok(&self.record)
    }

    /// The state last read from or written to the store.
    pub fn stored(&mut self) -> Result<&Row, RecordError> {
        self.ensure_loaded()?;
        Ok(&self.stored)
    }

    /// Local changes that [`Record::apply`] would save.
    pub fn pending(&mut self) -> Result<Diff, RecordError> {
        self.ensure_loaded()?;
        Ok(Diff::between(&self.stored, &self.record))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Diff, RecordError> {
        self.ensure_loaded()?;
        let mut target = self.record.clone();
        target.insert(key.into(), value.into());
        self.change_to(target)
    }

    pub fn remove(&mut self, key: &str) -> Result<Diff, RecordError> {
        self.ensure_loaded()?;
        let mut target = self.record.clone();
        target.remove(key);
        self.change_to(target)
    }

    /// Merges `changes` into the local state.
    pub fn change(&mut self, changes: Row) -> Result<Diff, RecordError> {
        self.ensure_loaded()?;
        let mut target = self.record.clone();
        target.extend(changes);
        self.change_to(target)
    }

    /// Replaces the whole local state; missing columns count as removed.
    pub fn replace(&mut self, row: Row) -> Result<Diff, RecordError> {
        self.ensure_loaded()?;
        self.change_to(row)
    }

    fn change_to(&mut self, target: Row) -> Result<Diff, RecordError> {
        let mut diff = Diff::between(&self.record, &target);
        if diff.is_empty() {
            return Ok(diff);
        }
        run_before(&mut self.hooks.before_change, &mut diff, &self.record)?;
        if diff.is_empty() {
            return Ok(diff);
        }
        diff.apply_to(&mut self.record);
        run_after(&mut self.hooks.after_change, &diff, &self.record);
        Ok(diff)
    }

    /// Saves local changes through the store and returns what was saved.
    pub fn apply(&mut self) -> Result<Diff, RecordError> {
        self.ensure_loaded()?;
        let mut diff = Diff::between(&self.stored, &self.record);
        if diff.is_empty() {
            return Ok(diff);
        }
        run_before(&mut self.hooks.before_update, &mut diff, &self.record)?;
        if diff.is_empty() {
            return Ok(diff);
        }
        diff.apply_to(&mut self.record);
        let saved = self.store.save(&self.identifier, &self.record, &diff)?;
        self.stored = saved.clone();
        self.record = saved;
        run_after(&mut self.hooks.after_update, &diff, &self.stored);
        Ok(diff)
    }

    /// [`Record::change`] followed by [`Record::apply`].
    pub fn update(&mut self, changes: Row) -> Result<Diff, RecordError> {
        self.change(changes)?;
        self.apply()
    }

    /// Reloads from the store, discarding local changes.
    pub fn refresh(&mut self) -> Result<(), RecordError> {
        self.loaded = false;
        self.ensure_loaded()
    }

    pub fn before_change<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&mut Diff, &Row) -> Result<(), RecordError> + Send + 'static,
    {
        self.hooks.before_change.push(Box::new(hook));
        self
    }

    pub fn after_change<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Diff, &Row) + Send + 'static,
    {
        self.hooks.after_change.push(Box::new(hook));
        self
    }

    pub fn before_update<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&mut Diff, &Row) -> Result<(), RecordError> + Send + 'static,
    {
        self.hooks.before_update.push(Box::new(hook));
        self
    }

    pub fn after_update<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&Diff, &Row) + Send + 'static,
    {
        self.hooks.after_update.push(Box::new(hook));
        self
    }
}

impl<S> fmt::Debug for Record<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("identifier", &self.identifier)
            .field("loaded", &self.loaded)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tabula_db::row;

    /// In-memory store that counts loads and remembers saved diffs.
    #[derive(Default)]
    struct MemoryStore {
        row: Row,
        loads: usize,
        saves: Vec<Diff>,
    }

    impl RecordStore for MemoryStore {
        fn load(&mut self, _identifier: &Where) -> Result<Row, RecordError> {
            self.loads += 1;
            Ok(self.row.clone())
        }

        fn save(
            &mut self,
            _identifier: &Where,
            record: &Row,
            diff: &Diff,
        ) -> Result<Row, RecordError> {
            self.saves.push(diff.clone());
            self.row = record.clone();
            Ok(record.clone())
        }
    }

    fn memory_record() -> Record<MemoryStore> {
        let store = MemoryStore {
            row: row([("id", json!(1)), ("name", json!("bob"))]),
            ..MemoryStore::default()
        };
        Record::new(1, store)
    }

    #[test]
    fn diff_between_rows() {
        let from = row([("a", json!(1)), ("b", json!({"x": [1]})), ("c", json!(3))]);
        let to = row([("a", json!(1)), ("b", json!({"x": [2]})), ("d", json!(null))]);
        let diff = Diff::between(&from, &to);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff.get("b"), Some(&Change::Set(json!({"x": [2]}))));
        assert_eq!(diff.get("c"), Some(&Change::Removed));
        assert_eq!(diff.get("d"), Some(&Change::Set(Value::Null)));

        let mut applied = from.clone();
        diff.apply_to(&mut applied);
        assert_eq!(applied, to);
    }

    #[test]
    fn loads_lazily_once() {
        let mut record = memory_record();
        assert!(!record.is_loaded());
        assert_eq!(record.store().loads, 0);
        assert_eq!(record.get("name").expect("get"), Some(&json!("bob")));
        record.record().expect("record");
        assert_eq!(record.store().loads, 1);
    }

    #[test]
    fn initial_record_skips_loading() {
        let mut record = Record::with_initial(1, MemoryStore::default(), row([("id", json!(1))]));
        assert_eq!(record.get("id").expect("get"), Some(&json!(1)));
        assert_eq!(record.store().loads, 0);
    }

    #[test]
    fn unchanged_values_fire_no_events() {
        let mut record = memory_record();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        record.after_change(move |diff, _| {
            seen.lock().expect("lock").push(diff.clone());
        });

        record.set("name", "sue").expect("set");
        record.set("name", "sue").expect("set again");
        assert_eq!(events.lock().expect("lock").len(), 1);
        assert_eq!(record.stored().expect("stored").get("name"), Some(&json!("bob")));
    }

    #[test]
    fn before_change_can_edit_or_reject() {
        let mut record = memory_record();
        record.before_change(|diff, _| {
            if diff.get("id").is_some() {
                return Err(RecordError::Rejected("id is read only".into()));
            }
            if let Some(Change::Set(Value::String(name))) = diff.get("name").cloned() {
                diff.set("name", name.to_uppercase());
            }
            Ok(())
        });

        record.set("name", "sue").expect("set");
        assert_eq!(record.get("name").expect("get"), Some(&json!("SUE")));

        let err = record.set("id", 2).expect_err("id change should be rejected");
        assert!(matches!(err, RecordError::Rejected(_)));
        assert_eq!(record.get("id").expect("get"), Some(&json!(1)));
    }

    #[test]
    fn apply_saves_pending_changes() {
        let mut record = memory_record();
        let updates = Arc::new(Mutex::new(0));
        let count = Arc::clone(&updates);
        record.after_update(move |_, _| *count.lock().expect("lock") += 1);

        record.change(row([("name", json!("sue")), ("age", json!(30))])).expect("change");
        assert_eq!(record.pending().expect("pending").len(), 2);

        let saved = record.apply().expect("apply");
        assert_eq!(saved.len(), 2);
        assert!(record.pending().expect("pending").is_empty());
        assert!(record.apply().expect("second apply").is_empty());
        assert_eq!(*updates.lock().expect("lock"), 1);
        assert_eq!(record.store().saves.len(), 1);
    }

    #[test]
    fn removal_is_tracked() {
        let mut record = memory_record();
        let diff = record.remove("name").expect("remove");
        assert_eq!(diff.get("name"), Some(&Change::Removed));
        assert!(record.remove("name").expect("remove again").is_empty());
        let saved = record.update(Row::new()).expect("update");
        assert_eq!(saved.get("name"), Some(&Change::Removed));
    }

    #[test]
    fn refresh_discards_local_changes() {
        let mut record = memory_record();
        record.set("name", "sue").expect("set");
        record.refresh().expect("refresh");
        assert_eq!(record.get("name").expect("get"), Some(&json!("bob")));
        assert_eq!(record.store().loads, 2);
    }

    #[test]
    fn before_update_edits_are_saved() {
        let mut record = memory_record();
        record.before_update(|diff, _| {
            diff.set("name", "HOOKED");
            Ok(())
        });
        record.set("name", "sue").expect("set");
        let applied = record.apply().expect("apply");
        assert_eq!(applied.get("name"), Some(&Change::Set(json!("HOOKED"))));
        assert_eq!(record.get("name").expect("get"), Some(&json!("HOOKED")));
        assert_eq!(record.stored().expect("stored").get("name"), Some(&json!("HOOKED")));
        assert_eq!(record.store().row.get("name"), Some(&json!("HOOKED")));
        assert!(record.pending().expect("pending").is_empty());
    }

    #[test]
    fn before_update_rejection_keeps_changes_pending() {
        let mut record = memory_record();
        record.before_update(|_, _| Err(RecordError::Rejected("read only".into())));
        record.set("name", "sue").expect("set");
        assert!(record.apply().is_err());
        assert_eq!(record.pending().expect("pending").len(), 1);
        assert!(record.store().saves.is_empty());
    }
}
