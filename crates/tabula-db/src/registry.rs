//! Named database instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::DbConfig;
use crate::db::{lock, Db};
use crate::error::DbError;

#[derive(Default)]
struct RegistryState {
    instances: HashMap<String, Arc<Db>>,
    primary: Option<String>,
}

/// Handles registered by name. The first registered instance becomes the
/// primary one. Registering never connects; each handle loads lazily.
#[derive(Default)]
pub struct DbRegistry {
    state: Mutex<RegistryState>,
}

impl DbRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new handle for `config` under `name`, replacing any
    /// handle of that name.
    pub fn init(&self, name: impl Into<String>, config: DbConfig) -> Arc<Db> {
        self.insert(name, Db::new(config))
    }

    /// Registers an existing handle under `name`.
    pub fn insert(&self, name: impl Into<String>, db: Db) -> Arc<Db> {
        let name = name.into();
        let db = Arc::new(db);
        let mut state = lock(&self.state);
        if state.primary.is_none() {
            state.primary = Some(name.clone());
        }
        tracing::debug!(instance = %name, "registered database instance");
        state.instances.insert(name, Arc::clone(&db));
        db
    }

    pub fn get(&self, name: &str) -> Result<Arc<Db>, DbError> {
        lock(&self.state)
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::UnknownInstance(name.to_string()))
    }

    pub fn primary(&self) -> Result<Arc<Db>, DbError> {
        let state = lock(&self.state);
        state
            .primary
            .as_ref()
            .and_then(|name| state.instances.get(name))
            .cloned()
            .ok_or(DbError::NoPrimary)
    }

    pub fn set_primary(&self, name: &str) -> Result<(), DbError> {
        let mut state = lock(&self.state);
        if !state.instances.contains_key(name) {
            return Err(DbError::UnknownInstance(name.to_string()));
        }
        state.primary = Some(name.to_string());
        Ok(())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.state).instances.keys().cloned().collect();
        names.sort();
        names
    }
}
