//! Named advisory locks.
//!
//! SQLite has no `GET_LOCK`, so locks are rows of the `_tabula_locks` table:
//! whoever inserts the row for a name holds the lock until the row is
//! deleted. Every handle on the same database file sees the same locks.
//! Each [`DbLock`] carries its own owner token, so two locks on the same
//! name never release each other.

use std::thread;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::db::Db;
use crate::error::DbError;
use crate::sql::Query;
use crate::value::truthy;

const LOCK_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS \"_tabula_locks\" (
    name TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    acquired_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Lock behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long [`DbLock::lock`] waits for the lock.
    pub timeout: Duration,
    /// Release the lock when the `DbLock` is dropped.
    pub unlock_on_exit: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            unlock_on_exit: false,
        }
    }
}

/// A named lock held through a [`Db`] handle.
pub struct DbLock<'a> {
    db: &'a Db,
    name: String,
    owner: String,
    options: LockOptions,
    locked: bool,
}

impl<'a> DbLock<'a> {
    /// Prepares a lock; nothing is acquired until [`DbLock::lock`].
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the lock table cannot be created.
    pub fn new(db: &'a Db, name: impl Into<String>, options: LockOptions) -> Result<Self, DbError> {
        db.query(LOCK_TABLE_SQL)?;
        Ok(Self {
            db,
            name: name.into(),
            owner: Uuid::new_v4().to_string(),
            options,
            locked: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits up to `timeout` (or the configured timeout) for the lock.
    /// Returns whether it is now held. Locking a lock already held by this
    /// `DbLock` succeeds immediately.
    pub fn lock(&mut self, timeout: Option<Duration>) -> Result<bool, DbError> {
        let timeout = timeout.unwrap_or(self.options.timeout);
        let deadline = Instant::now() + timeout;

        loop {
            let inserted = self.db.exec(
                "INSERT OR IGNORE INTO \"_tabula_locks\" (name, owner) VALUES (?, ?)",
                &[self.name.clone().into(), self.owner.clone().into()],
            )?;
            if inserted.row_count() > 0 || self.held_by_us()? {
                tracing::debug!(lock = %self.name, "lock acquired");
                self.locked = true;
                return Ok(true);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(lock = %self.name, ?timeout, "lock wait timed out");
                self.locked = false;
                return Ok(false);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn held_by_us(&self) -> Result<bool, DbError> {
        let owner = self.db.value(Query::prepared(
            "SELECT owner FROM \"_tabula_locks\" WHERE name = ?",
            [self.name.as_str()],
        ))?;
        Ok(owner.as_ref().and_then(|owner| owner.as_str()) == Some(self.owner.as_str()))
    }

    /// Whether this `DbLock` believes it holds the lock.
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Checks the database, regardless of local state, for whether anyone
    /// holds the lock.
    pub fn is_free(&self) -> Result<bool, DbError> {
        let free = self.db.value(Query::prepared(
            "SELECT COUNT(*) = 0 FROM \"_tabula_locks\" WHERE name = ?",
            [self.name.as_str()],
        ))?;
        Ok(free.as_ref().is_some_and(truthy))
    }

    /// Unlocks if held. Returns `None` when the lock was not held.
    pub fn release(&mut self) -> Result<Option<bool>, DbError> {
        if self.locked {
            self.unlock().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Releases the lock if this `DbLock` owns it. Returns whether a lock
    /// row was removed.
    pub fn unlock(&mut self) -> Result<bool, DbError> {
        self.locked = false;
        let removed = self.db.exec(
            "DELETE FROM \"_tabula_locks\" WHERE name = ? AND owner = ?",
            &[self.name.clone().into(), self.owner.clone().into()],
        )?;
        Ok(removed.row_count() > 0)
    }
}

impl Drop for DbLock<'_> {
    fn drop(&mut self) {
        if self.options.unlock_on_exit {
            if let Err(err) = self.unlock() {
                tracing::warn!(lock = %self.name, error = %err, "failed to release lock on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbConfig;

    fn shared_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("locks.db");
        let db = Db::new(DbConfig::new(path.to_string_lossy()));
        (dir, db)
    }

    #[test]
    fn lock_excludes_other_handles() {
        let (_dir, db) = shared_db();
        let other = db.fork();

        let mut first = DbLock::new(&db, "jobs", LockOptions::default()).expect("lock");
        let mut second = DbLock::new(&other, "jobs", LockOptions::default()).expect("lock");

        assert!(first.is_free().expect("is free"));
        assert!(first.lock(None).expect("first lock"));
        assert!(first.locked());
        assert!(!second.is_free().expect("is free"));

        assert!(!second
            .lock(Some(Duration::from_millis(60)))
            .expect("second lock"));
        assert!(!second.locked());
        assert!(!second.unlock().expect("foreign unlock"), "must not release a lock it does not own");

        assert!(first.lock(Some(Duration::ZERO)).expect("relock"), "relocking is reentrant");
        assert_eq!(first.release().expect("release"), Some(true));
        assert_eq!(first.release().expect("release"), None);
        assert!(second.lock(Some(Duration::ZERO)).expect("second lock"));
    }

    #[test]
    fn unlock_on_exit_releases_on_drop() {
        let (_dir, db) = shared_db();
        {
            let mut scoped = DbLock::new(
                &db,
                "scoped",
                LockOptions {
                    unlock_on_exit: true,
                    ..LockOptions::default()
                },
            )
            .expect("lock");
            assert!(scoped.lock(None).expect("lock"));
        }
        let checker = DbLock::new(&db, "scoped", LockOptions::default()).expect("lock");
        assert!(checker.is_free().expect("is free"));
    }
}
