use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::DbError;
use crate::lock::{LockRequest, MigrationLock};
use crate::migration::MigrationKey;
use crate::state::{HistoryRow, MigrationStateStore};
use crate::statement::SchemaProbe;

#[derive(Debug)]
struct LockHolder {
    owner: String,
    acquired: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    table_exists: bool,
    history: BTreeMap<MigrationKey, HistoryRow>,
    snapshot: Option<BTreeMap<MigrationKey, HistoryRow>>,
    log: Vec<String>,
    objects: HashSet<SchemaProbe>,
    fail_on: Vec<String>,
    locks: HashMap<String, LockHolder>,
    statement_delay: Option<Duration>,
}

/// Database stand-in that records statements instead of running them.
///
/// Clones share state, so several handles behave like connections to the
/// same database: they see one history table and contend for one lock.
/// Rolling back restores the history rows as of `begin`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatabase {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `probe` report the object as present.
    pub fn with_object(self, probe: SchemaProbe) -> Self {
        self.inner.lock().objects.insert(probe);
        self
    }

    /// Statements containing `pattern` fail from now on.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.inner.lock().fail_on.push(pattern.into());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().fail_on.clear();
    }

    pub fn set_statement_delay(&self, delay: Option<Duration>) {
        self.inner.lock().statement_delay = delay;
    }

    /// Every statement executed so far, including transaction control.
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().log.clone()
    }

    pub fn history(&self) -> Vec<HistoryRow> {
        self.inner.lock().history.values().cloned().collect()
    }

    pub fn has_history_table(&self) -> bool {
        self.inner.lock().table_exists
    }

    pub fn lock_holder(&self, name: &str) -> Option<String> {
        self.inner.lock().locks.get(name).map(|h| h.owner.clone())
    }

    /// Writes a history row directly, bypassing any migrator.
    pub fn seed_history(&self, row: HistoryRow) {
        let mut inner = self.inner.lock();
        inner.table_exists = true;
        inner.history.insert(row.key, row);
    }
}

impl Connection for InMemoryDatabase {
    fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        let delay = {
            let mut inner = self.inner.lock();
            if inner.fail_on.iter().any(|p| sql.contains(p.as_str())) {
                return Err(DbError::new(format!("injected failure executing: {}", sql)));
            }
            inner.log.push(sql.to_string());
            inner.statement_delay
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        if inner.snapshot.is_some() {
            return Err(DbError::new("transaction already in progress"));
        }
        inner.snapshot = Some(inner.history.clone());
        inner.log.push("BEGIN".to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        if inner.snapshot.take().is_none() {
            return Err(DbError::new("no transaction in progress"));
        }
        inner.log.push("COMMIT".to_string());
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        let snapshot = inner
            .snapshot
            .take()
            .ok_or_else(|| DbError::new("no transaction in progress"))?;
        inner.history = snapshot;
        inner.log.push("ROLLBACK".to_string());
        Ok(())
    }

    fn object_exists(&mut self, probe: &SchemaProbe) -> Result<bool, DbError> {
        Ok(self.inner.lock().objects.contains(probe))
    }
}

impl MigrationStateStore for InMemoryDatabase {
    fn ensure_table(&mut self) -> Result<(), DbError> {
        self.inner.lock().table_exists = true;
        Ok(())
    }

    fn applied(&mut self) -> Result<Vec<HistoryRow>, DbError> {
        let inner = self.inner.lock();
        if !inner.table_exists {
            return Ok(Vec::new());
        }
        Ok(inner.history.values().cloned().collect())
    }

    fn insert(&mut self, row: &HistoryRow) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        if !inner.table_exists {
            return Err(DbError::new("history table does not exist"));
        }
        if inner.history.contains_key(&row.key) {
            return Err(DbError::new(format!("duplicate history row {}", row.key))
                .with_sql_state("23505"));
        }
        inner.history.insert(row.key, row.clone());
        Ok(())
    }

    fn delete(&mut self, key: MigrationKey) -> Result<(), DbError> {
        self.inner.lock().history.remove(&key);
        Ok(())
    }
}

impl MigrationLock for InMemoryDatabase {
    fn try_acquire_lock(&mut self, request: &LockRequest<'_>) -> Result<bool, DbError> {
        let mut inner = self.inner.lock();
        if let Some(holder) = inner.locks.get(request.name) {
            let stale = request
                .stale_after
                .is_some_and(|after| holder.acquired.elapsed() > after);
            if !stale {
                return Ok(false);
            }
            tracing::warn!(
                lock = %request.name,
                previous_owner = %holder.owner,
                "reclaiming stale migration lock"
            );
        }
        inner.locks.insert(
            request.name.to_string(),
            LockHolder {
                owner: request.owner.to_string(),
                acquired: Instant::now(),
            },
        );
        Ok(true)
    }

    fn release_lock(&mut self, name: &str, owner: &str) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        if inner.locks.get(name).is_some_and(|h| h.owner == owner) {
            inner.locks.remove(name);
        }
        Ok(())
    }

    fn refresh_lock(&mut self, name: &str, owner: &str) -> Result<bool, DbError> {
        let mut inner = self.inner.lock();
        match inner.locks.get_mut(name) {
            Some(holder) if holder.owner == owner => {
                holder.acquired = Instant::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn force_release_lock(&mut self, name: &str) -> Result<(), DbError> {
        self.inner.lock().locks.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::operation::TableName;

    fn row(key: u64) -> HistoryRow {
        HistoryRow {
            key: MigrationKey::new(key),
            title: format!("migration {}", key),
            checksum: None,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn applied_is_empty_without_table() {
        let mut db = InMemoryDatabase::new();
        assert!(db.applied().unwrap().is_empty());
        assert!(db.insert(&row(1)).is_err());
    }

    #[test]
    fn rollback_restores_history() {
        let mut db = InMemoryDatabase::new();
        db.ensure_table().unwrap();
        db.insert(&row(1)).unwrap();

        db.begin().unwrap();
        db.insert(&row(2)).unwrap();
        db.rollback().unwrap();

        let keys: Vec<_> = db.applied().unwrap().iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![MigrationKey::new(1)]);
        assert_eq!(db.executed(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut db = InMemoryDatabase::new();
        db.ensure_table().unwrap();
        db.insert(&row(1)).unwrap();
        let err = db.insert(&row(1)).unwrap_err();
        assert_eq!(err.sql_state.as_deref(), Some("23505"));
    }

    #[test]
    fn injected_failures() {
        let mut db = InMemoryDatabase::new();
        db.fail_on("DROP");
        assert!(db.execute("CREATE TABLE t (id integer)").is_ok());
        assert!(db.execute("DROP TABLE t").is_err());
        db.clear_failures();
        assert!(db.execute("DROP TABLE t").is_ok());
    }

    #[test]
    fn seeded_objects_exist() {
        let probe = SchemaProbe::Table(TableName::new("users"));
        let mut db = InMemoryDatabase::new().with_object(probe.clone());
        assert!(db.object_exists(&probe).unwrap());
        assert!(!db
            .object_exists(&SchemaProbe::Table(TableName::new("posts")))
            .unwrap());
    }

    #[test]
    fn clones_share_one_lock() {
        let mut a = InMemoryDatabase::new();
        let mut b = a.clone();
        let request = |owner| LockRequest {
            name: "lock",
            owner,
            stale_after: None,
        };

        assert!(a.try_acquire_lock(&request("a")).unwrap());
        assert!(!b.try_acquire_lock(&request("b")).unwrap());

        b.release_lock("lock", "b").unwrap();
        assert_eq!(a.lock_holder("lock").as_deref(), Some("a"));

        a.release_lock("lock", "a").unwrap();
        assert!(b.try_acquire_lock(&request("b")).unwrap());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let mut a = InMemoryDatabase::new();
        let mut b = a.clone();
        assert!(a
            .try_acquire_lock(&LockRequest {
                name: "lock",
                owner: "a",
                stale_after: None,
            })
            .unwrap());

        thread::sleep(Duration::from_millis(5));
        assert!(b
            .try_acquire_lock(&LockRequest {
                name: "lock",
                owner: "b",
                stale_after: Some(Duration::from_millis(1)),
            })
            .unwrap());
        assert_eq!(b.lock_holder("lock").as_deref(), Some("b"));
    }

    #[test]
    fn refreshed_lock_is_not_stale() {
        let mut a = InMemoryDatabase::new();
        let mut b = a.clone();
        let ttl = Some(Duration::from_millis(50));
        assert!(a
            .try_acquire_lock(&LockRequest {
                name: "lock",
                owner: "a",
                stale_after: None,
            })
            .unwrap());

        thread::sleep(Duration::from_millis(80));
        assert!(a.refresh_lock("lock", "a").unwrap());
        assert!(!b
            .try_acquire_lock(&LockRequest {
                name: "lock",
                owner: "b",
                stale_after: ttl,
            })
            .unwrap());
        assert_eq!(a.lock_holder("lock").as_deref(), Some("a"));
        assert!(!b.refresh_lock("lock", "b").unwrap());
    }
}
