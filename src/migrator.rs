use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::backend::Backend;
use crate::config::{ChecksumPolicy, MigratorConfig};
use crate::connection::run_statement;
use crate::error::{DbError, LockError, MigrationError};
use crate::lock::{acquire_lock, LockGuard, LockRequest};
use crate::migration::{Migration, MigrationKey, MigrationRegistry};
use crate::state::{Database, HistoryRow};
use crate::statement::Statement;

/// Aggregate view of registered migrations against the history table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Registered migrations with a history row.
    pub applied: usize,
    pub pending: usize,
    /// Applied migrations whose stored checksum differs from the registered one.
    pub mismatched: usize,
    /// History rows without a registered migration.
    pub unknown_applied: usize,
    pub total: usize,
    pub unknown: Vec<MigrationKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumVerification {
    pub key: MigrationKey,
    pub title: String,
    pub stored: Option<String>,
    pub computed: String,
    pub matches: bool,
}

/// Outcome of a multi-step revert. Reverts stop at the first failure.
#[derive(Debug, Default)]
pub struct RevertResult {
    /// Reverted keys, most recent first.
    pub reverted: Vec<MigrationKey>,
    pub failed_at: Option<MigrationKey>,
    pub error: Option<MigrationError>,
}

impl RevertResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Statements a migration would run, without running them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPreview {
    pub key: MigrationKey,
    pub title: String,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

enum Record {
    Insert(HistoryRow),
    Delete(MigrationKey),
}

enum StepFailure {
    Statement {
        step: usize,
        sql: String,
        source: DbError,
    },
    Record(DbError),
    Lock(LockError),
}

/// Applies and reverts the migrations of a registry against one database.
pub struct Migrator<'a, D: Database> {
    registry: &'a MigrationRegistry,
    backend: &'a dyn Backend,
    db: D,
    config: MigratorConfig,
}

impl<'a, D: Database> Migrator<'a, D> {
    pub fn new(registry: &'a MigrationRegistry, backend: &'a dyn Backend, db: D) -> Self {
        Self {
            registry,
            backend,
            db,
            config: MigratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MigratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn into_db(self) -> D {
        self.db
    }

    pub fn ensure_history_table(&mut self) -> Result<(), MigrationError> {
        self.db.ensure_table()?;
        Ok(())
    }

    pub fn applied_keys(&mut self) -> Result<Vec<MigrationKey>, MigrationError> {
        Ok(self.db.applied()?.into_iter().map(|row| row.key).collect())
    }

    /// Registered migrations without a history row, ascending by key.
    pub fn pending(&mut self) -> Result<Vec<&'a Migration>, MigrationError> {
        let applied = self.db.applied()?;
        Ok(pending_migrations(self.registry, &applied))
    }

    pub fn apply_pending(&mut self) -> Result<Vec<MigrationKey>, MigrationError> {
        self.apply_pending_with_progress(|_, _, _| {})
    }

    /// Applies every pending migration in key order under the migration lock.
    ///
    /// `progress` is called before each migration with its index among the
    /// pending migrations and their count. The run stops at the first failure;
    /// migrations committed before it stay applied and are listed in the error.
    pub fn apply_pending_with_progress<F>(
        &mut self,
        mut progress: F,
    ) -> Result<Vec<MigrationKey>, MigrationError>
    where
        F: FnMut(&Migration, usize, usize),
    {
        let mut guard = lock_database(&mut self.db, &self.config)?;
        let result = (|| -> Result<Vec<MigrationKey>, MigrationError> {
            let db = &mut *guard;
            db.ensure_table()?;
            let applied = db.applied()?;
            if self.config.checksum_policy == ChecksumPolicy::Strict {
                check_strict(self.registry, &applied)?;
            }

            let pending = pending_migrations(self.registry, &applied);
            let total = pending.len();
            let mut completed = Vec::with_capacity(total);
            for (index, migration) in pending.into_iter().enumerate() {
                progress(migration, index, total);
                execute_migration(&mut guard, self.backend, migration, Direction::Up)
                    .map_err(|e| e.with_completed(&completed))?;
                completed.push(migration.key);
            }
            if completed.is_empty() {
                tracing::info!("no pending migrations");
            }
            Ok(completed)
        })();
        release(guard, result)
    }

    pub fn apply_single(&mut self, key: MigrationKey) -> Result<(), MigrationError> {
        let migration = self
            .registry
            .get(key)
            .ok_or(MigrationError::NotFound(key))?;

        let mut guard = lock_database(&mut self.db, &self.config)?;
        let result = (|| -> Result<(), MigrationError> {
            let db = &mut *guard;
            db.ensure_table()?;
            let applied = db.applied()?;
            if applied.iter().any(|row| row.key == key) {
                return Err(MigrationError::AlreadyApplied(key));
            }
            if self.config.checksum_policy == ChecksumPolicy::Strict {
                check_strict(self.registry, &applied)?;
            }
            execute_migration(&mut guard, self.backend, migration, Direction::Up)
        })();
        release(guard, result)
    }

    pub fn revert_single(&mut self, key: MigrationKey) -> Result<(), MigrationError> {
        let migration = self
            .registry
            .get(key)
            .ok_or(MigrationError::NotFound(key))?;

        let mut guard = lock_database(&mut self.db, &self.config)?;
        let result = (|| -> Result<(), MigrationError> {
            let db = &mut *guard;
            if !db.applied()?.iter().any(|row| row.key == key) {
                return Err(MigrationError::NotApplied(key));
            }
            execute_migration(&mut guard, self.backend, migration, Direction::Down)
        })();
        release(guard, result)
    }

    /// Reverts applied migrations with keys greater than `target`, newest first.
    ///
    /// Only lock and history failures are returned as errors; a migration that
    /// cannot be reverted stops the run and is reported in the result.
    pub fn revert_to(&mut self, target: MigrationKey) -> Result<RevertResult, MigrationError> {
        self.revert_where(|key| key > target)
    }

    pub fn revert_all(&mut self) -> Result<RevertResult, MigrationError> {
        self.revert_where(|_| true)
    }

    fn revert_where<P>(&mut self, select: P) -> Result<RevertResult, MigrationError>
    where
        P: Fn(MigrationKey) -> bool,
    {
        let mut guard = lock_database(&mut self.db, &self.config)?;
        let result = (|| -> Result<RevertResult, MigrationError> {
            let db = &mut *guard;
            let targets: Vec<MigrationKey> = db
                .applied()?
                .into_iter()
                .rev()
                .map(|row| row.key)
                .filter(|key| select(*key))
                .collect();

            let mut outcome = RevertResult::default();
            for key in targets {
                let reverted = match self.registry.get(key) {
                    Some(migration) => {
                        execute_migration(&mut guard, self.backend, migration, Direction::Down)
                    }
                    None => Err(MigrationError::NotFound(key)),
                };
                match reverted {
                    Ok(()) => outcome.reverted.push(key),
                    Err(error) => {
                        tracing::error!(key = %key, error = %error, "revert stopped");
                        outcome.failed_at = Some(key);
                        outcome.error = Some(error);
                        break;
                    }
                }
            }
            Ok(outcome)
        })();
        release(guard, result)
    }

    /// Statements the up plan of `key` compiles to.
    pub fn preview_migration(&self, key: MigrationKey) -> Result<Vec<Statement>, MigrationError> {
        self.registry
            .get(key)
            .ok_or(MigrationError::NotFound(key))?
            .up_statements(self.backend)
    }

    /// Statements `apply_pending` would run. Creates nothing and takes no lock.
    pub fn preview_pending(&mut self) -> Result<Vec<MigrationPreview>, MigrationError> {
        let applied = self.db.applied()?;
        pending_migrations(self.registry, &applied)
            .into_iter()
            .map(|migration| {
                Ok(MigrationPreview {
                    key: migration.key,
                    title: migration.title.clone(),
                    statements: migration.up_statements(self.backend)?,
                })
            })
            .collect()
    }

    /// Statements `revert_to(target)` would run, newest migration first.
    pub fn preview_revert_to(
        &mut self,
        target: MigrationKey,
    ) -> Result<Vec<MigrationPreview>, MigrationError> {
        let applied = self.db.applied()?;
        applied
            .iter()
            .rev()
            .filter(|row| row.key > target)
            .map(|row| {
                let migration = self
                    .registry
                    .get(row.key)
                    .ok_or(MigrationError::NotFound(row.key))?;
                Ok(MigrationPreview {
                    key: migration.key,
                    title: migration.title.clone(),
                    statements: migration.down_statements(self.backend)?,
                })
            })
            .collect()
    }

    /// Compares stored checksums of applied, registered migrations with the
    /// current ones. Rows without a stored checksum count as matching.
    pub fn verify_checksums(&mut self) -> Result<Vec<ChecksumVerification>, MigrationError> {
        let applied = self.db.applied()?;
        verify(self.registry, &applied)
    }

    /// Records `key` as applied without running it.
    pub fn mark_applied(&mut self, key: MigrationKey) -> Result<(), MigrationError> {
        let migration = self
            .registry
            .get(key)
            .ok_or(MigrationError::NotFound(key))?;
        let checksum = migration
            .checksum()
            .map_err(|source| MigrationError::Plan { key, source })?;

        let mut guard = lock_database(&mut self.db, &self.config)?;
        let result = (|| -> Result<(), MigrationError> {
            let db = &mut *guard;
            db.ensure_table()?;
            if db.applied()?.iter().any(|row| row.key == key) {
                return Err(MigrationError::AlreadyApplied(key));
            }
            db.insert(&HistoryRow {
                key,
                title: migration.title.clone(),
                checksum: Some(checksum),
                applied_at: Utc::now(),
            })?;
            tracing::info!(key = %key, title = %migration.title, "marked migration as applied");
            Ok(())
        })();
        release(guard, result)
    }

    pub fn status(&mut self) -> Result<MigrationStatus, MigrationError> {
        let applied = self.db.applied()?;
        let applied_keys: BTreeSet<MigrationKey> = applied.iter().map(|row| row.key).collect();

        let unknown: Vec<MigrationKey> = applied_keys
            .iter()
            .copied()
            .filter(|key| !self.registry.contains(*key))
            .collect();
        let mismatched = verify(self.registry, &applied)?
            .iter()
            .filter(|v| !v.matches)
            .count();

        Ok(MigrationStatus {
            applied: applied_keys.len() - unknown.len(),
            pending: pending_migrations(self.registry, &applied).len(),
            mismatched,
            unknown_applied: unknown.len(),
            total: self.registry.len(),
            unknown,
        })
    }

    /// Clears the migration lock whoever holds it, e.g. after a crashed run.
    pub fn force_unlock(&mut self) -> Result<(), MigrationError> {
        tracing::warn!(lock = %self.config.lock_name, "forcing migration lock release");
        self.db
            .force_release_lock(&self.config.lock_name)
            .map_err(|e| MigrationError::LockAcquisitionFailed(LockError::Database(e)))
    }
}

fn lock_database<'d, D: Database>(
    db: &'d mut D,
    config: &MigratorConfig,
) -> Result<LockGuard<'d, D>, MigrationError> {
    let request = LockRequest {
        name: &config.lock_name,
        owner: &config.owner,
        stale_after: config.stale_lock_after,
    };
    Ok(acquire_lock(db, &request, config.lock_policy)?)
}

fn release<D: Database, T>(
    guard: LockGuard<'_, D>,
    result: Result<T, MigrationError>,
) -> Result<T, MigrationError> {
    // Release errors never replace the result of the work done under the lock.
    if let Err(e) = guard.release() {
        tracing::warn!(error = %e, "failed to release migration lock");
    }
    result
}

fn pending_migrations<'r>(
    registry: &'r MigrationRegistry,
    applied: &[HistoryRow],
) -> Vec<&'r Migration> {
    let applied: BTreeSet<MigrationKey> = applied.iter().map(|row| row.key).collect();
    registry
        .all()
        .filter(|migration| !applied.contains(&migration.key))
        .collect()
}

fn verify(
    registry: &MigrationRegistry,
    applied: &[HistoryRow],
) -> Result<Vec<ChecksumVerification>, MigrationError> {
    let mut results = Vec::new();
    for row in applied {
        let Some(migration) = registry.get(row.key) else {
            continue;
        };
        let computed = migration.checksum().map_err(|source| MigrationError::Plan {
            key: row.key,
            source,
        })?;
        let matches = match row.checksum.as_deref() {
            None | Some("") => true,
            Some(stored) => stored == computed,
        };
        if !matches {
            tracing::warn!(
                key = %row.key,
                title = %migration.title,
                "checksum mismatch: applied migration has changed since it ran"
            );
        }
        results.push(ChecksumVerification {
            key: row.key,
            title: migration.title.clone(),
            stored: row.checksum.clone(),
            computed,
            matches,
        });
    }
    Ok(results)
}

fn check_strict(registry: &MigrationRegistry, applied: &[HistoryRow]) -> Result<(), MigrationError> {
    let mismatched: Vec<MigrationKey> = verify(registry, applied)?
        .into_iter()
        .filter(|v| !v.matches)
        .map(|v| v.key)
        .collect();
    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch(mismatched))
    }
}

/// Runs one migration in one direction, bookkeeping included.
///
/// The plan is compiled in full before anything executes. The migration runs
/// in a transaction when the dialect has transactional DDL, the migration is
/// atomic and its plan carries no transaction markers of its own. The lock is
/// refreshed before the migration and before every statement.
fn execute_migration<D: Database>(
    guard: &mut LockGuard<'_, D>,
    backend: &dyn Backend,
    migration: &Migration,
    direction: Direction,
) -> Result<(), MigrationError> {
    let key = migration.key;
    let started = Instant::now();

    let plan = match direction {
        Direction::Up => migration
            .build_up()
            .map_err(|source| MigrationError::Plan { key, source })?,
        Direction::Down => migration
            .build_down()
            .map_err(|source| MigrationError::Plan { key, source })?
            .ok_or_else(|| MigrationError::DownNotImplemented {
                key,
                title: migration.title.clone(),
            })?,
    };
    let statements = plan
        .compile(backend)
        .map_err(|source| MigrationError::Compile { key, source })?;

    let record = match direction {
        Direction::Up => Record::Insert(HistoryRow {
            key,
            title: migration.title.clone(),
            checksum: Some(
                migration
                    .checksum()
                    .map_err(|source| MigrationError::Plan { key, source })?,
            ),
            applied_at: Utc::now(),
        }),
        Direction::Down => Record::Delete(key),
    };

    if !backend.supports_transactional_ddl() {
        tracing::warn!(
            key = %key,
            dialect = backend.name(),
            "dialect commits DDL implicitly; migration is not atomic"
        );
    }
    let transactional = backend.supports_transactional_ddl()
        && migration.is_atomic()
        && !plan.has_transaction_markers();

    let failed = |step: Option<usize>, sql: Option<String>, source: DbError| {
        MigrationError::ExecutionFailed {
            key,
            title: migration.title.clone(),
            step,
            sql,
            source,
            completed: Vec::new(),
        }
    };

    guard.refresh()?;
    if transactional {
        guard.begin().map_err(|e| failed(None, None, e))?;
    }

    if let Err(failure) = run_steps(guard, &statements, &record) {
        if transactional {
            rollback_quietly(&mut **guard, key);
        }
        let error = match failure {
            StepFailure::Statement { step, sql, source } => failed(Some(step), Some(sql), source),
            StepFailure::Record(source) => failed(None, None, source),
            StepFailure::Lock(e) => MigrationError::LockAcquisitionFailed(e),
        };
        tracing::error!(key = %key, title = %migration.title, error = %error, "migration failed");
        return Err(error);
    }

    if transactional {
        if let Err(e) = guard.commit() {
            rollback_quietly(&mut **guard, key);
            return Err(failed(None, None, e));
        }
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match direction {
        Direction::Up => {
            tracing::info!(key = %key, title = %migration.title, elapsed_ms, "applied migration")
        }
        Direction::Down => {
            tracing::info!(key = %key, title = %migration.title, elapsed_ms, "reverted migration")
        }
    }
    Ok(())
}

fn run_steps<D: Database>(
    guard: &mut LockGuard<'_, D>,
    statements: &[Statement],
    record: &Record,
) -> Result<(), StepFailure> {
    for (step, statement) in statements.iter().enumerate() {
        guard.refresh().map_err(StepFailure::Lock)?;
        run_statement(&mut **guard, statement).map_err(|source| StepFailure::Statement {
            step,
            sql: statement.sql.clone(),
            source,
        })?;
    }

    let recorded = match record {
        Record::Insert(row) => guard.insert(row),
        Record::Delete(key) => guard.delete(*key),
    };
    recorded.map_err(StepFailure::Record)
}

fn rollback_quietly<D: Database>(db: &mut D, key: MigrationKey) {
    if let Err(e) = db.rollback() {
        tracing::warn!(key = %key, error = %e, "rollback failed");
    }
}
