use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::backend::Backend;
use crate::error::{MigrationError, PlanError};
use crate::plan::MigrationPlan;
use crate::statement::Statement;

/// Ordering key of a migration, conventionally a `YYYYMMDDHHMMSS` timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationKey(u64);

impl MigrationKey {
    /// Largest key that fits the 14 digit stored form.
    pub const MAX: MigrationKey = MigrationKey(99_999_999_999_999);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn is_valid(self) -> bool {
        self <= Self::MAX
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let date = at.year().max(0) as u64 * 10_000 + at.month() as u64 * 100 + at.day() as u64;
        let time = at.hour() as u64 * 10_000 + at.minute() as u64 * 100 + at.second() as u64;
        Self(date * 1_000_000 + time)
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for MigrationKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for MigrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:014}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid migration key '{0}': expected 1 to 14 decimal digits")]
pub struct ParseKeyError(String);

impl FromStr for MigrationKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseKeyError(s.to_string()));
        }
        s.parse()
            .map(MigrationKey)
            .map_err(|_| ParseKeyError(s.to_string()))
    }
}

type PlanBuilder = Box<dyn Fn(&mut MigrationPlan) -> Result<(), PlanError> + Send + Sync>;

/// A versioned unit of schema change.
///
/// The up and down procedures run each time their plan is needed; they must
/// describe the same plan on every call for the checksum to stay stable.
pub struct Migration {
    pub key: MigrationKey,
    pub title: String,
    up: Option<PlanBuilder>,
    down: Option<PlanBuilder>,
    atomic: bool,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("key", &self.key)
            .field("title", &self.title)
            .field("explicit_down", &self.down.is_some())
            .field("atomic", &self.atomic)
            .finish()
    }
}

impl Migration {
    pub fn new(key: u64, title: impl Into<String>) -> Self {
        Self {
            key: MigrationKey::new(key),
            title: title.into(),
            up: None,
            down: None,
            atomic: true,
        }
    }

    pub fn up<F>(mut self, build: F) -> Self
    where
        F: Fn(&mut MigrationPlan) -> Result<(), PlanError> + Send + Sync + 'static,
    {
        self.up = Some(Box::new(build));
        self
    }

    /// Explicit down plan. Without one, the down plan is derived from the up
    /// plan when every element is invertible.
    pub fn down<F>(mut self, build: F) -> Self
    where
        F: Fn(&mut MigrationPlan) -> Result<(), PlanError> + Send + Sync + 'static,
    {
        self.down = Some(Box::new(build));
        self
    }

    /// Set whether this migration should run inside a transaction.
    /// Defaults to `true`. Set to `false` for statements that cannot run in
    /// transactions (e.g. `CREATE INDEX CONCURRENTLY` in PostgreSQL).
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn has_explicit_down(&self) -> bool {
        self.down.is_some()
    }

    pub fn build_up(&self) -> Result<MigrationPlan, PlanError> {
        let mut plan = MigrationPlan::new();
        if let Some(ref up) = self.up {
            up(&mut plan)?;
        }
        Ok(plan)
    }

    fn build_explicit_down(&self) -> Result<Option<MigrationPlan>, PlanError> {
        match self.down {
            Some(ref down) => {
                let mut plan = MigrationPlan::new();
                down(&mut plan)?;
                Ok(Some(plan))
            }
            None => Ok(None),
        }
    }

    /// The down plan, explicit or derived. `None` if neither is available.
    pub fn build_down(&self) -> Result<Option<MigrationPlan>, PlanError> {
        match self.build_explicit_down()? {
            Some(plan) => Ok(Some(plan)),
            None => Ok(self.build_up()?.inverse()),
        }
    }

    pub fn is_reversible(&self) -> Result<bool, PlanError> {
        Ok(self.build_down()?.is_some())
    }

    /// SHA-256 over the canonical encoding of the up plan and the explicit
    /// down plan. Independent of dialect, title and registration order.
    pub fn checksum(&self) -> Result<String, PlanError> {
        #[derive(Serialize)]
        struct ChecksumInput<'p> {
            up: &'p MigrationPlan,
            down: Option<&'p MigrationPlan>,
        }

        let up = self.build_up()?;
        let down = self.build_explicit_down()?;
        let encoded = serde_json::to_vec(&ChecksumInput {
            up: &up,
            down: down.as_ref(),
        })
        .map_err(|e| PlanError::Invalid(format!("cannot encode plan: {}", e)))?;

        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    pub fn up_statements(&self, backend: &dyn Backend) -> Result<Vec<Statement>, MigrationError> {
        let plan = self.build_up().map_err(|source| MigrationError::Plan {
            key: self.key,
            source,
        })?;
        plan.compile(backend).map_err(|source| MigrationError::Compile {
            key: self.key,
            source,
        })
    }

    pub fn down_statements(
        &self,
        backend: &dyn Backend,
    ) -> Result<Vec<Statement>, MigrationError> {
        let plan = self
            .build_down()
            .map_err(|source| MigrationError::Plan {
                key: self.key,
                source,
            })?
            .ok_or_else(|| MigrationError::DownNotImplemented {
                key: self.key,
                title: self.title.clone(),
            })?;
        plan.compile(backend).map_err(|source| MigrationError::Compile {
            key: self.key,
            source,
        })
    }
}

/// Something that contributes migrations, e.g. a plugin.
pub trait MigrationSource {
    fn migrations(&self) -> Vec<Migration>;
}

/// Registered migrations, ordered by key.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<MigrationKey, Migration>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration after checking its plans build.
    pub fn register(&mut self, migration: Migration) -> Result<(), MigrationError> {
        if let Some(existing) = self.migrations.get(&migration.key) {
            return Err(MigrationError::RegistrationConflict {
                key: migration.key,
                title: migration.title,
                existing: existing.title.clone(),
            });
        }

        let key = migration.key;
        if !key.is_valid() {
            return Err(MigrationError::InvalidKey(key));
        }
        migration
            .build_down()
            .and_then(|_| migration.checksum())
            .map_err(|source| MigrationError::Plan { key, source })?;

        tracing::debug!(key = %key, title = %migration.title, "registered migration");
        self.migrations.insert(key, migration);
        Ok(())
    }

    pub fn register_source(&mut self, source: &dyn MigrationSource) -> Result<(), MigrationError> {
        for migration in source.migrations() {
            self.register(migration)?;
        }
        Ok(())
    }

    pub fn get(&self, key: MigrationKey) -> Option<&Migration> {
        self.migrations.get(&key)
    }

    pub fn contains(&self, key: MigrationKey) -> bool {
        self.migrations.contains_key(&key)
    }

    /// All migrations, ascending by key.
    pub fn all(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = MigrationKey> + '_ {
        self.migrations.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn clear(&mut self) {
        self.migrations.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::backend::Sqlite;
    use crate::field::{Field, FieldType};
    use crate::operation::{CreateTable, DropTable, InsertData, RawSql};

    fn create_users(plan: &mut MigrationPlan) -> Result<(), PlanError> {
        plan.create_table(
            CreateTable::new("users")
                .add_field(Field::new("id", FieldType::Serial).primary_key())
                .add_field(Field::new("name", FieldType::Text).required()),
        );
        Ok(())
    }

    #[test]
    fn key_renders_fixed_width() {
        assert_eq!(MigrationKey::new(20240101000000).to_string(), "20240101000000");
        assert_eq!(MigrationKey::new(1).to_string(), "00000000000001");
    }

    #[test]
    fn key_parses_its_rendering() {
        let key: MigrationKey = "20240315123000".parse().unwrap();
        assert_eq!(key, MigrationKey::new(20240315123000));
        assert_eq!(key.to_string().parse::<MigrationKey>().unwrap(), key);

        assert!("2024-03-15".parse::<MigrationKey>().is_err());
        assert!("".parse::<MigrationKey>().is_err());
        assert!("202403151230001".parse::<MigrationKey>().is_err());
    }

    #[test]
    fn key_from_datetime() {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 5).unwrap();
        assert_eq!(
            MigrationKey::from_datetime(at),
            MigrationKey::new(20240315123005)
        );
    }

    #[test]
    fn migration_derives_down_from_up() {
        let migration = Migration::new(20240101000000, "create users").up(create_users);

        assert!(migration.is_reversible().unwrap());
        let down = migration.down_statements(&Sqlite).unwrap();
        assert_eq!(down.len(), 1);
        assert!(down[0].sql.contains("DROP TABLE \"users\""));
    }

    #[test]
    fn explicit_down_wins_over_derived() {
        let migration = Migration::new(20240101000000, "copy users")
            .up(|plan| {
                plan.raw_sql(RawSql::new("INSERT INTO archive SELECT * FROM users"))
                    .drop_table(DropTable::new("users"));
                Ok(())
            })
            .down(|plan| {
                create_users(plan)?;
                plan.raw_sql(RawSql::new("INSERT INTO users SELECT * FROM archive"));
                Ok(())
            });

        let down = migration.down_statements(&Sqlite).unwrap();
        assert_eq!(down.len(), 2);
        assert!(down[0].sql.contains("CREATE TABLE \"users\""));
        assert!(down[1].sql.contains("INSERT INTO users"));
    }

    #[test]
    fn irreversible_migration_has_no_down() {
        let migration = Migration::new(20240101000000, "seed").up(|plan| {
            plan.insert(InsertData::new("users").set("name", "root"));
            Ok(())
        });

        assert!(!migration.is_reversible().unwrap());
        assert!(matches!(
            migration.down_statements(&Sqlite),
            Err(MigrationError::DownNotImplemented { .. })
        ));
    }

    #[test]
    fn checksum_is_stable_and_ignores_title() {
        let a = Migration::new(20240101000000, "create users").up(create_users);
        let b = Migration::new(20240101000000, "users table").up(create_users);

        let checksum = a.checksum().unwrap();
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, a.checksum().unwrap());
        assert_eq!(checksum, b.checksum().unwrap());
    }

    #[test]
    fn checksum_detects_edits() {
        let original = Migration::new(20240101000000, "create users").up(create_users);
        let edited = Migration::new(20240101000000, "create users").up(|plan| {
            create_users(plan)?;
            plan.insert(InsertData::new("users").set("name", "root"));
            Ok(())
        });
        let with_down = Migration::new(20240101000000, "create users")
            .up(create_users)
            .down(|plan| {
                plan.drop_table(DropTable::new("users"));
                Ok(())
            });

        let checksum = original.checksum().unwrap();
        assert_ne!(checksum, edited.checksum().unwrap());
        assert_ne!(checksum, with_down.checksum().unwrap());
    }

    #[test]
    fn migration_debug() {
        let migration = Migration::new(20240101000000, "create users")
            .up(create_users)
            .atomic(false);

        let debug = format!("{:?}", migration);
        assert!(debug.contains("create users"));
        assert!(debug.contains("atomic: false"));
    }

    #[test]
    fn migration_atomic_default_true() {
        assert!(Migration::new(1, "test").is_atomic());
        assert!(!Migration::new(1, "test").atomic(false).is_atomic());
    }

    #[test]
    fn registry_orders_by_key() {
        let mut registry = MigrationRegistry::new();
        registry.register(Migration::new(20240103000000, "c")).unwrap();
        registry.register(Migration::new(20240101000000, "a")).unwrap();
        registry.register(Migration::new(20240102000000, "b")).unwrap();

        let titles: Vec<_> = registry.all().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn registry_rejects_duplicate_key() {
        let mut registry = MigrationRegistry::new();
        registry.register(Migration::new(20240101000000, "first")).unwrap();

        let err = registry
            .register(Migration::new(20240101000000, "second"))
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::RegistrationConflict { ref existing, .. } if existing == "first"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_rejects_broken_plan() {
        let mut registry = MigrationRegistry::new();
        let err = registry
            .register(Migration::new(20240101000000, "broken").up(|_| {
                Err(PlanError::Invalid("missing column".to_string()))
            }))
            .unwrap_err();

        assert!(matches!(err, MigrationError::Plan { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_rejects_keys_wider_than_stored_form() {
        let mut registry = MigrationRegistry::new();
        let err = registry
            .register(Migration::new(100_000_000_000_000, "too wide").up(create_users))
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidKey(key) if key.value() == 100_000_000_000_000));
        assert!(registry.is_empty());

        registry
            .register(Migration::new(99_999_999_999_999, "widest").up(create_users))
            .unwrap();
        let stored = MigrationKey::MAX.to_string();
        assert_eq!(stored.len(), 14);
        assert_eq!(stored.parse::<MigrationKey>().unwrap(), MigrationKey::MAX);
    }

    #[test]
    fn registry_get_and_clear() {
        let mut registry = MigrationRegistry::new();
        registry.register(Migration::new(20240101000000, "a")).unwrap();

        assert!(registry.get(MigrationKey::new(20240101000000)).is_some());
        assert!(registry.get(MigrationKey::new(20240102000000)).is_none());

        registry.clear();
        assert!(registry.is_empty());
    }

    struct Plugin;

    impl MigrationSource for Plugin {
        fn migrations(&self) -> Vec<Migration> {
            vec![
                Migration::new(20240201000000, "plugin tables").up(create_users),
                Migration::new(20240202000000, "plugin seed"),
            ]
        }
    }

    #[test]
    fn registry_accepts_sources() {
        let mut registry = MigrationRegistry::new();
        registry.register_source(&Plugin).unwrap();

        let keys: Vec<_> = registry.keys().collect();
        assert_eq!(
            keys,
            vec![MigrationKey::new(20240201000000), MigrationKey::new(20240202000000)]
        );
        assert!(registry.register_source(&Plugin).is_err());
    }
}
