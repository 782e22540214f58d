mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "mysql")]
mod mysql;

pub use memory::InMemoryDatabase;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresDatabase;

#[cfg(feature = "mysql")]
pub use self::mysql::MySqlDatabase;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::DbError;
use crate::lock::MigrationLock;
use crate::migration::MigrationKey;

pub const DEFAULT_TABLE_NAME: &str = "schema_migrations";

/// One applied migration as recorded in the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub key: MigrationKey,
    pub title: String,
    /// `None` for rows written before checksums were recorded.
    pub checksum: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// Record mapping for the history table.
pub trait MigrationStateStore {
    fn ensure_table(&mut self) -> Result<(), DbError>;
    /// Rows ordered by key; empty if the table does not exist yet.
    fn applied(&mut self) -> Result<Vec<HistoryRow>, DbError>;
    fn insert(&mut self, row: &HistoryRow) -> Result<(), DbError>;
    fn delete(&mut self, key: MigrationKey) -> Result<(), DbError>;
}

/// Everything a migrator needs from the database.
pub trait Database: Connection + MigrationStateStore + MigrationLock {}

impl<T: Connection + MigrationStateStore + MigrationLock> Database for T {}

#[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
pub(crate) fn parse_stored_key(value: &str) -> Result<MigrationKey, DbError> {
    value
        .parse()
        .map_err(|e: crate::migration::ParseKeyError| DbError::new(e.to_string()))
}

#[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
pub(crate) fn parse_stored_time(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DbError::new(format!("invalid applied_at '{}': {}", value, e)))
}

#[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
pub(crate) fn format_stored_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
