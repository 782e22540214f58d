use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::connection::Connection;
use crate::error::DbError;
use crate::lock::{LockRequest, MigrationLock};
use crate::migration::MigrationKey;
use crate::state::{
    format_stored_time, parse_stored_key, parse_stored_time, HistoryRow, MigrationStateStore,
    DEFAULT_TABLE_NAME,
};
use crate::statement::SchemaProbe;

const LOCK_TABLE_NAME: &str = "_migration_locks";

/// SQLite through `rusqlite`. The migration lock is a row in `_migration_locks`.
pub struct SqliteDatabase<'a> {
    conn: &'a rusqlite::Connection,
    table_name: String,
}

impl<'a> SqliteDatabase<'a> {
    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self::with_table_name(conn, DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(conn: &'a rusqlite::Connection, table_name: &str) -> Self {
        Self {
            conn,
            table_name: table_name.to_string(),
        }
    }

    fn quoted_table(&self) -> String {
        quote(&self.table_name)
    }

    fn table_exists(&self, schema: Option<&str>, name: &str) -> Result<bool, DbError> {
        let master = match schema {
            Some(schema) => format!("{}.sqlite_master", quote(schema)),
            None => "sqlite_master".to_string(),
        };
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE type = 'table' AND name = ?1",
                master
            ),
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ensure_lock_table(&self) -> Result<(), DbError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                lock_name TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            )",
            LOCK_TABLE_NAME
        ))?;
        Ok(())
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Connection for SqliteDatabase<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn object_exists(&mut self, probe: &SchemaProbe) -> Result<bool, DbError> {
        match probe {
            SchemaProbe::Table(table) => self.table_exists(table.schema.as_deref(), &table.name),
            SchemaProbe::Column { table, column } => {
                let count: i64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
                    params![table.name, column],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            }
            SchemaProbe::Index { name, .. } => {
                let count: i64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
                    [name],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            }
            SchemaProbe::ForeignKey { table, name } => Err(DbError::new(format!(
                "SQLite does not record foreign key names; cannot probe {} on {}",
                name, table
            ))),
        }
    }
}

impl MigrationStateStore for SqliteDatabase<'_> {
    fn ensure_table(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                ordering_key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                checksum TEXT,
                applied_at TEXT NOT NULL
            )",
            self.quoted_table()
        ))?;
        Ok(())
    }

    fn applied(&mut self) -> Result<Vec<HistoryRow>, DbError> {
        if !self.table_exists(None, &self.table_name)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT ordering_key, title, checksum, applied_at FROM {} ORDER BY ordering_key",
            self.quoted_table()
        ))?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(key, title, checksum, applied_at)| {
                Ok(HistoryRow {
                    key: parse_stored_key(&key)?,
                    title,
                    checksum,
                    applied_at: parse_stored_time(&applied_at)?,
                })
            })
            .collect()
    }

    fn insert(&mut self, row: &HistoryRow) -> Result<(), DbError> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (ordering_key, title, checksum, applied_at) VALUES (?1, ?2, ?3, ?4)",
                self.quoted_table()
            ),
            params![
                row.key.to_string(),
                row.title,
                row.checksum,
                format_stored_time(&row.applied_at)
            ],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: MigrationKey) -> Result<(), DbError> {
        self.conn.execute(
            &format!("DELETE FROM {} WHERE ordering_key = ?1", self.quoted_table()),
            [key.to_string()],
        )?;
        Ok(())
    }
}

impl MigrationLock for SqliteDatabase<'_> {
    fn try_acquire_lock(&mut self, request: &LockRequest<'_>) -> Result<bool, DbError> {
        self.ensure_lock_table()?;

        if let Some(after) = request.stale_after {
            let after = chrono::Duration::from_std(after)
                .map_err(|e| DbError::new(format!("invalid stale lock age: {}", e)))?;
            let cutoff = format_stored_time(&(Utc::now() - after));
            let stale_owner: Option<String> = self
                .conn
                .query_row(
                    &format!(
                        "SELECT owner FROM {} WHERE lock_name = ?1 AND acquired_at < ?2",
                        LOCK_TABLE_NAME
                    ),
                    params![request.name, cutoff],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(previous_owner) = stale_owner {
                tracing::warn!(
                    lock = %request.name,
                    previous_owner = %previous_owner,
                    "reclaiming stale migration lock"
                );
                self.conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE lock_name = ?1 AND acquired_at < ?2",
                        LOCK_TABLE_NAME
                    ),
                    params![request.name, cutoff],
                )?;
            }
        }

        let inserted = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (lock_name, owner, acquired_at) VALUES (?1, ?2, ?3)",
                LOCK_TABLE_NAME
            ),
            params![request.name, request.owner, format_stored_time(&Utc::now())],
        )?;
        Ok(inserted == 1)
    }

    fn release_lock(&mut self, name: &str, owner: &str) -> Result<(), DbError> {
        self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE lock_name = ?1 AND owner = ?2",
                LOCK_TABLE_NAME
            ),
            params![name, owner],
        )?;
        Ok(())
    }

    fn refresh_lock(&mut self, name: &str, owner: &str) -> Result<bool, DbError> {
        self.ensure_lock_table()?;
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET acquired_at = ?1 WHERE lock_name = ?2 AND owner = ?3",
                LOCK_TABLE_NAME
            ),
            params![format_stored_time(&Utc::now()), name, owner],
        )?;
        Ok(updated == 1)
    }

    fn force_release_lock(&mut self, name: &str) -> Result<(), DbError> {
        self.ensure_lock_table()?;
        self.conn.execute(
            &format!("DELETE FROM {} WHERE lock_name = ?1", LOCK_TABLE_NAME),
            [name],
        )?;
        Ok(())
    }
}
