use postgres::Client;

use crate::connection::Connection;
use crate::error::DbError;
use crate::lock::{LockRequest, MigrationLock};
use crate::migration::MigrationKey;
use crate::state::{
    format_stored_time, parse_stored_key, parse_stored_time, HistoryRow, MigrationStateStore,
    DEFAULT_TABLE_NAME,
};
use crate::statement::SchemaProbe;

/// PostgreSQL through the synchronous `postgres` client.
///
/// The migration lock is a session advisory lock keyed by `hashtext(name)`;
/// it is released when the session ends, so crashed runs never leave it behind.
pub struct PostgresDatabase<'a> {
    client: &'a mut Client,
    table_name: String,
}

impl<'a> PostgresDatabase<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self::with_table_name(client, DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(client: &'a mut Client, table_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }

    fn quoted_table(&self) -> String {
        format!("\"{}\"", self.table_name.replace('"', "\"\""))
    }

    fn exists(
        &mut self,
        query: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<bool, DbError> {
        let row = self.client.query_one(query, params)?;
        Ok(row.get(0))
    }
}

impl Connection for PostgresDatabase<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.client.batch_execute(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.client.batch_execute("ROLLBACK")?;
        Ok(())
    }

    fn object_exists(&mut self, probe: &SchemaProbe) -> Result<bool, DbError> {
        match probe {
            SchemaProbe::Table(table) => self.exists(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = COALESCE($1::text, current_schema()::text) AND table_name = $2)",
                &[&table.schema, &table.name],
            ),
            SchemaProbe::Column { table, column } => self.exists(
                "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
                 WHERE table_schema = COALESCE($1::text, current_schema()::text) \
                 AND table_name = $2 AND column_name = $3)",
                &[&table.schema, &table.name, column],
            ),
            SchemaProbe::Index { table, name } => self.exists(
                "SELECT EXISTS (SELECT 1 FROM pg_indexes \
                 WHERE schemaname = COALESCE($1::text, current_schema()::text) AND indexname = $2)",
                &[&table.schema, name],
            ),
            SchemaProbe::ForeignKey { table, name } => self.exists(
                "SELECT EXISTS (SELECT 1 FROM information_schema.table_constraints \
                 WHERE constraint_type = 'FOREIGN KEY' \
                 AND table_schema = COALESCE($1::text, current_schema()::text) \
                 AND table_name = $2 AND constraint_name = $3)",
                &[&table.schema, &table.name, name],
            ),
        }
    }
}

impl MigrationStateStore for PostgresDatabase<'_> {
    fn ensure_table(&mut self) -> Result<(), DbError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                ordering_key TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                checksum TEXT,
                applied_at TEXT NOT NULL
            )",
            self.quoted_table()
        );
        self.client.batch_execute(&sql)?;
        Ok(())
    }

    fn applied(&mut self) -> Result<Vec<HistoryRow>, DbError> {
        let table = self.table_name.clone();
        if !self.exists("SELECT to_regclass($1) IS NOT NULL", &[&table])? {
            return Ok(Vec::new());
        }

        let rows = self.client.query(
            &format!(
                "SELECT ordering_key, title, checksum, applied_at FROM {} ORDER BY ordering_key",
                self.quoted_table()
            ),
            &[],
        )?;

        rows.iter()
            .map(|row| {
                Ok(HistoryRow {
                    key: parse_stored_key(row.get(0))?,
                    title: row.get(1),
                    checksum: row.get(2),
                    applied_at: parse_stored_time(row.get(3))?,
                })
            })
            .collect()
    }

    fn insert(&mut self, row: &HistoryRow) -> Result<(), DbError> {
        let sql = format!(
            "INSERT INTO {} (ordering_key, title, checksum, applied_at) VALUES ($1, $2, $3, $4)",
            self.quoted_table()
        );
        self.client.execute(
            &sql,
            &[
                &row.key.to_string(),
                &row.title,
                &row.checksum,
                &format_stored_time(&row.applied_at),
            ],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: MigrationKey) -> Result<(), DbError> {
        let sql = format!("DELETE FROM {} WHERE ordering_key = $1", self.quoted_table());
        self.client.execute(&sql, &[&key.to_string()])?;
        Ok(())
    }
}

impl MigrationLock for PostgresDatabase<'_> {
    fn try_acquire_lock(&mut self, request: &LockRequest<'_>) -> Result<bool, DbError> {
        self.exists(
            "SELECT pg_try_advisory_lock(hashtext($1)::bigint)",
            &[&request.name],
        )
    }

    fn release_lock(&mut self, name: &str, _owner: &str) -> Result<(), DbError> {
        self.client
            .execute("SELECT pg_advisory_unlock(hashtext($1)::bigint)", &[&name])?;
        Ok(())
    }

    /// Advisory locks belong to their session; this drops every advisory lock
    /// held by the current session. Locks held by other sessions end with them.
    fn force_release_lock(&mut self, name: &str) -> Result<(), DbError> {
        tracing::warn!(lock = %name, "releasing all advisory locks held by this session");
        self.client.batch_execute("SELECT pg_advisory_unlock_all()")?;
        Ok(())
    }
}
