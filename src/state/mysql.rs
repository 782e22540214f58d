use mysql::prelude::*;
use mysql::PooledConn;

use crate::connection::Connection;
use crate::error::DbError;
use crate::lock::{LockRequest, MigrationLock};
use crate::migration::MigrationKey;
use crate::state::{
    format_stored_time, parse_stored_key, parse_stored_time, HistoryRow, MigrationStateStore,
    DEFAULT_TABLE_NAME,
};
use crate::statement::SchemaProbe;

/// MySQL through a pooled `mysql` connection.
///
/// DDL commits implicitly on MySQL, so transactions here only protect data
/// statements and the history row. The lock is a named `GET_LOCK` lock,
/// released when the session ends.
pub struct MySqlDatabase<'a> {
    conn: &'a mut PooledConn,
    table_name: String,
}

impl<'a> MySqlDatabase<'a> {
    pub fn new(conn: &'a mut PooledConn) -> Self {
        Self::with_table_name(conn, DEFAULT_TABLE_NAME)
    }

    pub fn with_table_name(conn: &'a mut PooledConn, table_name: &str) -> Self {
        Self {
            conn,
            table_name: table_name.to_string(),
        }
    }

    fn quoted_table(&self) -> String {
        format!("`{}`", self.table_name.replace('`', "``"))
    }

    fn count<P: Into<mysql::Params>>(&mut self, query: &str, params: P) -> Result<bool, DbError> {
        let count: Option<i64> = self.conn.exec_first(query, params)?;
        Ok(count.unwrap_or(0) > 0)
    }
}

impl Connection for MySqlDatabase<'_> {
    fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.query_drop(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("START TRANSACTION")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.conn.query_drop("ROLLBACK")?;
        Ok(())
    }

    fn object_exists(&mut self, probe: &SchemaProbe) -> Result<bool, DbError> {
        match probe {
            SchemaProbe::Table(table) => self.count(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?",
                (table.schema.clone(), table.name.clone()),
            ),
            SchemaProbe::Column { table, column } => self.count(
                "SELECT COUNT(*) FROM information_schema.columns \
                 WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ? AND column_name = ?",
                (table.schema.clone(), table.name.clone(), column.clone()),
            ),
            SchemaProbe::Index { table, name } => self.count(
                "SELECT COUNT(*) FROM information_schema.statistics \
                 WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ? AND index_name = ?",
                (table.schema.clone(), table.name.clone(), name.clone()),
            ),
            SchemaProbe::ForeignKey { table, name } => self.count(
                "SELECT COUNT(*) FROM information_schema.table_constraints \
                 WHERE constraint_type = 'FOREIGN KEY' AND table_schema = COALESCE(?, DATABASE()) \
                 AND table_name = ? AND constraint_name = ?",
                (table.schema.clone(), table.name.clone(), name.clone()),
            ),
        }
    }
}

impl MigrationStateStore for MySqlDatabase<'_> {
    fn ensure_table(&mut self) -> Result<(), DbError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                ordering_key VARCHAR(32) PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                checksum VARCHAR(64),
                applied_at VARCHAR(40) NOT NULL
            )",
            self.quoted_table()
        );
        self.conn.query_drop(sql)?;
        Ok(())
    }

    fn applied(&mut self) -> Result<Vec<HistoryRow>, DbError> {
        let table = self.table_name.clone();
        if !self.count(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?",
            (table,),
        )? {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, String, Option<String>, String)> = self.conn.query(format!(
            "SELECT ordering_key, title, checksum, applied_at FROM {} ORDER BY ordering_key",
            self.quoted_table()
        ))?;

        rows.into_iter()
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
        let sql = format!(
            "INSERT INTO {} (ordering_key, title, checksum, applied_at) VALUES (?, ?, ?, ?)",
            self.quoted_table()
        );
        self.conn.exec_drop(
            sql,
            (
                row.key.to_string(),
                row.title.clone(),
                row.checksum.clone(),
                format_stored_time(&row.applied_at),
            ),
        )?;
        Ok(())
    }

    fn delete(&mut self, key: MigrationKey) -> Result<(), DbError> {
        let sql = format!("DELETE FROM {} WHERE ordering_key = ?", self.quoted_table());
        self.conn.exec_drop(sql, (key.to_string(),))?;
        Ok(())
    }
}

impl MigrationLock for MySqlDatabase<'_> {
    fn try_acquire_lock(&mut self, request: &LockRequest<'_>) -> Result<bool, DbError> {
        let acquired: Option<Option<i64>> = self
            .conn
            .exec_first("SELECT GET_LOCK(?, 0)", (request.name,))?;
        Ok(acquired.flatten() == Some(1))
    }

    fn release_lock(&mut self, name: &str, _owner: &str) -> Result<(), DbError> {
        self.conn.exec_drop("SELECT RELEASE_LOCK(?)", (name,))?;
        Ok(())
    }

    /// Named locks belong to their session; releasing one held elsewhere is
    /// not possible, so this only clears the current session's hold.
    fn force_release_lock(&mut self, name: &str) -> Result<(), DbError> {
        tracing::warn!(lock = %name, "releasing named lock held by this session");
        self.conn.exec_drop("SELECT RELEASE_LOCK(?)", (name,))?;
        Ok(())
    }
}
