use crate::error::DbError;
use crate::statement::{SchemaProbe, Statement};

/// The database client a migrator drives.
pub trait Connection {
    fn execute(&mut self, sql: &str) -> Result<(), DbError>;
    fn begin(&mut self) -> Result<(), DbError>;
    fn commit(&mut self) -> Result<(), DbError>;
    fn rollback(&mut self) -> Result<(), DbError>;

    /// Catalog lookup used to evaluate statement guards.
    fn object_exists(&mut self, probe: &SchemaProbe) -> Result<bool, DbError>;
}

/// Executes a compiled statement, evaluating its guard first.
/// Returns `false` when the guard skipped the statement.
pub(crate) fn run_statement<C>(conn: &mut C, statement: &Statement) -> Result<bool, DbError>
where
    C: Connection + ?Sized,
{
    if let Some(ref guard) = statement.guard {
        if conn.object_exists(&guard.probe)? != guard.run_if_present {
            tracing::debug!(probe = %guard.probe, sql = %statement.sql, "guard skipped statement");
            return Ok(false);
        }
    }
    tracing::debug!(sql = %statement.sql, "executing statement");
    conn.execute(&statement.sql)?;
    Ok(true)
}
