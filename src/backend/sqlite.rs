use sea_query::{
    DeleteStatement, IndexCreateStatement, IndexDropStatement, InsertStatement, SqliteQueryBuilder,
    TableAlterStatement, TableCreateStatement, TableDropStatement, TableRenameStatement,
    UpdateStatement,
};

use crate::backend::{AlterColumnStrategy, Backend};
use crate::error::CompileError;
use crate::operation::TableName;
use crate::statement::Statement;

/// SQLite. Column changes are emulated by copying into a replacement column;
/// foreign keys can only be declared when a table or column is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Backend for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn alter_column_strategy(&self) -> AlterColumnStrategy {
        AlterColumnStrategy::Rebuild
    }

    fn supports_foreign_key_alter(&self) -> bool {
        false
    }

    fn supports_constrained_column_add(&self) -> bool {
        false
    }

    fn begin_transaction_sql(&self) -> &'static str {
        "BEGIN TRANSACTION"
    }

    fn build_table_create(&self, stmt: TableCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_table_drop(&self, stmt: TableDropStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_table_rename(&self, stmt: TableRenameStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_table_alter(&self, stmt: TableAlterStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_index_create(&self, stmt: IndexCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_index_drop(&self, stmt: IndexDropStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_insert(&self, stmt: InsertStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_update(&self, stmt: UpdateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_delete(&self, stmt: DeleteStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn drop_foreign_key_sql(
        &self,
        table: &TableName,
        name: &str,
        _if_exists: bool,
    ) -> Result<Vec<Statement>, CompileError> {
        Err(CompileError::unsupported(
            self.name(),
            format!("dropping foreign key {} from existing table {}", name, table),
        ))
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
