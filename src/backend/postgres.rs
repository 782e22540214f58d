use sea_query::{
    DeleteStatement, IndexCreateStatement, IndexDropStatement, InsertStatement,
    PostgresQueryBuilder, TableAlterStatement, TableCreateStatement, TableDropStatement,
    TableRenameStatement, UpdateStatement,
};

use crate::backend::{AlterColumnStrategy, Backend};
use crate::error::CompileError;
use crate::operation::TableName;
use crate::statement::Statement;

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Backend for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn alter_column_strategy(&self) -> AlterColumnStrategy {
        AlterColumnStrategy::InPlace
    }

    fn supports_column_if_exists(&self) -> bool {
        true
    }

    fn supports_drop_table_cascade(&self) -> bool {
        true
    }

    fn build_table_create(&self, stmt: TableCreateStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_table_drop(&self, stmt: TableDropStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_table_rename(&self, stmt: TableRenameStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_table_alter(&self, stmt: TableAlterStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_index_create(&self, stmt: IndexCreateStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_index_drop(&self, stmt: IndexDropStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_insert(&self, stmt: InsertStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_update(&self, stmt: UpdateStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_delete(&self, stmt: DeleteStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn drop_foreign_key_sql(
        &self,
        table: &TableName,
        name: &str,
        if_exists: bool,
    ) -> Result<Vec<Statement>, CompileError> {
        Ok(vec![Statement::new(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}{}",
            self.quote_table(table),
            if if_exists { "IF EXISTS " } else { "" },
            self.quote_identifier(name)
        ))])
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
