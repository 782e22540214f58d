use sea_query::{
    DeleteStatement, IndexCreateStatement, IndexDropStatement, InsertStatement, MysqlQueryBuilder,
    TableAlterStatement, TableCreateStatement, TableDropStatement, TableRenameStatement,
    UpdateStatement,
};

use crate::backend::{AlterColumnStrategy, Backend};
use crate::error::CompileError;
use crate::operation::TableName;
use crate::statement::{SchemaProbe, Statement};

/// MySQL. DDL commits implicitly, so migrations here are not atomic.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Backend for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn alter_column_strategy(&self) -> AlterColumnStrategy {
        AlterColumnStrategy::FullDefinition
    }

    fn supports_index_if_exists(&self) -> bool {
        false
    }

    fn supports_partial_indexes(&self) -> bool {
        false
    }

    fn begin_transaction_sql(&self) -> &'static str {
        "START TRANSACTION"
    }

    fn build_table_create(&self, stmt: TableCreateStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_table_drop(&self, stmt: TableDropStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_table_rename(&self, stmt: TableRenameStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_table_alter(&self, stmt: TableAlterStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_index_create(&self, stmt: IndexCreateStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_index_drop(&self, stmt: IndexDropStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_insert(&self, stmt: InsertStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_update(&self, stmt: UpdateStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn build_delete(&self, stmt: DeleteStatement) -> String {
        stmt.to_string(MysqlQueryBuilder)
    }

    fn drop_foreign_key_sql(
        &self,
        table: &TableName,
        name: &str,
        if_exists: bool,
    ) -> Result<Vec<Statement>, CompileError> {
        let sql = format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote_table(table),
            self.quote_identifier(name)
        );
        Ok(vec![if if_exists {
            Statement::if_present(
                sql,
                SchemaProbe::ForeignKey {
                    table: table.clone(),
                    name: name.to_string(),
                },
            )
        } else {
            Statement::new(sql)
        }])
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}
