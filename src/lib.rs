pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod field;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod operation;
pub mod plan;
pub mod state;
pub mod statement;

pub mod prelude {
    pub use crate::backend::{AlterColumnStrategy, Backend, MySql, Postgres, Sqlite};
    pub use crate::config::{ChecksumPolicy, MigratorConfig};
    pub use crate::connection::Connection;
    pub use crate::error::{CompileError, DbError, LockError, MigrationError, PlanError};
    pub use crate::field::{Field, FieldType, ForeignKeyConstraint, ReferentialAction};
    pub use crate::lock::{LockPolicy, MigrationLock};
    pub use crate::migration::{Migration, MigrationKey, MigrationRegistry, MigrationSource};
    pub use crate::migrator::{
        ChecksumVerification, MigrationPreview, MigrationStatus, Migrator, RevertResult,
    };
    pub use crate::operation::{
        AlterTable, ColumnChanges, CreateTable, DeleteData, DropIndex, DropTable, Index,
        InsertData, PlanElement, PredicateOp, RawSql, SqlValue, TableName, UpdateData,
    };
    pub use crate::plan::MigrationPlan;
    pub use crate::state::{Database, HistoryRow, InMemoryDatabase, MigrationStateStore};
    pub use crate::statement::{SchemaProbe, Statement};

    #[cfg(feature = "sqlite")]
    pub use crate::state::SqliteDatabase;

    #[cfg(feature = "postgres")]
    pub use crate::state::PostgresDatabase;

    #[cfg(feature = "mysql")]
    pub use crate::state::MySqlDatabase;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    struct BlogMigrations;

    impl MigrationSource for BlogMigrations {
        fn migrations(&self) -> Vec<Migration> {
            vec![
                Migration::new(20240101000000, "create users").up(|plan| {
                    plan.create_table(
                        CreateTable::new("users")
                            .add_field(Field::new("id", FieldType::Serial).primary_key())
                            .add_field(Field::new("email", FieldType::Text).not_null().unique())
                            .add_field(Field::new("created_at", FieldType::Timestamp).not_null()),
                    )
                    .create_index(
                        Index::new("idx_users_email", "users")
                            .column("email")
                            .unique(),
                    );
                    Ok(())
                }),
                Migration::new(20240102000000, "create posts").up(|plan| {
                    plan.create_table(
                        CreateTable::new("posts")
                            .add_field(Field::new("id", FieldType::Serial).primary_key())
                            .add_field(
                                Field::new("user_id", FieldType::Integer)
                                    .not_null()
                                    .references("users", "id")
                                    .on_delete(ReferentialAction::Cascade),
                            )
                            .add_field(Field::new("title", FieldType::Text).not_null())
                            .add_field(Field::new("body", FieldType::Text)),
                    );
                    Ok(())
                }),
                Migration::new(20240103000000, "add user name").up(|plan| {
                    plan.alter_table(
                        AlterTable::new("users")
                            .add_column(Field::new("name", FieldType::VarChar(255))),
                    );
                    Ok(())
                }),
            ]
        }
    }

    #[test]
    fn full_migration_workflow() {
        let mut registry = MigrationRegistry::new();
        registry.register_source(&BlogMigrations).unwrap();

        let db = InMemoryDatabase::new();
        let mut migrator = Migrator::new(&registry, &Sqlite, db.clone());

        let preview = migrator.preview_pending().unwrap();
        assert_eq!(preview.len(), 3);

        let applied = migrator.apply_pending().unwrap();
        assert_eq!(applied.len(), 3);

        let executed = db.executed();
        assert!(executed.iter().any(|s| s.contains("CREATE TABLE \"users\"")));
        assert!(executed.iter().any(|s| s.contains("CREATE TABLE \"posts\"")));
        assert!(executed.iter().any(|s| s.contains("ADD COLUMN \"name\"")));

        let status = migrator.status().unwrap();
        assert_eq!(status.applied, 3);
        assert_eq!(status.pending, 0);
        assert_eq!(status.mismatched, 0);
    }

    #[test]
    fn migration_rollback() {
        let mut registry = MigrationRegistry::new();
        registry.register_source(&BlogMigrations).unwrap();

        let db = InMemoryDatabase::new();
        let mut migrator = Migrator::new(&registry, &Sqlite, db.clone());
        migrator.apply_pending().unwrap();

        let preview = migrator
            .preview_revert_to(MigrationKey::new(20240102000000))
            .unwrap();
        assert_eq!(preview.len(), 1);
        assert!(preview[0].statements[0].sql.contains("DROP COLUMN"));

        let result = migrator
            .revert_to(MigrationKey::new(20240102000000))
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.reverted, vec![MigrationKey::new(20240103000000)]);
        assert_eq!(migrator.applied_keys().unwrap().len(), 2);
    }

    #[test]
    fn same_plan_compiles_per_dialect() {
        let mut registry = MigrationRegistry::new();
        registry.register_source(&BlogMigrations).unwrap();
        let migration = registry.get(MigrationKey::new(20240102000000)).unwrap();

        let sqlite = migration.up_statements(&Sqlite).unwrap();
        let postgres = migration.up_statements(&Postgres).unwrap();
        let mysql = migration.up_statements(&MySql).unwrap();

        assert!(sqlite[0].sql.contains("\"posts\""));
        assert!(postgres[0].sql.contains("serial"));
        assert!(mysql[0].sql.contains("`posts`"));
    }
}
