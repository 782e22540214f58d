#![cfg(feature = "sqlite")]

use rusqlite::Connection as SqliteConnection;
use tidemark::prelude::*;

const USERS: u64 = 20240101000000;
const NAME: u64 = 20240102000000;
const POSTS: u64 = 20240103000000;

fn table_exists(conn: &SqliteConnection, name: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

fn column_exists(conn: &SqliteConnection, table: &str, column: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

fn setup_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();

    registry
        .register(Migration::new(USERS, "create users").up(|plan| {
            plan.create_table(
                CreateTable::new("users")
                    .add_field(Field::new("id", FieldType::Serial).primary_key())
                    .add_field(Field::new("email", FieldType::Text).not_null().unique())
                    .add_field(
                        Field::new("created_at", FieldType::Timestamp)
                            .not_null()
                            .default("CURRENT_TIMESTAMP"),
                    ),
            );
            Ok(())
        }))
        .unwrap();

    registry
        .register(Migration::new(NAME, "add user name").up(|plan| {
            plan.alter_table(
                AlterTable::new("users").add_column(Field::new("name", FieldType::VarChar(255))),
            );
            Ok(())
        }))
        .unwrap();

    registry
        .register(Migration::new(POSTS, "create posts").up(|plan| {
            plan.create_table(
                CreateTable::new("posts")
                    .add_field(Field::new("id", FieldType::Serial).primary_key())
                    .add_field(
                        Field::new("user_id", FieldType::Integer)
                            .not_null()
                            .references("users", "id")
                            .on_delete(ReferentialAction::Cascade),
                    )
                    .add_field(Field::new("title", FieldType::Text).not_null()),
            )
            .create_index(Index::new("idx_posts_user_id", "posts").column("user_id"));
            Ok(())
        }))
        .unwrap();

    registry
}

#[test]
fn test_sqlite_apply_all() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let registry = setup_registry();
    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));

    let applied = migrator.apply_pending().unwrap();
    assert_eq!(
        applied,
        vec![
            MigrationKey::new(USERS),
            MigrationKey::new(NAME),
            MigrationKey::new(POSTS)
        ]
    );

    assert!(table_exists(&conn, "users"));
    assert!(table_exists(&conn, "posts"));
    assert!(column_exists(&conn, "users", "name"));

    conn.execute(
        "INSERT INTO users (email, name) VALUES ('ada@example.com', 'Ada')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO posts (user_id, title) VALUES (1, 'Hello')",
        [],
    )
    .unwrap();

    let (key, checksum, applied_at): (String, Option<String>, String) = conn
        .query_row(
            "SELECT ordering_key, checksum, applied_at FROM schema_migrations ORDER BY ordering_key LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(key, "20240101000000");
    assert_eq!(checksum.map(|c| c.len()), Some(64));
    assert!(applied_at.ends_with('Z'));

    assert!(migrator.apply_pending().unwrap().is_empty());
}

#[test]
fn test_sqlite_revert_to() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let registry = setup_registry();
    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    migrator.apply_pending().unwrap();

    let result = migrator.revert_to(MigrationKey::new(USERS)).unwrap();
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(
        result.reverted,
        vec![MigrationKey::new(POSTS), MigrationKey::new(NAME)]
    );

    assert!(!table_exists(&conn, "posts"));
    assert!(table_exists(&conn, "users"));
    assert!(!column_exists(&conn, "users", "name"));
    assert_eq!(
        migrator.applied_keys().unwrap(),
        vec![MigrationKey::new(USERS)]
    );
    let pending: Vec<_> = migrator.pending().unwrap().iter().map(|m| m.key).collect();
    assert_eq!(pending, vec![MigrationKey::new(NAME), MigrationKey::new(POSTS)]);

    migrator.revert_all().unwrap();
    assert!(!table_exists(&conn, "users"));
    assert!(migrator.applied_keys().unwrap().is_empty());
}

#[test]
fn test_sqlite_failed_migration_leaves_no_trace() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut registry = setup_registry();
    registry
        .register(Migration::new(20240104000000, "broken").up(|plan| {
            plan.create_table(
                CreateTable::new("comments")
                    .add_field(Field::new("id", FieldType::Serial).primary_key()),
            )
            .raw_sql(RawSql::new("INSERT INTO missing_table VALUES (1)"));
            Ok(())
        }))
        .unwrap();

    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    let err = migrator.apply_pending().unwrap_err();
    match err {
        MigrationError::ExecutionFailed {
            key,
            step,
            completed,
            ..
        } => {
            assert_eq!(key, MigrationKey::new(20240104000000));
            assert_eq!(step, Some(1));
            assert_eq!(completed.len(), 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!table_exists(&conn, "comments"));
    assert_eq!(migrator.applied_keys().unwrap().len(), 3);

    let locks: i64 = conn
        .query_row("SELECT COUNT(*) FROM _migration_locks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(locks, 0);
}

#[test]
fn test_sqlite_lock_excludes_second_runner() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let registry = setup_registry();

    let mut other = SqliteDatabase::new(&conn);
    let config = MigratorConfig::default().owner("other-runner");
    assert!(other
        .try_acquire_lock(&tidemark::lock::LockRequest {
            name: &config.lock_name,
            owner: &config.owner,
            stale_after: None,
        })
        .unwrap());

    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    assert!(matches!(
        migrator.apply_pending(),
        Err(MigrationError::LockAcquisitionFailed(LockError::Held { .. }))
    ));
    assert!(!table_exists(&conn, "users"));

    other.release_lock(&config.lock_name, &config.owner).unwrap();
    assert_eq!(migrator.apply_pending().unwrap().len(), 3);
}

#[test]
fn test_sqlite_mark_applied_and_status() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let registry = setup_registry();
    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));

    migrator.mark_applied(MigrationKey::new(USERS)).unwrap();
    assert!(!table_exists(&conn, "users"));

    let status = migrator.status().unwrap();
    assert_eq!(status.applied, 1);
    assert_eq!(status.pending, 2);
    assert_eq!(status.total, 3);

    let verified = migrator.verify_checksums().unwrap();
    assert!(verified.iter().all(|v| v.matches));
}

#[test]
fn test_sqlite_detects_edited_migration() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let registry = setup_registry();
    Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn))
        .apply_pending()
        .unwrap();

    conn.execute(
        "UPDATE schema_migrations SET checksum = 'tampered' WHERE ordering_key = ?1",
        ["20240102000000"],
    )
    .unwrap();

    let mut strict = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn))
        .with_config(MigratorConfig::default().strict_checksums());
    let status = strict.status().unwrap();
    assert_eq!(status.mismatched, 1);
    assert!(matches!(
        strict.apply_pending(),
        Err(MigrationError::ChecksumMismatch(ref keys)) if keys == &[MigrationKey::new(NAME)]
    ));
}

#[test]
fn test_sqlite_index_if_not_exists_is_idempotent() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut registry = setup_registry();
    registry
        .register(Migration::new(20240104000000, "index emails").up(|plan| {
            plan.create_index(
                Index::new("idx_users_email", "users")
                    .column("email")
                    .if_not_exists(),
            );
            Ok(())
        }))
        .unwrap();
    registry
        .register(Migration::new(20240105000000, "index emails again").up(|plan| {
            plan.create_index(
                Index::new("idx_users_email", "users")
                    .column("email")
                    .if_not_exists(),
            );
            Ok(())
        }))
        .unwrap();

    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    assert_eq!(migrator.apply_pending().unwrap().len(), 5);

    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_users_email'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 1);
}

#[test]
fn test_sqlite_custom_history_table() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let registry = setup_registry();
    let mut migrator = Migrator::new(
        &registry,
        &Sqlite,
        SqliteDatabase::with_table_name(&conn, "app_migrations"),
    );

    migrator.apply_single(MigrationKey::new(USERS)).unwrap();
    assert!(table_exists(&conn, "app_migrations"));
    assert!(!table_exists(&conn, "schema_migrations"));
}

#[test]
fn test_sqlite_create_users_scenario() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut registry = MigrationRegistry::new();
    registry
        .register(Migration::new(20240101000000, "create users").up(|plan| {
            plan.create_table(
                CreateTable::new("users")
                    .add_field(Field::new("id", FieldType::Serial).primary_key())
                    .add_field(Field::new("name", FieldType::Text).required()),
            );
            Ok(())
        }))
        .unwrap();

    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    migrator.apply_pending().unwrap();

    let status = migrator.status().unwrap();
    assert_eq!(status.applied, 1);
    assert_eq!(status.pending, 0);
    assert!(conn
        .execute("INSERT INTO users (name) VALUES (NULL)", [])
        .is_err());
}

#[test]
fn test_sqlite_alter_column_keeps_constraints() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut registry = MigrationRegistry::new();
    registry
        .register(Migration::new(USERS, "create users").up(|plan| {
            plan.create_table(
                CreateTable::new("users")
                    .add_field(Field::new("id", FieldType::Serial).primary_key())
                    .add_field(Field::new("age", FieldType::Integer).not_null().default("0")),
            );
            Ok(())
        }))
        .unwrap();
    registry
        .register(Migration::new(NAME, "widen age").up(|plan| {
            plan.alter_table(AlterTable::new("users").alter_column(
                "age",
                ColumnChanges::new()
                    .set_type(FieldType::BigInt)
                    .set_nullable(false)
                    .set_default(Some("0".to_string())),
            ));
            Ok(())
        }))
        .unwrap();

    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    migrator.apply_single(MigrationKey::new(USERS)).unwrap();
    conn.execute("INSERT INTO users (age) VALUES (42)", []).unwrap();
    migrator.apply_single(MigrationKey::new(NAME)).unwrap();

    let (notnull, default): (i64, Option<String>) = conn
        .query_row(
            "SELECT \"notnull\", dflt_value FROM pragma_table_info('users') WHERE name = 'age'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(notnull, 1);
    assert_eq!(default.as_deref(), Some("0"));

    let age: i64 = conn
        .query_row("SELECT age FROM users", [], |row| row.get(0))
        .unwrap();
    assert_eq!(age, 42);
    assert!(conn.execute("INSERT INTO users (age) VALUES (NULL)", []).is_err());
}

#[test]
fn test_sqlite_alter_column_type_only_is_refused() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut registry = MigrationRegistry::new();
    registry
        .register(Migration::new(USERS, "create users").up(|plan| {
            plan.create_table(
                CreateTable::new("users")
                    .add_field(Field::new("id", FieldType::Serial).primary_key())
                    .add_field(Field::new("age", FieldType::Integer).not_null().default("0")),
            );
            Ok(())
        }))
        .unwrap();
    registry
        .register(Migration::new(NAME, "widen age").up(|plan| {
            plan.alter_table(
                AlterTable::new("users")
                    .alter_column("age", ColumnChanges::new().set_type(FieldType::BigInt)),
            );
            Ok(())
        }))
        .unwrap();

    let mut migrator = Migrator::new(&registry, &Sqlite, SqliteDatabase::new(&conn));
    match migrator.apply_pending().unwrap_err() {
        MigrationError::Compile { key, .. } => assert_eq!(key, MigrationKey::new(NAME)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        migrator.applied_keys().unwrap(),
        vec![MigrationKey::new(USERS)]
    );

    let notnull: i64 = conn
        .query_row(
            "SELECT \"notnull\" FROM pragma_table_info('users') WHERE name = 'age'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(notnull, 1);
}
