/// Schema migration behaviour against real SQLite databases: idempotence,
/// the message -> content rename, and the corrupt-schema stop.

use std::collections::BTreeMap;
use std::time::Duration;

use bazaar_db::{CancelFlag, Database, DbConfig, LifecycleError, MigrationStep, Migrator, Table};
use bazaar_types::MigrationStatus;

const RENAME: MigrationStep = MigrationStep::RenameColumn {
    table: Table::Messages,
    legacy: "message",
    target: "content",
};

fn column_values(db: &Database, column: &str) -> BTreeMap<String, String> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT id, {} FROM messages", column))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    })
    .unwrap()
}

fn schema_snapshot(db: &Database) -> Vec<(String, Option<String>)> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT name, sql FROM sqlite_master ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .unwrap()
}

fn legacy_messages(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "
            CREATE TABLE messages (
                id       TEXT PRIMARY KEY,
                chat_id  TEXT,
                message  TEXT NOT NULL
            );
            INSERT INTO messages (id, chat_id, message) VALUES
                ('m1', 'c1', 'hello'),
                ('m2', 'c1', 'is the bike still for sale?'),
                ('m3', 'c2', 'ünïcødé 📚');
            ",
        )?;
        Ok(())
    })
    .unwrap();
}

#[test]
fn fresh_database_converges_on_second_run() {
    let db = Database::open_in_memory().unwrap();
    let cancel = CancelFlag::default();

    let first = Migrator::standard().run(&db, &cancel).unwrap();
    let created = first
        .iter()
        .filter(|r| r.step.starts_with("create_table") && r.status == MigrationStatus::Migrated)
        .count();
    assert_eq!(created, Table::ALL.len());

    let second = Migrator::standard().run(&db, &cancel).unwrap();
    assert_eq!(second.len(), first.len());
    for result in &second {
        assert_eq!(result.status, MigrationStatus::AlreadyCurrent, "{}", result.step);
    }
}

#[test]
fn rename_migrates_then_is_current() {
    let db = Database::open_in_memory().unwrap();
    legacy_messages(&db);
    let before = column_values(&db, "message");

    let first = db.apply_schema_delta(&RENAME).unwrap();
    assert_eq!(first.status, MigrationStatus::Migrated);

    let second = db.apply_schema_delta(&RENAME).unwrap();
    assert_eq!(second.status, MigrationStatus::AlreadyCurrent);

    assert!(db.verify_column_presence("messages", "content").unwrap());
    assert!(!db.verify_column_presence("messages", "message").unwrap());
    assert_eq!(column_values(&db, "content"), before);
}

#[test]
fn rename_preserves_rows_and_values() {
    let db = Database::open_in_memory().unwrap();
    legacy_messages(&db);
    let before = column_values(&db, "message");
    assert_eq!(before.len(), 3);

    db.apply_schema_delta(&RENAME).unwrap();

    let after = column_values(&db, "content");
    assert_eq!(after.len(), before.len());
    for (id, value) in &before {
        assert_eq!(after.get(id), Some(value), "row {}", id);
    }
}

#[test]
fn column_names_match_regardless_of_case() {
    let current = Database::open_in_memory().unwrap();
    current
        .with_conn(|conn| {
            conn.execute_batch("CREATE TABLE messages (id TEXT PRIMARY KEY, chat_id TEXT, Content TEXT);")?;
            Ok(())
        })
        .unwrap();

    assert!(current.verify_column_presence("messages", "content").unwrap());
    let result = current.apply_schema_delta(&RENAME).unwrap();
    assert_eq!(result.status, MigrationStatus::AlreadyCurrent, "{}", result.detail);

    let legacy = Database::open_in_memory().unwrap();
    legacy
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE messages (id TEXT PRIMARY KEY, chat_id TEXT, MESSAGE TEXT);
                 INSERT INTO messages (id, chat_id, MESSAGE) VALUES ('m1', 'c1', 'hello');",
            )?;
            Ok(())
        })
        .unwrap();
    let before = column_values(&legacy, "message");

    let result = legacy.apply_schema_delta(&RENAME).unwrap();

    assert_eq!(result.status, MigrationStatus::Migrated, "{}", result.detail);
    assert!(legacy.verify_column_presence("messages", "content").unwrap());
    assert_eq!(column_values(&legacy, "content"), before);
}

#[test]
fn missing_columns_are_schema_corrupt_without_writes() {
    let db = Database::open_in_memory().unwrap();
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TABLE messages (id TEXT PRIMARY KEY, body TEXT);
             INSERT INTO messages (id, body) VALUES ('m1', 'x');",
        )?;
        Ok(())
    })
    .unwrap();
    let schema_before = schema_snapshot(&db);

    let result = db.apply_schema_delta(&RENAME).unwrap();

    assert_eq!(result.status, MigrationStatus::SchemaCorrupt);
    assert!(result.detail.contains("message"));
    assert_eq!(schema_snapshot(&db), schema_before);
    assert_eq!(column_values(&db, "body").len(), 1);
}

#[test]
fn missing_table_is_schema_corrupt() {
    let db = Database::open_in_memory().unwrap();

    let rename = db.apply_schema_delta(&RENAME).unwrap();
    assert_eq!(rename.status, MigrationStatus::SchemaCorrupt);

    let add = db
        .apply_schema_delta(&MigrationStep::AddColumn {
            table: Table::Messages,
            column: "is_read",
            definition: "INTEGER NOT NULL DEFAULT 0",
        })
        .unwrap();
    assert_eq!(add.status, MigrationStatus::SchemaCorrupt);
    assert!(schema_snapshot(&db).is_empty());
}

#[test]
fn migrator_halts_at_corrupt_step_and_keeps_earlier_ones() {
    let db = Database::open_in_memory().unwrap();
    db.with_conn(|conn| {
        conn.execute_batch("CREATE TABLE messages (id TEXT PRIMARY KEY, chat_id TEXT, body TEXT);")?;
        Ok(())
    })
    .unwrap();

    let err = Migrator::standard()
        .run(&db, &CancelFlag::default())
        .unwrap_err();

    match err {
        LifecycleError::SchemaCorrupt { table, .. } => assert_eq!(table, "messages"),
        other => panic!("expected SchemaCorrupt, got {other}"),
    }

    // Steps before the rename were committed and the session was released
    assert!(db.verify_column_presence("users", "email").unwrap());
    assert!(db.verify_column_presence("messages", "is_read").unwrap());
}

#[test]
fn legacy_database_is_brought_current() {
    let db = Database::open_in_memory().unwrap();
    db.with_conn(|conn| {
        conn.execute_batch(
            "
            CREATE TABLE users (
                id TEXT PRIMARY KEY, email TEXT NOT NULL UNIQUE, name TEXT NOT NULL,
                password TEXT NOT NULL
            );
            CREATE TABLE products (
                id TEXT PRIMARY KEY, seller_id TEXT NOT NULL REFERENCES users(id),
                name TEXT NOT NULL, description TEXT NOT NULL DEFAULT '',
                price INTEGER NOT NULL, category TEXT NOT NULL
            );
            CREATE TABLE chats (
                id TEXT PRIMARY KEY, product_id TEXT NOT NULL REFERENCES products(id),
                buyer_id TEXT NOT NULL REFERENCES users(id), seller_id TEXT NOT NULL REFERENCES users(id)
            );
            CREATE TABLE messages (
                id TEXT PRIMARY KEY, chat_id TEXT NOT NULL REFERENCES chats(id),
                sender_id TEXT NOT NULL REFERENCES users(id), message TEXT NOT NULL
            );
            CREATE TABLE cart_items (
                id TEXT PRIMARY KEY, user_id TEXT NOT NULL REFERENCES users(id),
                product_id TEXT NOT NULL REFERENCES products(id)
            );

            INSERT INTO users (id, email, name, password) VALUES ('u1', 'a@x', 'A', 'p'), ('u2', 'b@x', 'B', 'p');
            INSERT INTO products (id, seller_id, name, price, category) VALUES ('p1', 'u1', 'Lamp', 500, 'Furniture');
            INSERT INTO chats (id, product_id, buyer_id, seller_id) VALUES ('c1', 'p1', 'u2', 'u1');
            INSERT INTO messages (id, chat_id, sender_id, message) VALUES ('m1', 'c1', 'u2', 'still there?');
            INSERT INTO cart_items (id, user_id, product_id) VALUES ('ci1', 'u2', 'p1');
            ",
        )?;
        Ok(())
    })
    .unwrap();

    let cancel = CancelFlag::default();
    let results = Migrator::standard().run(&db, &cancel).unwrap();
    let migrated: Vec<&str> = results
        .iter()
        .filter(|r| r.status == MigrationStatus::Migrated)
        .map(|r| r.step.as_str())
        .collect();
    assert!(migrated.contains(&"rename_column:messages.message->content"));
    assert!(migrated.contains(&"add_column:cart_items.chat_id"));
    assert!(migrated.contains(&"add_column:users.is_verified"));

    for (table, column) in [
        ("users", "is_verified"),
        ("messages", "is_read"),
        ("messages", "content"),
        ("cart_items", "chat_id"),
        ("cart_items", "cart_type"),
    ] {
        assert!(db.verify_column_presence(table, column).unwrap(), "{table}.{column}");
    }
    assert_eq!(
        column_values(&db, "content").get("m1").map(String::as_str),
        Some("still there?")
    );
    assert!(db.foreign_key_violations().unwrap().is_empty());

    let again = Migrator::standard().run(&db, &cancel).unwrap();
    assert!(again.iter().all(|r| r.status == MigrationStatus::AlreadyCurrent));
}

#[test]
fn cancelled_migration_writes_nothing() {
    let db = Database::open_in_memory().unwrap();
    let cancel = CancelFlag::default();
    cancel.cancel();

    let err = Migrator::standard().run(&db, &cancel).unwrap_err();
    assert!(matches!(err, LifecycleError::Cancelled));
    assert!(schema_snapshot(&db).is_empty());
}

#[test]
fn file_database_survives_idle_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DbConfig::new(dir.path().join("bazaar.db"));
    config.idle_timeout = Duration::ZERO;

    let db = Database::open(config).unwrap();
    Migrator::standard().run(&db, &CancelFlag::default()).unwrap();
    std::thread::sleep(Duration::from_millis(5));

    // Idle past the timeout: this session runs on a freshly opened connection
    assert!(db.verify_column_presence("messages", "content").unwrap());
    let enabled: i64 = db
        .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn unopenable_path_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("missing").join("bazaar.db"));

    let err = Database::open(config).err().unwrap();
    assert!(matches!(err, LifecycleError::Connection(_)));
}
