#![allow(dead_code)]

use std::collections::BTreeMap;

use bazaar_db::verify::count_rows;
use bazaar_db::{CancelFlag, Database, Migrator, Table};

/// In-memory database with the standard schema applied.
pub fn migrated_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    Migrator::standard().run(&db, &CancelFlag::default()).unwrap();
    db
}

/// Two users, three products, two chats, three messages, two cart items.
/// One cart item points at a chat, the other does not.
pub fn populate(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "
            INSERT INTO users (id, email, name, password) VALUES
                ('u1', 'u1@campus.test', 'User One', 'x'),
                ('u2', 'u2@campus.test', 'User Two', 'x');

            INSERT INTO products (id, seller_id, name, price, category) VALUES
                ('p1', 'u1', 'Calculus textbook', 2500, 'Textbooks'),
                ('p2', 'u2', 'Desk lamp', 1200, 'Furniture'),
                ('p3', 'u1', 'USB hub', 900, 'Electronics');

            INSERT INTO chats (id, product_id, buyer_id, seller_id) VALUES
                ('c1', 'p1', 'u2', 'u1'),
                ('c2', 'p2', 'u1', 'u2');

            INSERT INTO messages (id, chat_id, sender_id, content) VALUES
                ('m1', 'c1', 'u2', 'Is this still available?'),
                ('m2', 'c1', 'u1', 'Yes'),
                ('m3', 'c2', 'u1', 'Can you do 10?');

            INSERT INTO cart_items (id, user_id, product_id, chat_id, cart_type) VALUES
                ('ci1', 'u2', 'p1', 'c1', 'cart'),
                ('ci2', 'u1', 'p2', NULL, 'wishlist');
            ",
        )?;
        Ok(())
    })
    .unwrap();
}

pub fn counts(db: &Database) -> BTreeMap<Table, u64> {
    db.with_conn(|conn| {
        let mut counts = BTreeMap::new();
        for table in Table::ALL {
            counts.insert(table, count_rows(conn, table.name())?);
        }
        Ok(counts)
    })
    .unwrap()
}

pub fn disable_foreign_keys(db: &Database) {
    db.with_conn(|conn| {
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        Ok(())
    })
    .unwrap();
}
