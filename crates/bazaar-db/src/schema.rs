//! Fixed table set of the marketplace and the foreign-key graph between them.
//!
//! The graph is declared statically. A new table that references any of
//! these must be added to [`FOREIGN_KEYS`] or the reset plan will not know
//! to clear it first.

use std::fmt;
use std::str::FromStr;

use crate::error::{LifecycleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Users,
    Products,
    Chats,
    Messages,
    CartItems,
}

impl Table {
    /// Declaration order, parents before children.
    pub const ALL: [Table; 5] = [
        Table::Users,
        Table::Products,
        Table::Chats,
        Table::Messages,
        Table::CartItems,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Products => "products",
            Table::Chats => "chats",
            Table::Messages => "messages",
            Table::CartItems => "cart_items",
        }
    }

    pub fn create_sql(self) -> &'static str {
        match self {
            Table::Users => {
                "CREATE TABLE IF NOT EXISTS users (
                    id           TEXT PRIMARY KEY,
                    email        TEXT NOT NULL UNIQUE,
                    name         TEXT NOT NULL,
                    password     TEXT NOT NULL,
                    is_verified  INTEGER NOT NULL DEFAULT 0,
                    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
                )"
            }
            Table::Products => {
                "CREATE TABLE IF NOT EXISTS products (
                    id           TEXT PRIMARY KEY,
                    seller_id    TEXT NOT NULL REFERENCES users(id),
                    name         TEXT NOT NULL,
                    description  TEXT NOT NULL DEFAULT '',
                    price        INTEGER NOT NULL,
                    category     TEXT NOT NULL,
                    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
                )"
            }
            Table::Chats => {
                "CREATE TABLE IF NOT EXISTS chats (
                    id           TEXT PRIMARY KEY,
                    product_id   TEXT NOT NULL REFERENCES products(id),
                    buyer_id     TEXT NOT NULL REFERENCES users(id),
                    seller_id    TEXT NOT NULL REFERENCES users(id),
                    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
                )"
            }
            Table::Messages => {
                "CREATE TABLE IF NOT EXISTS messages (
                    id           TEXT PRIMARY KEY,
                    chat_id      TEXT NOT NULL REFERENCES chats(id),
                    sender_id    TEXT NOT NULL REFERENCES users(id),
                    content      TEXT NOT NULL,
                    is_read      INTEGER NOT NULL DEFAULT 0,
                    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
                )"
            }
            Table::CartItems => {
                "CREATE TABLE IF NOT EXISTS cart_items (
                    id           TEXT PRIMARY KEY,
                    user_id      TEXT NOT NULL REFERENCES users(id),
                    product_id   TEXT NOT NULL REFERENCES products(id),
                    chat_id      TEXT REFERENCES chats(id),
                    cart_type    TEXT NOT NULL DEFAULT 'cart',
                    created_at   TEXT NOT NULL DEFAULT (datetime('now'))
                )"
            }
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s.trim())
            .ok_or_else(|| format!("unknown table '{}'", s))
    }
}

/// `child.column` references `parent.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub child: Table,
    pub column: &'static str,
    pub parent: Table,
    /// Nullable references are cleared before the parent goes; the rest force the child to go first.
    pub nullable: bool,
}

const fn fk(child: Table, column: &'static str, parent: Table, nullable: bool) -> ForeignKey {
    ForeignKey {
        child,
        column,
        parent,
        nullable,
    }
}

pub const FOREIGN_KEYS: &[ForeignKey] = &[
    fk(Table::Products, "seller_id", Table::Users, false),
    fk(Table::Chats, "product_id", Table::Products, false),
    fk(Table::Chats, "buyer_id", Table::Users, false),
    fk(Table::Chats, "seller_id", Table::Users, false),
    fk(Table::Messages, "chat_id", Table::Chats, false),
    fk(Table::Messages, "sender_id", Table::Users, false),
    fk(Table::CartItems, "user_id", Table::Users, false),
    fk(Table::CartItems, "product_id", Table::Products, false),
    fk(Table::CartItems, "chat_id", Table::Chats, true),
];

/// One statement of a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    /// `UPDATE table SET column = NULL`
    ClearReference { table: Table, column: &'static str },
    /// `DELETE FROM table`
    Delete(Table),
}

impl PlanStep {
    pub fn table(&self) -> Table {
        match self {
            PlanStep::ClearReference { table, .. } | PlanStep::Delete(table) => *table,
        }
    }

    pub fn sql(&self) -> String {
        match self {
            PlanStep::ClearReference { table, column } => format!(
                "UPDATE {} SET {col} = NULL WHERE {col} IS NOT NULL",
                quote_ident(table.name()),
                col = quote_ident(column)
            ),
            PlanStep::Delete(table) => format!("DELETE FROM {}", quote_ident(table.name())),
        }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::ClearReference { table, column } => write!(f, "clear {}.{}", table, column),
            PlanStep::Delete(table) => write!(f, "delete {}", table),
        }
    }
}

/// Deletion order for `tables`: reverse topological order over the
/// non-nullable edges, ties broken by the order of `tables`.
///
/// A nullable reference into a table is cleared right before that table is
/// deleted, as long as the referencing table still has rows at that point.
/// Self-references are ignored: a single `DELETE` removes the whole table
/// before constraints are checked.
pub fn deletion_plan(tables: &[Table], edges: &[ForeignKey]) -> Result<Vec<PlanStep>> {
    let mut remaining: Vec<Table> = tables.to_vec();
    let mut plan = Vec::with_capacity(tables.len() + edges.len());

    while !remaining.is_empty() {
        let blocked = |candidate: Table| {
            edges.iter().any(|fk| {
                !fk.nullable
                    && fk.parent == candidate
                    && fk.child != candidate
                    && remaining.contains(&fk.child)
            })
        };

        let Some(next) = remaining.iter().copied().find(|&t| !blocked(t)) else {
            let names: Vec<&str> = remaining.iter().map(|t| t.name()).collect();
            return Err(LifecycleError::CyclicDependency(names.join(", ")));
        };

        for edge in edges {
            if edge.nullable
                && edge.parent == next
                && edge.child != next
                && remaining.contains(&edge.child)
            {
                plan.push(PlanStep::ClearReference {
                    table: edge.child,
                    column: edge.column,
                });
            }
        }
        plan.push(PlanStep::Delete(next));
        remaining.retain(|&t| t != next);
    }

    Ok(plan)
}

/// Plan for the full marketplace schema.
pub fn standard_plan() -> Result<Vec<PlanStep>> {
    deletion_plan(&Table::ALL, FOREIGN_KEYS)
}

/// Double-quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
