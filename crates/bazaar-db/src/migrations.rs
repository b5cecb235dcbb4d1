//! Idempotent schema changes.
//!
//! Each step reads the catalog first and applies only the missing delta, in
//! its own transaction. Steps are cumulative: a failure leaves earlier steps
//! committed, and re-running the whole plan converges.

use std::fmt;

use bazaar_types::{MigrationResult, MigrationStatus, SeedSummary};
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, Result, TableContext};
use crate::schema::{Table, quote_ident};
use crate::seed::{SeedConfig, seed_sample_data};
use crate::verify::{column_exists, count_rows, index_exists, table_exists};
use crate::{CancelFlag, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    CreateTable(Table),
    AddColumn {
        table: Table,
        column: &'static str,
        definition: &'static str,
    },
    RenameColumn {
        table: Table,
        legacy: &'static str,
        target: &'static str,
    },
    CreateIndex {
        name: &'static str,
        table: Table,
        columns: &'static str,
    },
}

impl MigrationStep {
    pub fn table(&self) -> Table {
        match self {
            MigrationStep::CreateTable(table)
            | MigrationStep::AddColumn { table, .. }
            | MigrationStep::RenameColumn { table, .. }
            | MigrationStep::CreateIndex { table, .. } => *table,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::CreateTable(table) => write!(f, "create_table:{}", table),
            MigrationStep::AddColumn { table, column, .. } => {
                write!(f, "add_column:{}.{}", table, column)
            }
            MigrationStep::RenameColumn {
                table,
                legacy,
                target,
            } => write!(f, "rename_column:{}.{}->{}", table, legacy, target),
            MigrationStep::CreateIndex { name, .. } => write!(f, "create_index:{}", name),
        }
    }
}

impl Database {
    /// Apply one step in its own transaction.
    pub fn apply_schema_delta(&self, step: &MigrationStep) -> Result<MigrationResult> {
        self.with_conn_mut(|conn| apply_step(conn, step))
    }

    /// Seed sample data when the users table is empty.
    pub fn seed_if_empty(&self, config: &SeedConfig) -> Result<Option<SeedSummary>> {
        self.with_conn_mut(|conn| {
            let users = Table::Users.name();
            if count_rows(conn, users).on_table(users)? > 0 {
                debug!("Users present, skipping seed");
                return Ok(None);
            }

            let tx = conn.transaction()?;
            let summary = seed_sample_data(&tx, config)?;
            tx.commit()?;
            info!("Seeded empty database ({} rows)", summary.inserted);
            Ok(Some(summary))
        })
    }
}

/// An ordered list of steps run against one session.
#[derive(Debug, Clone)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
}

impl Migrator {
    pub fn new(steps: Vec<MigrationStep>) -> Self {
        Self { steps }
    }

    /// Consolidated plan for the marketplace schema.
    pub fn standard() -> Self {
        let mut steps: Vec<MigrationStep> =
            Table::ALL.into_iter().map(MigrationStep::CreateTable).collect();

        steps.extend([
            MigrationStep::AddColumn {
                table: Table::Users,
                column: "is_verified",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            MigrationStep::AddColumn {
                table: Table::Messages,
                column: "is_read",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            MigrationStep::AddColumn {
                table: Table::CartItems,
                column: "chat_id",
                definition: "TEXT REFERENCES chats(id)",
            },
            MigrationStep::AddColumn {
                table: Table::CartItems,
                column: "cart_type",
                definition: "TEXT NOT NULL DEFAULT 'cart'",
            },
            MigrationStep::RenameColumn {
                table: Table::Messages,
                legacy: "message",
                target: "content",
            },
            MigrationStep::CreateIndex {
                name: "idx_products_seller",
                table: Table::Products,
                columns: "seller_id",
            },
            MigrationStep::CreateIndex {
                name: "idx_messages_chat",
                table: Table::Messages,
                columns: "chat_id",
            },
            MigrationStep::CreateIndex {
                name: "idx_cart_items_user",
                table: Table::CartItems,
                columns: "user_id",
            },
        ]);

        Self { steps }
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Run every step in order, stopping at the first corrupt one.
    ///
    /// Cancellation is only observed between steps.
    pub fn run(&self, db: &Database, cancel: &CancelFlag) -> Result<Vec<MigrationResult>> {
        let mut session = db.session()?;
        let mut results = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            cancel.check()?;

            let result = apply_step(session.conn_mut()?, step)?;
            if result.is_corrupt() {
                warn!("Migration halted at {}: {}", step, result.detail);
                return Err(LifecycleError::SchemaCorrupt {
                    table: result.table,
                    detail: result.detail,
                });
            }

            debug!("{}: {}", step, result.status);
            results.push(result);
        }
        session.release();

        let applied = results
            .iter()
            .filter(|r| r.status == MigrationStatus::Migrated)
            .count();
        info!(
            "Migrations complete: {} applied, {} already current",
            applied,
            results.len() - applied
        );
        Ok(results)
    }
}

pub fn apply_step(conn: &mut Connection, step: &MigrationStep) -> Result<MigrationResult> {
    let table = step.table().name();
    let tx = conn.transaction().on_table(table)?;

    let (status, detail) = match *step {
        MigrationStep::CreateTable(t) => {
            if table_exists(&tx, table).on_table(table)? {
                (MigrationStatus::AlreadyCurrent, "table exists".to_string())
            } else {
                tx.execute_batch(t.create_sql()).on_table(table)?;
                (MigrationStatus::Migrated, "table created".to_string())
            }
        }
        MigrationStep::AddColumn {
            column, definition, ..
        } => {
            if !table_exists(&tx, table).on_table(table)? {
                (MigrationStatus::SchemaCorrupt, format!("cannot add {}: table missing", column))
            } else if column_exists(&tx, table, column).on_table(table)? {
                (MigrationStatus::AlreadyCurrent, format!("{} exists", column))
            } else {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(column),
                    definition
                ))
                .on_table(table)?;
                (MigrationStatus::Migrated, format!("added {}", column))
            }
        }
        MigrationStep::RenameColumn { legacy, target, .. } => {
            rename_column(&tx, table, legacy, target)?
        }
        MigrationStep::CreateIndex { name, columns, .. } => {
            if index_exists(&tx, name).on_table(table)? {
                (MigrationStatus::AlreadyCurrent, format!("{} exists", name))
            } else if !table_exists(&tx, table).on_table(table)? {
                (MigrationStatus::SchemaCorrupt, format!("cannot index {}: table missing", columns))
            } else {
                tx.execute_batch(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    quote_ident(name),
                    quote_ident(table),
                    columns
                ))
                .on_table(table)?;
                (MigrationStatus::Migrated, format!("created {}", name))
            }
        }
    };

    // Anything short of Migrated wrote nothing; dropping the transaction rolls back.
    if status == MigrationStatus::Migrated {
        tx.commit().on_table(table)?;
    }

    Ok(MigrationResult::new(step.to_string(), table, status, detail))
}

fn rename_column(
    conn: &Connection,
    table: &str,
    legacy: &str,
    target: &str,
) -> Result<(MigrationStatus, String)> {
    if !table_exists(conn, table).on_table(table)? {
        return Ok((
            MigrationStatus::SchemaCorrupt,
            format!("table missing; expected {} or {}", legacy, target),
        ));
    }

    if column_exists(conn, table, target).on_table(table)? {
        if column_exists(conn, table, legacy).on_table(table)? {
            warn!("{} has both {} and {}; leaving {} in place", table, legacy, target, legacy);
        }
        return Ok((MigrationStatus::AlreadyCurrent, format!("{} exists", target)));
    }

    if !column_exists(conn, table, legacy).on_table(table)? {
        return Ok((
            MigrationStatus::SchemaCorrupt,
            format!("neither {} nor {} exists", legacy, target),
        ));
    }

    let before = fingerprint(conn, table, legacy).on_table(table)?;
    conn.execute_batch(&format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        quote_ident(table),
        quote_ident(legacy),
        quote_ident(target)
    ))
    .on_table(table)?;
    let after = fingerprint(conn, table, target).on_table(table)?;

    if before != after {
        return Err(LifecycleError::ConstraintViolation {
            table: table.to_string(),
            detail: format!(
                "rename {} -> {} changed data ({} rows {} before, {} rows {} after)",
                legacy, target, before.rows, before.digest, after.rows, after.digest
            ),
        });
    }

    Ok((
        MigrationStatus::Migrated,
        format!("renamed {} to {} ({} rows preserved)", legacy, target, after.rows),
    ))
}

#[derive(Debug, PartialEq, Eq)]
struct Fingerprint {
    rows: u64,
    digest: String,
}

/// SHA-256 over `(rowid, value)` pairs in rowid order.
fn fingerprint(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<Fingerprint> {
    let mut stmt = conn.prepare(&format!(
        "SELECT rowid, {} FROM {} ORDER BY rowid",
        quote_ident(column),
        quote_ident(table)
    ))?;
    let mut rows = stmt.query([])?;

    let mut hasher = Sha256::new();
    let mut count = 0u64;
    while let Some(row) = rows.next()? {
        let rowid: i64 = row.get(0)?;
        hasher.update(rowid.to_le_bytes());
        match row.get_ref(1)? {
            ValueRef::Null => hasher.update([0u8]),
            ValueRef::Integer(i) => {
                hasher.update([1u8]);
                hasher.update(i.to_le_bytes());
            }
            ValueRef::Real(r) => {
                hasher.update([2u8]);
                hasher.update(r.to_le_bytes());
            }
            ValueRef::Text(t) => {
                hasher.update([3u8]);
                hasher.update((t.len() as u64).to_le_bytes());
                hasher.update(t);
            }
            ValueRef::Blob(b) => {
                hasher.update([4u8]);
                hasher.update((b.len() as u64).to_le_bytes());
                hasher.update(b);
            }
        }
        count += 1;
    }

    Ok(Fingerprint {
        rows: count,
        digest: hex::encode(hasher.finalize()),
    })
}
