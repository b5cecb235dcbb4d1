//! Read-only post-condition checks.
//!
//! Nothing here writes. Row counts and missing tables come back as data;
//! only failures to reach the database are errors.

use std::collections::BTreeMap;

use bazaar_types::{ColumnReport, FkViolation, SchemaReport, TableReport, VerifyResult};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::Database;
use crate::error::{Result, TableContext};
use crate::schema::{Table, quote_ident};

impl Database {
    /// Count the rows of each table; clear only if every count is zero.
    pub fn verify_empty(&self, tables: &[Table]) -> Result<VerifyResult> {
        self.with_conn(|conn| verify_empty_in(conn, tables))
    }

    pub fn verify_column_presence(&self, table: &str, column: &str) -> Result<bool> {
        self.with_conn(|conn| column_exists(conn, table, column).on_table(table))
    }

    pub fn foreign_key_violations(&self) -> Result<Vec<FkViolation>> {
        self.with_conn(foreign_key_violations_in)
    }

    pub fn inspect(&self) -> Result<SchemaReport> {
        self.with_conn(inspect_in)
    }
}

pub fn verify_empty_in(conn: &Connection, tables: &[Table]) -> Result<VerifyResult> {
    let mut counts = BTreeMap::new();
    let mut missing = Vec::new();

    for &table in tables {
        let name = table.name();
        if !table_exists(conn, name).on_table(name)? {
            missing.push(name.to_string());
            continue;
        }
        counts.insert(name.to_string(), count_rows(conn, name).on_table(name)?);
    }

    let result = VerifyResult::from_counts(counts, missing);
    if result.all_clear {
        info!("Verify: {} tables empty", tables.len());
    } else {
        for (table, count) in result.non_empty() {
            warn!("Verify: {} still holds {} rows", table, count);
        }
        for table in &result.missing {
            warn!("Verify: {} does not exist", table);
        }
    }
    Ok(result)
}

/// Every row whose foreign key has no parent.
pub fn foreign_key_violations_in(conn: &Connection) -> Result<Vec<FkViolation>> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FkViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn inspect_in(conn: &Connection) -> Result<SchemaReport> {
    let mut tables = Vec::with_capacity(Table::ALL.len());

    for table in Table::ALL {
        let name = table.name();
        if !table_exists(conn, name).on_table(name)? {
            tables.push(TableReport {
                name: name.to_string(),
                exists: false,
                row_count: None,
                columns: vec![],
            });
            continue;
        }

        let mut stmt = conn
            .prepare(r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?1)"#)
            .on_table(name)?;
        let columns = stmt
            .query_map([name], |row| {
                Ok(ColumnReport {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    primary_key: row.get::<_, i64>(3)? != 0,
                })
            })
            .on_table(name)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .on_table(name)?;

        tables.push(TableReport {
            name: name.to_string(),
            exists: true,
            row_count: Some(count_rows(conn, name).on_table(name)?),
            columns,
        });
    }

    Ok(SchemaReport { tables })
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE)",
        [table],
        |row| row.get(0),
    )
}

/// Identifiers compare case-insensitively, as SQLite resolves them.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE)",
        [table, column],
        |row| row.get(0),
    )
}

pub fn index_exists(conn: &Connection, index: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1 COLLATE NOCASE)",
        [index],
        |row| row.get(0),
    )
}

pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
