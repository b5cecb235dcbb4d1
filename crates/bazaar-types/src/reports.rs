use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Migrations --

/// Outcome of a single schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// The catalog already had the target shape; nothing was written.
    AlreadyCurrent,
    /// The delta was applied and committed.
    Migrated,
    /// Neither the legacy nor the target shape was found. Requires manual repair.
    SchemaCorrupt,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::AlreadyCurrent => f.write_str("already current"),
            MigrationStatus::Migrated => f.write_str("migrated"),
            MigrationStatus::SchemaCorrupt => f.write_str("schema corrupt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub step: String,
    pub table: String,
    pub status: MigrationStatus,
    pub detail: String,
}

impl MigrationResult {
    pub fn new(
        step: impl Into<String>,
        table: impl Into<String>,
        status: MigrationStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            table: table.into(),
            status,
            detail: detail.into(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        self.status == MigrationStatus::SchemaCorrupt
    }
}

// -- Reset --

/// Per-table counts captured by a committed reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetSummary {
    /// Rows counted immediately before each table's delete.
    pub rows_deleted: BTreeMap<String, u64>,
    /// Nullable references set to NULL, keyed as `table.column`.
    pub references_cleared: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ResetSummary {
    pub fn total_deleted(&self) -> u64 {
        self.rows_deleted.values().sum()
    }
}

// -- Verification --

/// Result of an emptiness check. A table holding rows is data, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub counts: BTreeMap<String, u64>,
    /// Requested tables that are not present in the catalog.
    pub missing: Vec<String>,
    pub all_clear: bool,
}

impl VerifyResult {
    pub fn from_counts(counts: BTreeMap<String, u64>, missing: Vec<String>) -> Self {
        let all_clear = missing.is_empty() && counts.values().all(|&c| c == 0);
        Self {
            counts,
            missing,
            all_clear,
        }
    }

    /// Tables that still hold rows, with their counts.
    pub fn non_empty(&self) -> Vec<(&str, u64)> {
        self.counts
            .iter()
            .filter(|(_, c)| **c > 0)
            .map(|(t, c)| (t.as_str(), *c))
            .collect()
    }
}

/// A row whose foreign key points at a parent that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FkViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
}

// -- Inspection --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaReport {
    pub tables: Vec<TableReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub name: String,
    pub exists: bool,
    pub row_count: Option<u64>,
    pub columns: Vec<ColumnReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnReport {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub primary_key: bool,
}
