use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Failures surfaced by lifecycle operations.
///
/// A table that still holds rows after a reset is not an error: the
/// verifier reports it as data (`VerifyResult::all_clear == false`).
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// No session could be acquired. Never retried here.
    #[error("connection error: {0}")]
    Connection(String),

    /// Neither the legacy nor the target shape exists. Needs manual repair.
    #[error("schema corrupt on `{table}`: {detail}")]
    SchemaCorrupt { table: String, detail: String },

    #[error("constraint violation on `{table}`: {detail}")]
    ConstraintViolation { table: String, detail: String },

    #[error("storage error on `{table}`: {source}")]
    Storage {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("reset interrupted at `{table}`: {reason}")]
    Interrupted { table: String, reason: String },

    #[error("operation cancelled before its transaction began")]
    Cancelled,

    #[error("non-nullable foreign keys form a cycle through: {0}")]
    CyclicDependency(String),

    #[error("cannot assign sellers to {categories} categories: seller list is empty")]
    EmptySellers { categories: usize },

    #[error("seed failed: {0}")]
    Seed(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl LifecycleError {
    /// Classify a storage error raised while processing `table`.
    pub fn from_sqlite(table: &str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, msg)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                LifecycleError::ConstraintViolation {
                    table: table.to_string(),
                    detail: msg.clone().unwrap_or_else(|| failure.to_string()),
                }
            }
            _ => LifecycleError::Storage {
                table: table.to_string(),
                source: err,
            },
        }
    }

    /// The table being processed when the error was raised, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            LifecycleError::SchemaCorrupt { table, .. }
            | LifecycleError::ConstraintViolation { table, .. }
            | LifecycleError::Storage { table, .. }
            | LifecycleError::Interrupted { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Tags rusqlite results with the table they were operating on.
pub(crate) trait TableContext<T> {
    fn on_table(self, table: &str) -> Result<T>;
}

impl<T> TableContext<T> for std::result::Result<T, rusqlite::Error> {
    fn on_table(self, table: &str) -> Result<T> {
        self.map_err(|e| LifecycleError::from_sqlite(table, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn foreign_key_failure_is_constraint_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn.execute_batch(
            "CREATE TABLE parent (id TEXT PRIMARY KEY);
             CREATE TABLE child (id TEXT PRIMARY KEY, parent_id TEXT NOT NULL REFERENCES parent(id));",
        )
        .unwrap();

        let err = conn
            .execute("INSERT INTO child (id, parent_id) VALUES ('c1', 'missing')", [])
            .on_table("child")
            .unwrap_err();

        assert!(matches!(err, LifecycleError::ConstraintViolation { .. }));
        assert_eq!(err.table(), Some("child"));
    }

    #[test]
    fn other_failures_are_storage_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn
            .execute("DELETE FROM nowhere", [])
            .on_table("nowhere")
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Storage { .. }));
        assert_eq!(err.table(), Some("nowhere"));
    }
}
