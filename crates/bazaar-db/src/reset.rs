use std::collections::BTreeMap;

use bazaar_types::ResetSummary;
use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::error::{LifecycleError, Result, TableContext};
use crate::schema::{PlanStep, standard_plan};
use crate::verify::count_rows;
use crate::{CancelFlag, Database};

/// Observer called inside the reset transaction after every plan step.
///
/// Returning `Err` aborts the reset and rolls everything back.
pub trait ResetHook {
    fn after_step(&mut self, conn: &Connection, step: &PlanStep) -> std::result::Result<(), String>;
}

struct NoHook;

impl ResetHook for NoHook {
    fn after_step(&mut self, _conn: &Connection, _step: &PlanStep) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl Database {
    /// Wipe every table in dependency order as one transaction.
    pub fn reset_all(&self) -> Result<ResetSummary> {
        ResetEngine::standard()?.run(self, &CancelFlag::default())
    }
}

/// Deletes all application rows without ever breaking foreign-key closure.
#[derive(Debug, Clone)]
pub struct ResetEngine {
    plan: Vec<PlanStep>,
}

impl ResetEngine {
    pub fn standard() -> Result<Self> {
        Ok(Self {
            plan: standard_plan()?,
        })
    }

    /// Run an explicit plan instead of the derived one.
    pub fn with_plan(plan: Vec<PlanStep>) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &[PlanStep] {
        &self.plan
    }

    pub fn run(&self, db: &Database, cancel: &CancelFlag) -> Result<ResetSummary> {
        self.run_with_hook(db, cancel, &mut NoHook)
    }

    pub fn run_with_hook(
        &self,
        db: &Database,
        cancel: &CancelFlag,
        hook: &mut dyn ResetHook,
    ) -> Result<ResetSummary> {
        cancel.check()?;

        let mut session = db.session()?;
        let summary = reset_in_transaction(session.conn_mut()?, &self.plan, hook)
            .inspect_err(|e| warn!("Reset rolled back: {}", e))?;
        session.release();

        info!(
            "Reset complete: {} rows deleted across {} tables",
            summary.total_deleted(),
            summary.rows_deleted.len()
        );
        Ok(summary)
    }
}

fn reset_in_transaction(
    conn: &mut Connection,
    plan: &[PlanStep],
    hook: &mut dyn ResetHook,
) -> Result<ResetSummary> {
    let started_at = Utc::now();
    let mut rows_deleted = BTreeMap::new();
    let mut references_cleared = BTreeMap::new();

    // Write lock held from BEGIN so each count matches what its delete removes
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for step in plan {
        let table = step.table().name();
        match step {
            PlanStep::ClearReference { column, .. } => {
                let cleared = tx.execute(&step.sql(), []).on_table(table)?;
                debug!("Cleared {} references in {}.{}", cleared, table, column);
                references_cleared.insert(format!("{}.{}", table, column), cleared as u64);
            }
            PlanStep::Delete(_) => {
                let count = count_rows(&tx, table).on_table(table)?;
                tx.execute(&step.sql(), []).on_table(table)?;
                debug!("Deleted {} rows from {}", count, table);
                rows_deleted.insert(table.to_string(), count);
            }
        }

        hook.after_step(&tx, step)
            .map_err(|reason| LifecycleError::Interrupted {
                table: table.to_string(),
                reason,
            })?;
    }

    tx.commit()?;

    Ok(ResetSummary {
        rows_deleted,
        references_cleared,
        started_at,
        finished_at: Utc::now(),
    })
}
