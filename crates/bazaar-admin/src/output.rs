use anyhow::Result;
use bazaar_types::{
    FkViolation, MigrationResult, ResetSummary, SchemaReport, SeedSummary, VerifyResult,
};
use serde::Serialize;

/// Print `value` as pretty JSON, or through `text` otherwise.
pub fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text(value);
    }
    Ok(())
}

pub fn migrations(results: &[MigrationResult]) {
    for r in results {
        println!("{:<48} {:<16} {}", r.step, r.status.to_string(), r.detail);
    }
}

pub fn reset(summary: &ResetSummary) {
    for (reference, count) in &summary.references_cleared {
        println!("cleared  {:<24} {}", reference, count);
    }
    for (table, count) in &summary.rows_deleted {
        println!("deleted  {:<24} {}", table, count);
    }
    println!(
        "total    {:<24} {} ({} ms)",
        "",
        summary.total_deleted(),
        (summary.finished_at - summary.started_at).num_milliseconds()
    );
}

pub fn seed(summary: &SeedSummary) {
    for user in &summary.users {
        println!("user     {:<24} {}", user.email, user.id);
    }
    for product in &summary.products {
        println!("product  {:<24} seller {}", product.category, product.seller_id);
    }
    println!("inserted {} new rows", summary.inserted);
}

#[derive(Serialize)]
pub struct VerifyReport {
    #[serde(flatten)]
    pub empty: VerifyResult,
    pub foreign_key_violations: Vec<FkViolation>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.empty.all_clear && self.foreign_key_violations.is_empty()
    }
}

pub fn verify(report: &VerifyReport) {
    for (table, count) in &report.empty.counts {
        let mark = if *count == 0 { "ok" } else { "ROWS" };
        println!("{:<5} {:<16} {}", mark, table, count);
    }
    for table in &report.empty.missing {
        println!("{:<5} {:<16} missing", "MISS", table);
    }
    for v in &report.foreign_key_violations {
        let rowid = v.rowid.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
        println!("{:<5} {:<16} row {} -> {}", "FK", v.table, rowid, v.parent);
    }
    println!("{}", if report.passed() { "all clear" } else { "NOT clear" });
}

pub fn schema(report: &SchemaReport) {
    for table in &report.tables {
        match table.row_count {
            Some(rows) if table.exists => println!("{} ({} rows)", table.name, rows),
            _ => println!("{} (missing)", table.name),
        }
        for c in &table.columns {
            println!(
                "    {:<16} {:<10}{}{}",
                c.name,
                c.data_type,
                if c.not_null { " not null" } else { "" },
                if c.primary_key { " primary key" } else { "" }
            );
        }
    }
}
