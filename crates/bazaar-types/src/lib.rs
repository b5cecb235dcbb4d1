pub mod models;
pub mod reports;

pub use models::{SeedSummary, SeededProduct, SeededUser};
pub use reports::{
    ColumnReport, FkViolation, MigrationResult, MigrationStatus, ResetSummary, SchemaReport,
    TableReport, VerifyResult,
};
