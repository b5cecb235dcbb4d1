mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bazaar_db::{CancelFlag, Database, Migrator, ResetEngine, Table};

use crate::config::AdminConfig;
use crate::output::VerifyReport;

const DEFAULT_VERIFY_TABLES: [Table; 3] = [Table::Messages, Table::Chats, Table::CartItems];

#[derive(Parser)]
#[command(name = "bazaar-admin")]
#[command(about = "Schema and data lifecycle tooling for the campus marketplace database")]
#[command(version)]
struct Cli {
    /// Database file (overrides BAZAAR_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the schema up to date
    Migrate {
        /// Insert sample data if the users table is empty
        #[arg(long)]
        seed: bool,
    },
    /// Delete all application data in one transaction
    Reset {
        /// Insert sample data after the reset commits
        #[arg(long)]
        reseed: bool,

        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
    /// Insert sample users and one product per category
    Seed,
    /// Check that tables are empty and no foreign key dangles
    Verify {
        /// Tables to check (default: messages chats cart_items)
        tables: Vec<Table>,
    },
    /// Check whether a column exists
    HasColumn { table: String, column: String },
    /// Show tables, columns and row counts
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_admin=info,bazaar_db=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Config
    let mut config = AdminConfig::from_env()?;
    if let Some(path) = cli.db {
        config.db.path = path;
    }

    if let Command::Reset { yes: false, .. } = cli.command {
        eprintln!("FATAL: reset deletes every row in {}.", config.db.path.display());
        eprintln!("       Re-run with --yes to confirm.");
        std::process::exit(1);
    }

    let db = Arc::new(Database::open(config.db.clone())?);

    // Ctrl+C is honoured between transactions only
    let cancel = CancelFlag::default();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping before the next transaction");
            on_signal.cancel();
        }
    });

    let json = cli.json;
    match cli.command {
        Command::Migrate { seed } => {
            let results = blocking({
                let (db, cancel) = (db.clone(), cancel.clone());
                move || Migrator::standard().run(&db, &cancel)
            })
            .await?;
            output::emit(json, &results, |r| output::migrations(r))?;

            if seed {
                let seed_config = config.seed.clone();
                let seeded = blocking(move || db.seed_if_empty(&seed_config)).await?;
                match seeded {
                    Some(summary) => output::emit(json, &summary, output::seed)?,
                    None => info!("Users already present, skipped seeding"),
                }
            }
        }
        Command::Reset { reseed, .. } => {
            warn!("Deleting every row in {}", db.config().path.display());
            let summary = blocking({
                let (db, cancel) = (db.clone(), cancel.clone());
                move || ResetEngine::standard()?.run(&db, &cancel)
            })
            .await?;
            output::emit(json, &summary, output::reset)?;

            if reseed {
                if cancel.is_cancelled() {
                    warn!("Interrupted after reset committed, skipping reseed");
                    return Ok(());
                }
                let seed_config = config.seed.clone();
                let seeded = blocking(move || db.reseed(&seed_config)).await?;
                output::emit(json, &seeded, output::seed)?;
            }
        }
        Command::Seed => {
            let seed_config = config.seed.clone();
            let seeded = blocking(move || db.reseed(&seed_config)).await?;
            output::emit(json, &seeded, output::seed)?;
        }
        Command::Verify { tables } => {
            let tables = if tables.is_empty() {
                DEFAULT_VERIFY_TABLES.to_vec()
            } else {
                tables
            };
            let report = blocking(move || {
                Ok(VerifyReport {
                    empty: db.verify_empty(&tables)?,
                    foreign_key_violations: db.foreign_key_violations()?,
                })
            })
            .await?;
            output::emit(json, &report, output::verify)?;

            if !report.passed() {
                std::process::exit(2);
            }
        }
        Command::HasColumn { table, column } => {
            let present = blocking({
                let (table, column) = (table.clone(), column.clone());
                move || db.verify_column_presence(&table, &column)
            })
            .await?;
            let value = serde_json::json!({ "table": table, "column": column, "present": present });
            output::emit(json, &value, |_| {
                println!("{}.{}: {}", table, column, if present { "present" } else { "absent" })
            })?;

            if !present {
                std::process::exit(2);
            }
        }
        Command::Inspect => {
            let report = blocking(move || db.inspect()).await?;
            output::emit(json, &report, output::schema)?;
        }
    }

    Ok(())
}

/// Run blocking database work off the async runtime.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> bazaar_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .context("database task panicked")??;
    Ok(result)
}
