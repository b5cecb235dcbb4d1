pub mod error;
pub mod migrations;
pub mod reset;
pub mod schema;
pub mod seed;
pub mod verify;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, info, warn};

pub use error::{LifecycleError, Result};
pub use migrations::{MigrationStep, Migrator};
pub use reset::{ResetEngine, ResetHook};
pub use schema::{ForeignKey, PlanStep, Table};
pub use seed::SeedConfig;

const MEMORY_PATH: &str = ":memory:";

/// Transport security requested by the caller.
///
/// SQLite databases are local files, so only `Disable` has an effect;
/// other modes are accepted and logged so the same configuration can be
/// shared with networked deployments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    #[default]
    Disable,
    Require,
    VerifyFull,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disable" | "off" | "false" => Ok(TlsMode::Disable),
            "require" => Ok(TlsMode::Require),
            "verify-full" | "verify_full" => Ok(TlsMode::VerifyFull),
            other => Err(format!("unknown TLS mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Applied as SQLite's busy timeout.
    pub connect_timeout: Duration,
    /// A file-backed connection idle for longer than this is reopened on the next acquire.
    pub idle_timeout: Duration,
    pub tls: TlsMode,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            tls: TlsMode::Disable,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    pub fn is_memory(&self) -> bool {
        self.path == Path::new(MEMORY_PATH)
    }
}

/// Shared flag checked before each transaction begins. Never consulted mid-transaction.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(LifecycleError::Cancelled);
        }
        Ok(())
    }
}

struct Slot {
    conn: Connection,
    last_used: Instant,
}

/// Connection provider for lifecycle operations.
///
/// A single writer connection guarded by a mutex: lifecycle operations are
/// serialized by the caller, so there is no reader pool.
pub struct Database {
    config: DbConfig,
    slot: Mutex<Slot>,
}

impl Database {
    pub fn open(config: DbConfig) -> Result<Self> {
        if config.tls != TlsMode::Disable {
            warn!(
                "TLS mode {:?} ignored: {} is a local SQLite database",
                config.tls,
                config.path.display()
            );
        }

        let conn = connect(&config)?;

        info!("Database opened at {}", config.path.display());
        Ok(Self {
            config,
            slot: Mutex::new(Slot {
                conn,
                last_used: Instant::now(),
            }),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(DbConfig::in_memory())
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Acquire the connection for one top-level operation.
    pub fn session(&self) -> Result<Session<'_>> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| LifecycleError::Connection(format!("connection lock poisoned: {}", e)))?;

        if !self.config.is_memory() && slot.last_used.elapsed() > self.config.idle_timeout {
            debug!(
                "Connection idle for {:?}, reopening {}",
                slot.last_used.elapsed(),
                self.config.path.display()
            );
            slot.conn = connect(&self.config)?;
        }

        Ok(Session { guard: Some(slot) })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let session = self.session()?;
        f(session.conn()?)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut session = self.session()?;
        f(session.conn_mut()?)
    }
}

/// A held connection. Released on drop; `release` may be called any number of times.
pub struct Session<'a> {
    guard: Option<MutexGuard<'a, Slot>>,
}

impl Session<'_> {
    pub fn conn(&self) -> Result<&Connection> {
        self.guard
            .as_ref()
            .map(|slot| &slot.conn)
            .ok_or_else(released)
    }

    pub fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.guard
            .as_mut()
            .map(|slot| &mut slot.conn)
            .ok_or_else(released)
    }

    pub fn release(&mut self) {
        if let Some(mut slot) = self.guard.take() {
            slot.last_used = Instant::now();
        }
    }

    pub fn is_released(&self) -> bool {
        self.guard.is_none()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

fn released() -> LifecycleError {
    LifecycleError::Connection("session already released".into())
}

fn connect(config: &DbConfig) -> Result<Connection> {
    let location = config.path.display();
    let conn = Connection::open(&config.path)
        .map_err(|e| LifecycleError::Connection(format!("cannot open {}: {}", location, e)))?;

    let setup = || -> rusqlite::Result<()> {
        conn.busy_timeout(config.connect_timeout)?;
        if !config.is_memory() {
            // WAL mode for concurrent readers from the application
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    };
    setup().map_err(|e| LifecycleError::Connection(format!("cannot configure {}: {}", location, e)))?;

    Ok(conn)
}
