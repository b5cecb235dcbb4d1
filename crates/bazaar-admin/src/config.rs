use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bazaar_db::seed::{DEFAULT_CATEGORIES, DEFAULT_SEED_PASSWORD};
use bazaar_db::{DbConfig, SeedConfig, TlsMode};

pub struct AdminConfig {
    pub db: DbConfig,
    pub seed: SeedConfig,
}

impl AdminConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut db = DbConfig::new(get("BAZAAR_DB_PATH").unwrap_or_else(|| "bazaar.db".into()));
        db.connect_timeout = secs(&get, "BAZAAR_CONNECT_TIMEOUT_SECS", 5)?;
        db.idle_timeout = secs(&get, "BAZAAR_IDLE_TIMEOUT_SECS", 300)?;
        db.tls = match get("BAZAAR_TLS_MODE") {
            Some(mode) => mode
                .parse::<TlsMode>()
                .map_err(|e| anyhow!(e))
                .context("BAZAAR_TLS_MODE")?,
            None => TlsMode::Disable,
        };

        let categories = get("BAZAAR_SEED_CATEGORIES")
            .map(|raw| parse_categories(&raw))
            .unwrap_or_else(|| DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect());
        let password =
            get("BAZAAR_SEED_PASSWORD").unwrap_or_else(|| DEFAULT_SEED_PASSWORD.into());

        Ok(Self {
            db,
            seed: SeedConfig {
                categories,
                password,
            },
        })
    }
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let value = match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds", key))?,
        None => default,
    };
    Ok(Duration::from_secs(value))
}

/// Comma-separated, blanks dropped, order kept.
fn parse_categories(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}
