//! Process configuration, read once from the environment.
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `STOCKBOOK_STORE` | `memory` | `memory` or `postgres` |
//! | `DATABASE_URL` | | required when the store is `postgres` |
//! | `DATABASE_MAX_CONNECTIONS` | `5` | pool size |
//! | `STOCKBOOK_PO_CODE_ATTEMPTS` | `5` | purchase order code retries |

use std::str::FromStr;

use anyhow::{Context, anyhow, bail};

use stockbook_infra::DEFAULT_CODE_ATTEMPTS;

pub const STORE_VAR: &str = "STOCKBOOK_STORE";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "DATABASE_MAX_CONNECTIONS";
pub const CODE_ATTEMPTS_VAR: &str = "STOCKBOOK_PO_CODE_ATTEMPTS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreKind {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "postgres" => Ok(StoreKind::Postgres),
            other => Err(anyhow!("unknown store {other:?}; expected memory or postgres")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub store: StoreKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub code_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Settings::default();

        let store = match lookup(STORE_VAR) {
            Some(value) => value.parse().with_context(|| format!("invalid {STORE_VAR}"))?,
            None => defaults.store,
        };

        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());
        if store == StoreKind::Postgres && database_url.is_none() {
            bail!("{DATABASE_URL_VAR} must be set when {STORE_VAR}=postgres");
        }

        let max_connections = parse_positive(&lookup, MAX_CONNECTIONS_VAR, defaults.max_connections)?;
        let code_attempts = parse_positive(&lookup, CODE_ATTEMPTS_VAR, defaults.code_attempts)?;

        Ok(Self {
            store,
            database_url,
            max_connections,
            code_attempts,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow!("{DATABASE_URL_VAR} is not set"))
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> anyhow::Result<u32> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got {raw:?}"))?;
    if value == 0 {
        bail!("{key} must be at least 1");
    }
    Ok(value)
}
