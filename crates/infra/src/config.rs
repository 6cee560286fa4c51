//! Configuration loading and representation.

use anyhow::{Context, bail};

pub const STORE_ENV: &str = "STOCKLEDGER_STORE";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_ENV: &str = "DATABASE_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Which store backs the services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreConfig {
    /// Process-local store; state is lost on exit.
    #[default]
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let backend = lookup(STORE_ENV).unwrap_or_else(|| "memory".to_string());
        match backend.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(StoreConfig::Memory),
            "postgres" => {
                let database_url = lookup(DATABASE_URL_ENV)
                    .filter(|url| !url.trim().is_empty())
                    .with_context(|| format!("{DATABASE_URL_ENV} must be set when {STORE_ENV}=postgres"))?;
                let max_connections = match lookup(MAX_CONNECTIONS_ENV) {
                    Some(raw) => raw
                        .trim()
                        .parse::<u32>()
                        .with_context(|| format!("{MAX_CONNECTIONS_ENV} must be a positive integer, got '{raw}'"))?,
                    None => DEFAULT_MAX_CONNECTIONS,
                };
                if max_connections == 0 {
                    bail!("{MAX_CONNECTIONS_ENV} must be at least 1");
                }
                Ok(StoreConfig::Postgres {
                    database_url,
                    max_connections,
                })
            }
            other => bail!("{STORE_ENV} must be 'memory' or 'postgres', got '{other}'"),
        }
    }
}
