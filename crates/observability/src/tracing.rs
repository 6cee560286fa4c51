//! Tracing/logging initialization.

use std::str::FromStr;

use anyhow::bail;
use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_ENV: &str = "STOCKLEDGER_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => bail!("{LOG_FORMAT_ENV} must be 'json' or 'text', got '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives; `None` means `info`.
    pub filter: Option<String>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let format = match lookup(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };
        Ok(Self {
            filter: lookup(EnvFilter::DEFAULT_ENV).filter(|f| !f.trim().is_empty()),
            format,
        })
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize tracing/logging for the process from `RUST_LOG` and
/// `STOCKLEDGER_LOG_FORMAT`. An unreadable format falls back to JSON.
pub fn init() {
    let config = LogConfig::from_env().unwrap_or_default();
    init_with(&config);
}

/// Install the global subscriber. Returns `false` when one was already set.
pub fn init_with(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    match config.format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Text => builder.try_init().is_ok(),
    }
}
