//! Environment configuration
//!
//! Every setting comes from an environment variable, optionally seeded from a
//! `.env` file by the binary. Command-line flags override individual values
//! after loading.

use crate::oracle::DEFAULT_MODEL;
use crate::runtime::RuntimeConfig;
use crate::state_machine::state::DEFAULT_MAX_TOOL_ROUNDS;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// `AGENT_DB_PATH` value that selects the in-memory store
pub const MEMORY_DB: &str = ":memory:";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ORACLE_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_QUOTE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Where quote prices come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteSourceKind {
    #[default]
    Static,
    AlphaVantage,
}

impl FromStr for QuoteSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" => Ok(QuoteSourceKind::Static),
            "alphavantage" | "alpha_vantage" => Ok(QuoteSourceKind::AlphaVantage),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub oracle_model: String,
    pub oracle_base_url: Option<String>,
    pub oracle_timeout: Duration,
    pub oracle_max_attempts: u32,
    pub max_tool_rounds: u32,
    pub quote_source: QuoteSourceKind,
    pub alphavantage_api_key: Option<String>,
    pub quote_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        Ok(Self {
            db_path: get("AGENT_DB_PATH").unwrap_or_else(default_db_path),
            port: parse(&get, "AGENT_PORT")?.unwrap_or(DEFAULT_PORT),
            openai_api_key: get("OPENAI_API_KEY"),
            oracle_model: get("ORACLE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            oracle_base_url: get("ORACLE_BASE_URL"),
            oracle_timeout: Duration::from_secs(
                parse(&get, "ORACLE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_ORACLE_TIMEOUT_SECS),
            ),
            oracle_max_attempts: parse(&get, "ORACLE_MAX_ATTEMPTS")?
                .unwrap_or(DEFAULT_ORACLE_MAX_ATTEMPTS),
            max_tool_rounds: parse(&get, "MAX_TOOL_ROUNDS")?.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
            quote_source: parse(&get, "QUOTE_SOURCE")?.unwrap_or_default(),
            alphavantage_api_key: get("ALPHAVANTAGE_API_KEY"),
            quote_timeout: Duration::from_secs(
                parse(&get, "QUOTE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_QUOTE_TIMEOUT_SECS),
            ),
        })
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_tool_rounds: self.max_tool_rounds,
            oracle_timeout: self.oracle_timeout,
            oracle_max_attempts: self.oracle_max_attempts.max(1),
            ..RuntimeConfig::default()
        }
    }

    pub fn uses_memory_store(&self) -> bool {
        self.db_path == MEMORY_DB
    }

    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    pub fn require_alphavantage_key(&self) -> Result<&str, ConfigError> {
        self.alphavantage_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("ALPHAVANTAGE_API_KEY"))
    }
}

fn parse<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home)
        .join(".approval-agent")
        .join("checkpoints.db")
        .to_string_lossy()
        .into_owned()
}
