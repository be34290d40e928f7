use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_SQLITE_PATH: &str = "registry.db";
const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: u32 = 5000;
const DEFAULT_SQLITE_CONNECTIONS: u32 = 4;
const DEFAULT_PG_CONNECTIONS: u32 = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Unknown database backend: {0}")]
    UnknownBackend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Sqlite {
        path: PathBuf,
        busy_timeout_ms: u32,
        max_connections: u32,
    },
    Postgres {
        url: String,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Bearer token required by the API key management routes. Those routes
    /// are disabled when unset.
    pub admin_token: Option<String>,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = lookup("DATABASE_BACKEND").unwrap_or_else(|| "sqlite".to_string());
        let database = match backend.to_lowercase().as_str() {
            "sqlite" => DatabaseConfig::Sqlite {
                path: lookup("SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
                busy_timeout_ms: parse_or(&lookup, "SQLITE_BUSY_TIMEOUT_MS", DEFAULT_SQLITE_BUSY_TIMEOUT_MS)?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_SQLITE_CONNECTIONS)?,
            },
            "postgres" | "postgresql" => DatabaseConfig::Postgres {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_PG_CONNECTIONS)?,
                statement_timeout_ms: parse_optional(&lookup, "DB_STATEMENT_TIMEOUT_MS")?,
            },
            _ => return Err(ConfigError::UnknownBackend(backend)),
        };

        Ok(Config {
            database,
            admin_token: lookup("ADMIN_TOKEN").filter(|token| !token.is_empty()),
        })
    }
}

fn parse_optional<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: value.clone() })
        })
        .transpose()
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    Ok(parse_optional(lookup, key)?.unwrap_or(default))
}
