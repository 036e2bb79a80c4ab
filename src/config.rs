//! Service configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Parsing goes through a lookup closure so tests can feed a map instead of
//! mutating process-global environment. `Config::from_env` is the only entry
//! point `main` uses; it reads `.env` first via `dotenvy`.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BLOB_ROOT: &str = "./data/blobs";
pub const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 256 * 1024;
pub const DEFAULT_PASSWORD_RESET_TTL_MINUTES: i64 = 60;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24 * 30;
pub const MAX_PASSWORD_RESET_TTL_MINUTES: i64 = 60 * 24 * 7;
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
pub const DEFAULT_REGION: &str = "global";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which document/identity backend the service talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Postgres { database_url: String, max_connections: u32 },
    Memory,
}

/// Credentials for the Resend mail API. Absent means mail is logged only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendConfig {
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub backend: BackendKind,
    pub blob_root: PathBuf,
    /// Origin used to build blob download URLs and reset links.
    pub public_base_url: String,
    pub upload_chunk_bytes: usize,
    pub resend: Option<ResendConfig>,
    pub password_reset_ttl: time::Duration,
    pub session_ttl: time::Duration,
    pub cookie_secure: bool,
    /// Region assigned to users without a team.
    pub default_region: String,
}

impl Config {
    /// Build config from the process environment (after loading `.env`).
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or a value fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;

        let backend = match lookup("LEADFLOW_BACKEND").as_deref().map(str::trim) {
            Some("memory") => BackendKind::Memory,
            None | Some("" | "postgres") => BackendKind::Postgres {
                database_url: lookup("DATABASE_URL")
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            },
            Some(other) => return Err(ConfigError::Invalid { key: "LEADFLOW_BACKEND", value: other.to_owned() }),
        };

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let resend = match (lookup("RESEND_API_KEY"), lookup("RESEND_FROM")) {
            (Some(api_key), Some(from)) if !api_key.is_empty() && !from.is_empty() => {
                Some(ResendConfig { api_key, from })
            }
            _ => None,
        };

        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key: "COOKIE_SECURE", value: raw })?,
            None => public_base_url.starts_with("https://"),
        };

        Ok(Self {
            port,
            backend,
            blob_root: lookup("BLOB_ROOT").map_or_else(|| PathBuf::from(DEFAULT_BLOB_ROOT), PathBuf::from),
            public_base_url,
            upload_chunk_bytes: parse_or(&lookup, "UPLOAD_CHUNK_BYTES", DEFAULT_UPLOAD_CHUNK_BYTES)?.max(1),
            resend,
            password_reset_ttl: time::Duration::minutes(parse_ttl(
                &lookup,
                "PASSWORD_RESET_TTL_MINUTES",
                DEFAULT_PASSWORD_RESET_TTL_MINUTES,
                MAX_PASSWORD_RESET_TTL_MINUTES,
            )?),
            session_ttl: time::Duration::hours(parse_ttl(
                &lookup,
                "SESSION_TTL_HOURS",
                DEFAULT_SESSION_TTL_HOURS,
                MAX_SESSION_TTL_HOURS,
            )?),
            cookie_secure,
            default_region: lookup("DEFAULT_REGION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_owned()),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

/// A lifetime in `1..=max` units.
fn parse_ttl(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let value = parse_or(lookup, key, default)?;
    if !(1..=max).contains(&value) {
        return Err(ConfigError::Invalid { key, value: value.to_string() });
    }
    Ok(value)
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
