//! Configuration loading from the process environment.
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `AUTH_ISSUER` | yes | |
//! | `API_AUDIENCE` | yes | |
//! | `DATABASE_URL` | no | in-memory store |
//! | `CLIENT_SECRET` | no | |
//! | `BIND_ADDR` | no | `0.0.0.0:8080` |
//! | `JWKS_CACHE_TTL_SECS` | no | `3600` |
//! | `AUTH_LEEWAY_SECS` | no | `0` |
//! | `DATABASE_MAX_CONNECTIONS` | no | `5` |

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Token issuer, e.g. `https://tenant.eu.auth0.com/`.
    pub auth_issuer: String,
    pub api_audience: String,
    /// Only used by the externally handled login flow.
    pub client_secret: Option<String>,
    pub bind_addr: SocketAddr,
    pub jwks_cache_ttl: Duration,
    pub auth_leeway_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (tests inject a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let auth_issuer = var("AUTH_ISSUER").ok_or(ConfigError::Missing("AUTH_ISSUER"))?;
        if !auth_issuer.starts_with("https://") && !auth_issuer.starts_with("http://") {
            return Err(ConfigError::Invalid {
                name: "AUTH_ISSUER",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        Ok(Self {
            database_url: var("DATABASE_URL").map(normalize_database_url),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", var("DATABASE_MAX_CONNECTIONS"), 5)?,
            auth_issuer,
            api_audience: var("API_AUDIENCE").ok_or(ConfigError::Missing("API_AUDIENCE"))?,
            client_secret: var("CLIENT_SECRET"),
            bind_addr: parse_or("BIND_ADDR", var("BIND_ADDR"), SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            jwks_cache_ttl: Duration::from_secs(parse_or("JWKS_CACHE_TTL_SECS", var("JWKS_CACHE_TTL_SECS"), 3600)?),
            auth_leeway_secs: parse_or("AUTH_LEEWAY_SECS", var("AUTH_LEEWAY_SECS"), 0)?,
        })
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("database_max_connections", &self.database_max_connections)
            .field("auth_issuer", &self.auth_issuer)
            .field("api_audience", &self.api_audience)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("auth_leeway_secs", &self.auth_leeway_secs)
            .finish()
    }
}

/// Hosted Postgres providers still hand out the legacy `postgres://` scheme.
fn normalize_database_url(url: String) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url,
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
