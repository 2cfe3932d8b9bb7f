//! Server Configuration
//!
//! Everything comes from environment variables with working defaults, so a
//! bare `cargo run` starts a usable server against a local SQLite file.

use std::env;
use std::time::Duration;

use crate::backend::error::BackendError;

/// Runtime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// SQLite connection string, e.g. `sqlite://data/pdfpals.db`.
    pub database_url: String,
    /// TCP port for the HTTP/WebSocket listener.
    pub port: u16,
    /// Sizing hint for the in-memory eviction thresholds: the high water
    /// mark is 10x this value, the post-trim size 5x.
    pub per_page_target: usize,
    /// How often the background sweep flushes dirty rooms to the store.
    pub flush_interval: Duration,
}

impl ServerConfig {
    /// Read configuration from the environment. A variable that is present
    /// but unparseable is a hard startup error, not a silent default.
    pub fn from_env() -> Result<Self, BackendError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/pdfpals.db".to_string());

        let port = parse_var("SERVER_PORT", 3001)?;
        let per_page_target = parse_var("PER_PAGE_TARGET", 500)?;
        let flush_secs: u64 = parse_var("FLUSH_INTERVAL_SECS", 300)?;

        Ok(Self {
            database_url,
            port,
            per_page_target,
            flush_interval: Duration::from_secs(flush_secs),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, BackendError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| {
            BackendError::config(format!("invalid value for {}: '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}
