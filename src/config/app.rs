//! Application configuration loading from config.toml
//!
//! Every section is optional. Missing values fall back to defaults that work for a local
//! development backend, and two environment variables (`DATABASE_URL`, `FINANCE_API_URL`)
//! override the file so deployments can keep secrets out of it.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Local pending-store settings
    pub database: DatabaseSettings,
    /// Remote transaction API settings
    pub remote: RemoteSettings,
    /// Connectivity probing settings
    pub connectivity: ConnectivitySettings,
}

/// Local database settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `SeaORM` connection URL
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

/// Remote transaction API settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteSettings {
    /// Base URL of the backend, e.g. `http://localhost:3000`
    pub base_url: String,
    /// Upper bound for a single submission, in seconds
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10,
        }
    }
}

impl RemoteSettings {
    /// Submission timeout as a `Duration`
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Connectivity probe settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConnectivitySettings {
    /// Seconds between reachability probes
    pub probe_interval_secs: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: 15,
        }
    }
}

impl ConnectivitySettings {
    /// Probe interval as a `Duration`
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

impl AppConfig {
    /// Applies `DATABASE_URL` and `FINANCE_API_URL` overrides from the environment.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.database.url = crate::config::database::get_database_url(&self.database.url);
        if let Ok(url) = std::env::var("FINANCE_API_URL") {
            self.remote.base_url = url;
        }
        self
    }
}

/// Loads configuration from a TOML file.
///
/// A missing file is not an error: the defaults are used instead. A file that exists but
/// cannot be read or parsed is.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        tracing::debug!("No config file at {:?}, using defaults", path_ref);
        return Ok(AppConfig::default().with_env_overrides());
    }

    tracing::debug!("Loading configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;

    let config: AppConfig = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse TOML from config file {path_ref:?}: {e}"),
    })?;

    Ok(config.with_env_overrides())
}
