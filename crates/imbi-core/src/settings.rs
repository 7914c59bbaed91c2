//! Configuration for Imbi services.
//!
//! Settings are loaded from (in priority order):
//! 1. Environment variables (`IMBI__` prefix, `__` separator)
//! 2. Config file (`config.toml` in the working directory)
//! 3. Defaults

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ImbiError;

/// Default config file name (extension resolved by the `config` crate).
pub const DEFAULT_CONFIG_FILE: &str = "config";

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub blueprints: BlueprintSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from `config.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ImbiError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from the named config file (if present) and the environment.
    pub fn load_from(file: impl AsRef<Path>) -> Result<Self, ImbiError> {
        let file = file.as_ref().to_string_lossy().into_owned();
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("IMBI")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}

/// Connection parameters for the Neo4j graph store.
#[derive(Clone, Deserialize)]
pub struct Neo4jSettings {
    /// Bolt/neo4j URL, optionally carrying `user:password@` credentials.
    #[serde(default = "default_neo4j_url")]
    pub url: String,

    /// Overrides the user embedded in `url`.
    #[serde(default)]
    pub user: Option<String>,

    /// Overrides the password embedded in `url`.
    #[serde(default)]
    pub password: Option<String>,

    /// Target database name.
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Maximum age of the connection pool before it is rebuilt.
    #[serde(default = "default_max_connection_lifetime")]
    pub max_connection_lifetime_secs: u64,

    /// Upper bound on the liveness probe run when connecting.
    #[serde(default)]
    pub liveness_check_timeout_secs: Option<u64>,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Rows fetched per page by streaming reads.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

impl Neo4jSettings {
    /// Username and password, from explicit settings first and then the
    /// URL. URL-embedded values are percent-decoded.
    pub fn credentials(&self) -> Result<(String, String), ImbiError> {
        let url = self.parsed_url()?;
        let user = match &self.user {
            Some(user) => user.clone(),
            None => decode(url.username())?,
        };
        let password = match &self.password {
            Some(password) => password.clone(),
            None => url.password().map(decode).transpose()?.unwrap_or_default(),
        };
        Ok((user, password))
    }

    /// The URL with any embedded credentials removed.
    pub fn connection_uri(&self) -> Result<String, ImbiError> {
        let mut url = self.parsed_url()?;
        url.set_username("")
            .and_then(|_| url.set_password(None))
            .map_err(|_| ImbiError::Config(format!("neo4j.url cannot carry credentials: {}", self.url)))?;
        Ok(url.to_string())
    }

    pub fn max_connection_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_connection_lifetime_secs)
    }

    pub fn liveness_check_timeout(&self) -> Option<Duration> {
        self.liveness_check_timeout_secs.map(Duration::from_secs)
    }

    fn parsed_url(&self) -> Result<Url, ImbiError> {
        Url::parse(&self.url).map_err(|e| ImbiError::Config(format!("invalid neo4j.url: {e}")))
    }
}

fn decode(raw: &str) -> Result<String, ImbiError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| ImbiError::Config(format!("invalid credential encoding in neo4j.url: {e}")))
}

impl fmt::Debug for Neo4jSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Neo4jSettings")
            .field("url", &self.connection_uri().unwrap_or_else(|_| "[INVALID]".into()))
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("keep_alive", &self.keep_alive)
            .field("max_connection_lifetime_secs", &self.max_connection_lifetime_secs)
            .field("liveness_check_timeout_secs", &self.liveness_check_timeout_secs)
            .field("max_connections", &self.max_connections)
            .field("fetch_size", &self.fetch_size)
            .finish()
    }
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            url: default_neo4j_url(),
            user: None,
            password: None,
            database: default_database(),
            keep_alive: true,
            max_connection_lifetime_secs: default_max_connection_lifetime(),
            liveness_check_timeout_secs: None,
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Tuning for the synthesized model cache.
#[derive(Debug, Clone, Deserialize)]
pub struct BlueprintSettings {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

impl Default for BlueprintSettings {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Human-readable output with Imbi targets at debug level.
    #[serde(default)]
    pub dev: bool,
}

fn default_neo4j_url() -> String {
    "neo4j://localhost:7687".to_string()
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_connection_lifetime() -> u64 {
    3600
}

fn default_max_connections() -> usize {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_cache_capacity() -> u64 {
    1024
}
