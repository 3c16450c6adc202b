//! Configuration for the server binary.
//!
//! The configuration lives in `vigil-config.yaml`. Every section is
//! optional; missing values fall back to their defaults. A handful of
//! environment variables override the file after it is parsed.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use vigil_api::ServerConfig;
use vigil_core::CoreConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration. Mirrors `vigil-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VigilConfig {
    /// HTTP bind address.
    #[serde(default)]
    pub server: ServerConfig,
    /// Which record store to use.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Versioning and policy behaviour.
    #[serde(default)]
    pub core: CoreConfig,
    /// Log level and output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local store. Data is lost on restart.
    #[default]
    Memory,
    /// `PostgreSQL` via `vigil-db`.
    Postgres,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// Connection URL, required for the `postgres` backend.
    pub database_url: Option<String>,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connect_timeout_secs: u64,
    /// Run embedded migrations at startup.
    pub run_migrations: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 10,
            connect_timeout_secs: 5,
            run_migrations: true,
        }
    }
}

impl StorageConfig {
    /// Connection timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: LogFormat::Text,
        }
    }
}

impl VigilConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if an override or the result is unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a YAML string with the given variable
    /// lookup used for overrides.
    pub fn parse(yaml: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// - `DATABASE_URL` overrides `storage.database_url`
    /// - `VIGIL_HOST` overrides `server.host`
    /// - `VIGIL_PORT` overrides `server.port`
    /// - `VIGIL_LOG_FORMAT` overrides `logging.format` (`text` or `json`)
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(host) = lookup("VIGIL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("VIGIL_PORT") {
            self.server.port = port.trim().parse().map_err(|e| ConfigError::Invalid {
                message: format!("VIGIL_PORT `{port}`: {e}"),
            })?;
        }
        if let Some(format) = lookup("VIGIL_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&format).ok_or_else(|| ConfigError::Invalid {
                message: format!("VIGIL_LOG_FORMAT `{format}`: expected `text` or `json`"),
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let missing_url = self
            .storage
            .database_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty());
        if self.storage.backend == StorageBackend::Postgres && missing_url {
            return Err(ConfigError::Invalid {
                message: String::from("storage.backend is `postgres` but no database_url is set"),
            });
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid {
                message: String::from("storage.max_connections must be at least 1"),
            });
        }
        Ok(())
    }
}
