//! Vigil server binary.
//!
//! Wires configuration, logging, the record store, and the HTTP API
//! together, then serves requests until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `vigil-config.yaml` (or `$VIGIL_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the record store (in-memory or `PostgreSQL`)
//! 4. Build the record engine and API state
//! 5. Serve HTTP

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_api::AppState;
use vigil_core::{InMemoryStore, RecordEngine, RecordStore, SystemClock};
use vigil_db::{PostgresConfig, PostgresPool};

use crate::config::{LogFormat, LoggingConfig, StorageBackend, StorageConfig, VigilConfig};
use crate::error::StartupError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path();
    let config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;

    init_tracing(&config.logging);
    info!(
        config = %path.display(),
        host = config.server.host,
        port = config.server.port,
        backend = ?config.storage.backend,
        default_preset = ?config.core.default_preset,
        "vigil-server starting"
    );

    run(config).await?;

    info!("vigil-server shutdown complete");
    Ok(())
}

async fn run(config: VigilConfig) -> Result<(), StartupError> {
    let store = open_store(&config.storage).await?;
    let engine = RecordEngine::new(store, Arc::new(SystemClock), config.core);
    let state = Arc::new(AppState::new(&engine));
    vigil_api::start_server(&config.server, state).await?;
    Ok(())
}

fn config_path() -> PathBuf {
    std::env::var_os("VIGIL_CONFIG").map_or_else(|| PathBuf::from("vigil-config.yaml"), PathBuf::from)
}

/// Read the config file if present, otherwise defaults. Environment
/// overrides apply either way.
fn load_config(path: &std::path::Path) -> Result<VigilConfig, StartupError> {
    let config = if path.exists() {
        VigilConfig::from_file(path)?
    } else {
        VigilConfig::from_env(|name| std::env::var(name).ok())?
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn RecordStore>, StartupError> {
    match storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory record store; data will not survive a restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let url = storage.database_url.as_deref().unwrap_or_default();
            let pg_config = PostgresConfig::new(url)
                .with_max_connections(storage.max_connections)
                .with_connect_timeout(storage.connect_timeout());
            let pool = PostgresPool::connect(&pg_config).await?;
            if storage.run_migrations {
                pool.run_migrations().await?;
                info!("Database migrations applied");
            }
            info!(max_connections = storage.max_connections, "Connected to PostgreSQL");
            Ok(Arc::new(pool.record_store()))
        }
    }
}
