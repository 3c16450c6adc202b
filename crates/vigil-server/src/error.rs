//! Error types for the server binary.
//!
//! [`StartupError`] wraps every failure that can stop the server before
//! or while it serves requests.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// Connecting to or migrating the database failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: vigil_db::DbError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: vigil_api::ServerError,
    },
}
