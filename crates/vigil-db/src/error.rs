//! Error types for the data layer.
//!
//! [`DbError`] wraps the underlying [`sqlx`] errors. At the
//! [`RecordStore`](vigil_core::RecordStore) boundary every `DbError`
//! becomes a [`StoreError::Backend`]; compare-and-swap losses are reported
//! separately as [`StoreError::Conflict`] and never pass through here.

use vigil_core::StoreError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row cannot be represented as a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(error: DbError) -> Self {
        Self::Backend(error.to_string())
    }
}
