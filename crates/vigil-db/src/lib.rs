//! `PostgreSQL` storage for Vigil versioned records.
//!
//! All entity kinds share one append-only `versioned_records` table.
//! The current pointer is the `is_current` column itself, guarded by a
//! partial unique index, and every close-plus-insert runs in one
//! transaction.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration, migrations
//! - [`record_store`] -- [`PgRecordStore`], the `RecordStore` implementation
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
pub mod record_store;

pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use record_store::{PgRecordStore, VersionedRow};
