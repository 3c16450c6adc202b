//! The storage port behind every versioned entity.
//!
//! A [`RecordStore`] keeps raw rows (JSON payloads) grouped by entity kind.
//! It has exactly two write operations, both compare-and-swap:
//!
//! - [`insert_opening`](RecordStore::insert_opening) starts a chain (or
//!   reopens a deleted one) and fails if the key already has a current row
//!   or the version is not the next in sequence.
//! - [`close_current`](RecordStore::close_current) closes the current row
//!   for `(business_key, expected_version)` and, in the same atomic step,
//!   inserts its successor if one is given.
//!
//! Implementations must apply each write all-or-nothing: no reader may ever
//! observe zero or two current rows for a key because of a half-applied
//! write, and a write abandoned at a suspension point must leave no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use vigil_types::{BusinessKey, RecordId, TenantId, VersionedRecord};

use crate::error::StoreError;
use crate::guard::CasToken;

/// A stored row with its payload still encoded as JSON.
pub type RawRecord = VersionedRecord<Value>;

/// Persistence for versioned records.
///
/// Rows are keyed by `id`, with lookups by `(kind, business_key, current)`
/// and `(kind, business_key, version)`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the first row of a chain, or the reopening row after a
    /// soft delete.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the key has a current row or
    /// `row.version` is not one past the latest stored version.
    async fn insert_opening(&self, kind: &str, row: RawRecord) -> Result<(), StoreError>;

    /// Close the current row named by `token` at `closed_at`, then insert
    /// `successor` if given. Both happen or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the current row is not at
    /// `token.expected_version`.
    async fn close_current(
        &self,
        kind: &str,
        token: &CasToken,
        closed_at: DateTime<Utc>,
        successor: Option<RawRecord>,
    ) -> Result<(), StoreError>;

    /// The open row for a key, if any.
    async fn find_current(
        &self,
        kind: &str,
        business_key: &BusinessKey,
    ) -> Result<Option<RawRecord>, StoreError>;

    /// A specific row by its ID, current or not.
    async fn find_by_id(&self, kind: &str, id: RecordId) -> Result<Option<RawRecord>, StoreError>;

    /// Every open row belonging to a tenant. Closed rows are never returned.
    async fn find_current_for_tenant(
        &self,
        kind: &str,
        tenant_id: &TenantId,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// All rows of a chain, ascending by version.
    async fn find_history(
        &self,
        kind: &str,
        business_key: &BusinessKey,
    ) -> Result<Vec<RawRecord>, StoreError>;

    /// The row whose `[valid_from, valid_to)` contains `at`.
    async fn find_as_of(
        &self,
        kind: &str,
        business_key: &BusinessKey,
        at: DateTime<Utc>,
    ) -> Result<Option<RawRecord>, StoreError>;
}
