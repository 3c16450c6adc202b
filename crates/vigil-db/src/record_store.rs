//! [`RecordStore`] backed by the `versioned_records` table.
//!
//! Opening inserts are guarded in SQL (no current row, next version in
//! sequence) and by the unique indexes; a close runs `UPDATE ... WHERE
//! version = $expected AND is_current` and the successor `INSERT` in one
//! transaction. A second writer holding the same token blocks on the row
//! lock, re-evaluates the predicate after the first commits, and matches
//! nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use vigil_core::{CasToken, RawRecord, RecordStore, StoreError};
use vigil_types::{ActorId, BusinessKey, RecordId, TenantId, VersionedRecord};

use crate::error::DbError;

/// `PostgreSQL` implementation of [`RecordStore`].
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Store over an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_row(
        tx: &mut Transaction<'_, Postgres>,
        kind: &str,
        row: &RawRecord,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r"INSERT INTO versioned_records (id, entity_kind, tenant_id, business_key, version, valid_from, valid_to, is_current, created_at, created_by, changed_by, payload)
              SELECT $1::UUID, $2::TEXT, $3::TEXT, $4::TEXT, $5::INTEGER, $6::TIMESTAMPTZ, $7::TIMESTAMPTZ, $8::BOOLEAN, $9::TIMESTAMPTZ, $10::TEXT, $11::TEXT, $12::JSONB
              WHERE NOT EXISTS (
                  SELECT 1 FROM versioned_records
                  WHERE entity_kind = $2 AND business_key = $4 AND is_current
              )
              AND COALESCE((
                  SELECT MAX(version) FROM versioned_records
                  WHERE entity_kind = $2 AND business_key = $4
              ), 0) + 1 = $5",
        )
        .bind(row.id.into_inner())
        .bind(kind)
        .bind(row.tenant_id.as_str())
        .bind(row.business_key.as_str())
        .bind(version_to_db(row.version))
        .bind(row.valid_from)
        .bind(row.valid_to)
        .bind(row.is_current)
        .bind(row.created_at)
        .bind(row.created_by.as_str())
        .bind(row.changed_by.as_str())
        .bind(&row.payload)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_opening(&self, kind: &str, row: RawRecord) -> Result<(), StoreError> {
        let conflict = || StoreError::Conflict {
            business_key: row.business_key.clone(),
            expected: None,
        };

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let inserted = match Self::insert_row(&mut tx, kind, &row).await {
            Ok(n) => n,
            Err(e) if is_unique_violation(&e) => return Err(conflict()),
            Err(e) => return Err(backend(e)),
        };
        if inserted == 0 {
            return Err(conflict());
        }
        tx.commit().await.map_err(backend)?;

        tracing::debug!(kind, business_key = %row.business_key, version = row.version, "Inserted opening row");
        Ok(())
    }

    async fn close_current(
        &self,
        kind: &str,
        token: &CasToken,
        closed_at: DateTime<Utc>,
        successor: Option<RawRecord>,
    ) -> Result<(), StoreError> {
        let conflict = || StoreError::Conflict {
            business_key: token.business_key.clone(),
            expected: Some(token.expected_version),
        };
        let mismatched = successor.as_ref().is_some_and(|next| {
            next.version != token.expected_version.saturating_add(1)
                || next.business_key != token.business_key
        });
        if mismatched {
            return Err(conflict());
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let closed = sqlx::query(
            r"UPDATE versioned_records
              SET valid_to = $1, is_current = FALSE
              WHERE entity_kind = $2 AND business_key = $3 AND version = $4 AND is_current",
        )
        .bind(closed_at)
        .bind(kind)
        .bind(token.business_key.as_str())
        .bind(version_to_db(token.expected_version))
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .rows_affected();

        // Dropping the transaction rolls it back.
        if closed == 0 {
            return Err(conflict());
        }

        if let Some(next) = &successor {
            match Self::insert_row(&mut tx, kind, next).await {
                Ok(1) => {}
                Ok(_) => return Err(conflict()),
                Err(e) if is_unique_violation(&e) => return Err(conflict()),
                Err(e) => return Err(backend(e)),
            }
        }
        tx.commit().await.map_err(backend)?;

        tracing::debug!(
            kind,
            business_key = %token.business_key,
            closed_version = token.expected_version,
            with_successor = successor.is_some(),
            "Closed current row"
        );
        Ok(())
    }

    async fn find_current(&self, kind: &str, business_key: &BusinessKey) -> Result<Option<RawRecord>, StoreError> {
        let row = sqlx::query_as::<_, VersionedRow>(
            r"SELECT id, tenant_id, business_key, version, valid_from, valid_to, is_current, created_at, created_by, changed_by, payload
              FROM versioned_records
              WHERE entity_kind = $1 AND business_key = $2 AND is_current",
        )
        .bind(kind)
        .bind(business_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(RawRecord::try_from).transpose().map_err(StoreError::from)
    }

    async fn find_by_id(&self, kind: &str, id: RecordId) -> Result<Option<RawRecord>, StoreError> {
        let row = sqlx::query_as::<_, VersionedRow>(
            r"SELECT id, tenant_id, business_key, version, valid_from, valid_to, is_current, created_at, created_by, changed_by, payload
              FROM versioned_records
              WHERE entity_kind = $1 AND id = $2",
        )
        .bind(kind)
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(RawRecord::try_from).transpose().map_err(StoreError::from)
    }

    async fn find_current_for_tenant(&self, kind: &str, tenant_id: &TenantId) -> Result<Vec<RawRecord>, StoreError> {
        let rows = sqlx::query_as::<_, VersionedRow>(
            r"SELECT id, tenant_id, business_key, version, valid_from, valid_to, is_current, created_at, created_by, changed_by, payload
              FROM versioned_records
              WHERE entity_kind = $1 AND tenant_id = $2 AND is_current
              ORDER BY business_key",
        )
        .bind(kind)
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        decode_all(rows)
    }

    async fn find_history(&self, kind: &str, business_key: &BusinessKey) -> Result<Vec<RawRecord>, StoreError> {
        let rows = sqlx::query_as::<_, VersionedRow>(
            r"SELECT id, tenant_id, business_key, version, valid_from, valid_to, is_current, created_at, created_by, changed_by, payload
              FROM versioned_records
              WHERE entity_kind = $1 AND business_key = $2
              ORDER BY version",
        )
        .bind(kind)
        .bind(business_key.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        decode_all(rows)
    }

    async fn find_as_of(
        &self,
        kind: &str,
        business_key: &BusinessKey,
        at: DateTime<Utc>,
    ) -> Result<Option<RawRecord>, StoreError> {
        let row = sqlx::query_as::<_, VersionedRow>(
            r"SELECT id, tenant_id, business_key, version, valid_from, valid_to, is_current, created_at, created_by, changed_by, payload
              FROM versioned_records
              WHERE entity_kind = $1 AND business_key = $2
                AND valid_from <= $3 AND (valid_to IS NULL OR valid_to > $3)
              ORDER BY version DESC
              LIMIT 1",
        )
        .bind(kind)
        .bind(business_key.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(RawRecord::try_from).transpose().map_err(StoreError::from)
    }
}

/// A row from the `versioned_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VersionedRow {
    /// Row UUID.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Business key shared by all versions.
    pub business_key: String,
    /// Version number, 1-based.
    pub version: i32,
    /// Inclusive start of validity.
    pub valid_from: DateTime<Utc>,
    /// Exclusive end of validity; `NULL` while current.
    pub valid_to: Option<DateTime<Utc>>,
    /// Whether this is the current version.
    pub is_current: bool,
    /// When version 1 was created.
    pub created_at: DateTime<Utc>,
    /// Author of version 1.
    pub created_by: String,
    /// Author of this version.
    pub changed_by: String,
    /// Entity payload.
    pub payload: Value,
}

impl TryFrom<VersionedRow> for RawRecord {
    type Error = DbError;

    fn try_from(row: VersionedRow) -> Result<Self, Self::Error> {
        let version = u32::try_from(row.version)
            .map_err(|e| DbError::Corrupt(format!("row {} has version {}: {e}", row.id, row.version)))?;
        Ok(VersionedRecord {
            id: RecordId::from(row.id),
            tenant_id: TenantId::new(row.tenant_id),
            business_key: BusinessKey::new(row.business_key),
            version,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            is_current: row.is_current,
            created_at: row.created_at,
            created_by: ActorId::new(row.created_by),
            changed_by: ActorId::new(row.changed_by),
            payload: row.payload,
        })
    }
}

fn decode_all(rows: Vec<VersionedRow>) -> Result<Vec<RawRecord>, StoreError> {
    rows.into_iter()
        .map(|row| RawRecord::try_from(row).map_err(StoreError::from))
        .collect()
}

/// Versions beyond `i32::MAX` cannot be stored; saturate so the insert
/// fails the sequence guard instead of wrapping.
fn version_to_db(version: u32) -> i32 {
    i32::try_from(version).unwrap_or(i32::MAX)
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn backend(error: sqlx::Error) -> StoreError {
    DbError::from(error).into()
}
