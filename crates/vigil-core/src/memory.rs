//! In-memory [`RecordStore`].
//!
//! Chains live in a single [`RwLock`]. Each write takes the write lock,
//! checks its precondition, and mutates the chain without awaiting again,
//! so a write is either fully applied or not at all even if the calling
//! task is cancelled while waiting for the lock.
//!
//! The current row is simply the last row of a chain with `is_current`
//! set; there is no separate pointer that could drift from the rows.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use vigil_types::{BusinessKey, RecordId, TenantId};

use crate::error::StoreError;
use crate::guard::CasToken;
use crate::store::{RawRecord, RecordStore};

/// All chains of one entity kind.
#[derive(Debug, Default)]
struct Table {
    /// Rows per business key, ascending by version.
    chains: BTreeMap<BusinessKey, Vec<RawRecord>>,
    /// Row ID to owning business key.
    locator: HashMap<RecordId, BusinessKey>,
}

/// A [`RecordStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Backend`]
    /// until switched back. Used to exercise outage handling.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Total number of rows across all kinds.
    pub async fn row_count(&self) -> usize {
        let tables = self.tables.read().await;
        tables
            .values()
            .flat_map(|t| t.chains.values())
            .map(Vec::len)
            .sum()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("record store unavailable".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_opening(&self, kind: &str, row: RawRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let table = tables.entry(kind.to_owned()).or_default();
        let chain = table.chains.entry(row.business_key.clone()).or_default();

        let conflict = || StoreError::Conflict {
            business_key: row.business_key.clone(),
            expected: None,
        };
        let latest = chain.last();
        if latest.is_some_and(|r| r.is_current) {
            return Err(conflict());
        }
        let next_version = latest.map_or(1, |r| r.version.saturating_add(1));
        if row.version != next_version {
            return Err(conflict());
        }

        table.locator.insert(row.id, row.business_key.clone());
        chain.push(row);
        Ok(())
    }

    async fn close_current(
        &self,
        kind: &str,
        token: &CasToken,
        closed_at: DateTime<Utc>,
        successor: Option<RawRecord>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let conflict = || StoreError::Conflict {
            business_key: token.business_key.clone(),
            expected: Some(token.expected_version),
        };

        let mut tables = self.tables.write().await;
        let table = tables.get_mut(kind).ok_or_else(conflict)?;
        let chain = table
            .chains
            .get_mut(&token.business_key)
            .ok_or_else(conflict)?;
        let current = chain.last_mut().ok_or_else(conflict)?;
        if !current.is_current || current.version != token.expected_version {
            return Err(conflict());
        }
        let mismatched = successor.as_ref().is_some_and(|next| {
            next.version != token.expected_version.saturating_add(1)
                || next.business_key != token.business_key
        });
        if mismatched {
            return Err(conflict());
        }

        current.valid_to = Some(closed_at);
        current.is_current = false;
        if let Some(next) = successor {
            table.locator.insert(next.id, next.business_key.clone());
            chain.push(next);
        }
        Ok(())
    }

    async fn find_current(
        &self,
        kind: &str,
        business_key: &BusinessKey,
    ) -> Result<Option<RawRecord>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(kind)
            .and_then(|t| t.chains.get(business_key))
            .and_then(|chain| chain.last())
            .filter(|row| row.is_current)
            .cloned())
    }

    async fn find_by_id(&self, kind: &str, id: RecordId) -> Result<Option<RawRecord>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let Some(table) = tables.get(kind) else {
            return Ok(None);
        };
        Ok(table
            .locator
            .get(&id)
            .and_then(|key| table.chains.get(key))
            .and_then(|chain| chain.iter().find(|row| row.id == id))
            .cloned())
    }

    async fn find_current_for_tenant(
        &self,
        kind: &str,
        tenant_id: &TenantId,
    ) -> Result<Vec<RawRecord>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(kind)
            .map(|t| {
                t.chains
                    .values()
                    .filter_map(|chain| chain.last())
                    .filter(|row| row.is_current && &row.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_history(
        &self,
        kind: &str,
        business_key: &BusinessKey,
    ) -> Result<Vec<RawRecord>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(kind)
            .and_then(|t| t.chains.get(business_key))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_as_of(
        &self,
        kind: &str,
        business_key: &BusinessKey,
        at: DateTime<Utc>,
    ) -> Result<Option<RawRecord>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(kind)
            .and_then(|t| t.chains.get(business_key))
            .and_then(|chain| chain.iter().rev().find(|row| row.contains(at)))
            .cloned())
    }
}
