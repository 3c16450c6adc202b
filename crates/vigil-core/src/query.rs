//! Read side: current-state and temporal queries.
//!
//! Neither engine ever writes. Both decode raw store rows into typed
//! records; a row that no longer decodes is reported as a persistence
//! failure rather than skipped.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_types::{BusinessKey, Payload, RecordId, RecordState, TenantId, VersionedRecord, derive_states};

use crate::error::VersionError;
use crate::lifecycle::decode;
use crate::store::RecordStore;

/// Current-state lookups. At most one result per business key.
pub struct CurrentQuery<P> {
    store: Arc<dyn RecordStore>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for CurrentQuery<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _payload: PhantomData,
        }
    }
}

impl<P: Payload> CurrentQuery<P> {
    /// Query engine over `store`.
    pub const fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            _payload: PhantomData,
        }
    }

    /// The current version of `business_key`, if any.
    pub async fn find_current_by_business_key(
        &self,
        business_key: &BusinessKey,
    ) -> Result<Option<VersionedRecord<P>>, VersionError> {
        tracing::debug!(kind = P::KIND, business_key = %business_key, "Loading current version");
        self.store
            .find_current(P::KIND, business_key)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?
            .map(decode)
            .transpose()
    }

    /// Current rows of `tenant_id` whose payload satisfies `predicate`,
    /// ordered by business key. Closed rows are never returned.
    pub async fn find_current_by_filter<F>(
        &self,
        tenant_id: &TenantId,
        predicate: F,
    ) -> Result<Vec<VersionedRecord<P>>, VersionError>
    where
        F: Fn(&VersionedRecord<P>) -> bool + Send,
    {
        tracing::debug!(kind = P::KIND, tenant_id = %tenant_id, "Scanning current versions");
        let rows = self
            .store
            .find_current_for_tenant(P::KIND, tenant_id)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?;

        let mut matched = Vec::new();
        for row in rows {
            let record = decode::<P>(row)?;
            if record.is_current && predicate(&record) {
                matched.push(record);
            }
        }
        Ok(matched)
    }

    /// The row with primary key `id`, current or not.
    pub async fn find_by_id(&self, id: RecordId) -> Result<Option<VersionedRecord<P>>, VersionError> {
        tracing::debug!(kind = P::KIND, %id, "Loading version by id");
        self.store
            .find_by_id(P::KIND, id)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?
            .map(decode)
            .transpose()
    }
}

/// A history row paired with its derived lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionWithState<P> {
    /// Derived state of `record` within its chain.
    pub state: RecordState,
    /// The row itself.
    #[serde(flatten)]
    pub record: VersionedRecord<P>,
}

/// Full-chain and point-in-time lookups.
pub struct HistoryQuery<P> {
    store: Arc<dyn RecordStore>,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for HistoryQuery<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _payload: PhantomData,
        }
    }
}

impl<P: Payload> HistoryQuery<P> {
    /// Query engine over `store`.
    pub const fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            _payload: PhantomData,
        }
    }

    /// Every version of `business_key`, ascending. Empty if the key never existed.
    pub async fn find_history(&self, business_key: &BusinessKey) -> Result<Vec<VersionedRecord<P>>, VersionError> {
        tracing::debug!(kind = P::KIND, business_key = %business_key, "Loading history");
        self.store
            .find_history(P::KIND, business_key)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// The version whose `[valid_from, valid_to)` contains `at`.
    ///
    /// # Errors
    ///
    /// [`VersionError::NotFound`] if `at` precedes the first version, falls
    /// after a soft delete, or the key never existed.
    pub async fn find_as_of(
        &self,
        business_key: &BusinessKey,
        at: DateTime<Utc>,
    ) -> Result<VersionedRecord<P>, VersionError> {
        tracing::debug!(kind = P::KIND, business_key = %business_key, %at, "Loading version as of");
        let row = self
            .store
            .find_as_of(P::KIND, business_key, at)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?
            .ok_or_else(|| VersionError::not_found(P::KIND, format!("{business_key}@{}", at.to_rfc3339())))?;
        decode(row)
    }

    /// [`find_history`](Self::find_history) with each row's derived state.
    pub async fn find_history_with_state(
        &self,
        business_key: &BusinessKey,
    ) -> Result<Vec<VersionWithState<P>>, VersionError> {
        let history = self.find_history(business_key).await?;
        let states = derive_states(&history);
        Ok(states
            .into_iter()
            .zip(history)
            .map(|(state, record)| VersionWithState { state, record })
            .collect())
    }
}
