//! Per-entity facade over lifecycle and queries.
//!
//! This is the only surface consumers use; there is no direct row access.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use vigil_types::{ActorId, BusinessKey, Payload, RecordId, TenantId, VersionedRecord};

use crate::clock::Clock;
use crate::error::VersionError;
use crate::guard::{RetryPolicy, retry_on_conflict};
use crate::invariants::{ChainViolation, check_chain};
use crate::lifecycle::{NewRecord, VersionLifecycle};
use crate::query::{CurrentQuery, HistoryQuery, VersionWithState};
use crate::store::RecordStore;

/// Typed access to one entity kind.
pub struct Repository<P> {
    lifecycle: VersionLifecycle<P>,
    current: CurrentQuery<P>,
    history: HistoryQuery<P>,
    retry: RetryPolicy,
}

impl<P> Clone for Repository<P> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            current: self.current.clone(),
            history: self.history.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<P: Payload> Repository<P> {
    /// Repository over `store`.
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lifecycle: VersionLifecycle::new(Arc::clone(&store), clock),
            current: CurrentQuery::new(Arc::clone(&store)),
            history: HistoryQuery::new(store),
            retry: RetryPolicy::default(),
        }
    }

    /// Permit undelete of this kind via [`create`](Self::create).
    #[must_use]
    pub fn with_reopen(mut self, reopenable: bool) -> Self {
        self.lifecycle = self.lifecycle.with_reopen(reopenable);
        self
    }

    /// Retry policy for [`update_with`](Self::update_with).
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create version 1 (or reopen a deleted chain, if permitted).
    pub async fn create(&self, new: NewRecord<P>) -> Result<VersionedRecord<P>, VersionError> {
        self.lifecycle.create_initial(new).await
    }

    /// Any row by primary key.
    pub async fn find_by_id(&self, id: RecordId) -> Result<VersionedRecord<P>, VersionError> {
        self.current
            .find_by_id(id)
            .await?
            .ok_or_else(|| VersionError::not_found(P::KIND, id))
    }

    /// The current version of `business_key`.
    pub async fn find_by_business_key(&self, business_key: &BusinessKey) -> Result<VersionedRecord<P>, VersionError> {
        self.current
            .find_current_by_business_key(business_key)
            .await?
            .ok_or_else(|| VersionError::not_found(P::KIND, business_key))
    }

    /// Current rows of `tenant_id` matching `predicate`.
    pub async fn find_current_by_filter<F>(
        &self,
        tenant_id: &TenantId,
        predicate: F,
    ) -> Result<Vec<VersionedRecord<P>>, VersionError>
    where
        F: Fn(&VersionedRecord<P>) -> bool + Send,
    {
        self.current.find_current_by_filter(tenant_id, predicate).await
    }

    /// Every version of `business_key`, ascending.
    ///
    /// # Errors
    ///
    /// [`VersionError::NotFound`] if the key never existed.
    pub async fn find_history(&self, business_key: &BusinessKey) -> Result<Vec<VersionedRecord<P>>, VersionError> {
        let history = self.history.find_history(business_key).await?;
        if history.is_empty() {
            return Err(VersionError::not_found(P::KIND, business_key));
        }
        Ok(history)
    }

    /// Every version of `business_key` with its derived state.
    pub async fn find_history_with_state(
        &self,
        business_key: &BusinessKey,
    ) -> Result<Vec<VersionWithState<P>>, VersionError> {
        let history = self.history.find_history_with_state(business_key).await?;
        if history.is_empty() {
            return Err(VersionError::not_found(P::KIND, business_key));
        }
        Ok(history)
    }

    /// The version in effect at `at`.
    pub async fn find_as_of(
        &self,
        business_key: &BusinessKey,
        at: DateTime<Utc>,
    ) -> Result<VersionedRecord<P>, VersionError> {
        self.history.find_as_of(business_key, at).await
    }

    /// Supersede the current version with `patch`.
    pub async fn create_new_version(
        &self,
        business_key: &BusinessKey,
        patch: &P::Patch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<P>, VersionError> {
        self.lifecycle.create_new_version(business_key, patch, actor).await
    }

    /// Supersede the current version only if it is still `expected_version`.
    pub async fn create_new_version_expecting(
        &self,
        business_key: &BusinessKey,
        expected_version: u32,
        patch: &P::Patch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<P>, VersionError> {
        self.lifecycle
            .create_new_version_expecting(business_key, expected_version, patch, actor)
            .await
    }

    /// Read-modify-write with retry.
    ///
    /// `derive` is called with the freshly loaded current version on every
    /// attempt and returns the patch to apply to it. Conflicts are retried
    /// per the repository's [`RetryPolicy`]; nothing else is.
    pub async fn update_with<F>(
        &self,
        business_key: &BusinessKey,
        actor: &ActorId,
        derive: F,
    ) -> Result<VersionedRecord<P>, VersionError>
    where
        F: Fn(&VersionedRecord<P>) -> Result<P::Patch, VersionError> + Send + Sync,
    {
        let lifecycle = &self.lifecycle;
        let derive = &derive;
        retry_on_conflict(&self.retry, move |_attempt| async move {
            let current = lifecycle.load_current(business_key).await?;
            let patch = derive(&current)?;
            lifecycle.supersede(current, &patch, actor).await
        })
        .await
    }

    /// Soft-delete the current version.
    pub async fn delete(&self, business_key: &BusinessKey, actor: &ActorId) -> Result<(), VersionError> {
        self.lifecycle.soft_delete(business_key, actor).await.map(|_| ())
    }

    /// Check the stored chain of `business_key` against the versioning
    /// invariants. An empty result means the chain is healthy.
    pub async fn verify(&self, business_key: &BusinessKey) -> Result<Vec<ChainViolation>, VersionError> {
        let history = self.find_history(business_key).await?;
        let violations = check_chain(&history, self.lifecycle.reopenable());
        if !violations.is_empty() {
            tracing::error!(
                kind = P::KIND,
                business_key = %business_key,
                count = violations.len(),
                "Version chain violates invariants"
            );
        }
        Ok(violations)
    }
}
