//! Version lifecycle: create, supersede, soft-delete.
//!
//! ```text
//! create_initial ──> ACTIVE_CURRENT ──create_new_version──> CLOSED_HISTORICAL
//!                          │                                 (successor is ACTIVE_CURRENT)
//!                          └────────soft_delete────────────> DELETED_TERMINAL
//! ```
//!
//! Every transition is a single compare-and-swap against the store, keyed on
//! the version the writer loaded. The close of the old row and the insert of
//! its successor are one store operation.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use vigil_types::{
    ActorId, BusinessKey, Payload, PayloadInvalid, RecordId, TenantId, VersionedRecord,
    truncate_to_micros,
};

use crate::clock::Clock;
use crate::error::VersionError;
use crate::guard::CasToken;
use crate::store::{RawRecord, RecordStore};

/// Input to [`VersionLifecycle::create_initial`].
#[derive(Debug, Clone)]
pub struct NewRecord<P> {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Caller-chosen business key. Generated when `None`.
    pub business_key: Option<BusinessKey>,
    /// Who is creating the record.
    pub actor: ActorId,
    /// Initial payload.
    pub payload: P,
}

/// Creates and advances version chains for one payload type.
pub struct VersionLifecycle<P> {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    reopenable: bool,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for VersionLifecycle<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            reopenable: self.reopenable,
            _payload: PhantomData,
        }
    }
}

impl<P: Payload> VersionLifecycle<P> {
    /// Lifecycle manager over `store`, timestamping with `clock`.
    pub const fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            reopenable: false,
            _payload: PhantomData,
        }
    }

    /// Allow a soft-deleted chain to be reopened by a fresh create.
    #[must_use]
    pub const fn with_reopen(mut self, reopenable: bool) -> Self {
        self.reopenable = reopenable;
        self
    }

    /// Whether deleted chains of this kind may be reopened.
    pub const fn reopenable(&self) -> bool {
        self.reopenable
    }

    /// Create version 1 of a new record.
    ///
    /// If the key belongs to a soft-deleted chain and reopening is enabled,
    /// the chain continues at the next version instead, with its original
    /// `created_at` / `created_by`.
    ///
    /// # Errors
    ///
    /// - [`VersionError::Validation`] if the payload, tenant, or key is invalid,
    ///   or the key was deleted and this kind cannot be reopened.
    /// - [`VersionError::Conflict`] if the key already has a current version
    ///   or belongs to another tenant.
    /// - [`VersionError::Persistence`] if the store fails.
    pub async fn create_initial(&self, new: NewRecord<P>) -> Result<VersionedRecord<P>, VersionError> {
        let NewRecord {
            tenant_id,
            business_key,
            actor,
            payload,
        } = new;

        if tenant_id.is_blank() {
            return Err(PayloadInvalid::new("tenant_id: must not be blank").into());
        }
        let business_key = match business_key {
            Some(key) if key.is_blank() => {
                return Err(PayloadInvalid::new("business_key: must not be blank").into());
            }
            Some(key) => key,
            None => BusinessKey::generate(),
        };
        payload.validate()?;

        let now = truncate_to_micros(self.clock.now());
        let history = self.raw_history(&business_key).await?;
        let (version, created_at, created_by, valid_from) = match (history.first(), history.last()) {
            (Some(first), Some(latest)) => {
                // A key owned by another tenant reads as taken, whatever
                // state its chain is in.
                if latest.is_current || latest.tenant_id != tenant_id {
                    return Err(VersionError::Conflict {
                        kind: P::KIND,
                        business_key,
                        expected: None,
                    });
                }
                if !self.reopenable {
                    return Err(PayloadInvalid::new(format!(
                        "business_key: `{business_key}` was deleted and {} records cannot be reopened",
                        P::KIND
                    ))
                    .into());
                }
                // Start strictly after the delete so the gap keeps the
                // closed row terminal.
                let floor = just_after(latest.valid_to.unwrap_or(latest.valid_from));
                (
                    next_version(latest.version)?,
                    first.created_at,
                    first.created_by.clone(),
                    later_of(now, floor),
                )
            }
            _ => (1, now, actor.clone(), now),
        };

        let record = VersionedRecord {
            id: RecordId::new(),
            tenant_id,
            business_key,
            version,
            valid_from,
            valid_to: None,
            is_current: true,
            created_at,
            created_by,
            changed_by: actor,
            payload,
        };
        self.store
            .insert_opening(P::KIND, encode(&record)?)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?;

        tracing::info!(
            kind = P::KIND,
            business_key = %record.business_key,
            tenant_id = %record.tenant_id,
            version = record.version,
            "Opened record version"
        );
        Ok(record)
    }

    /// Supersede the current version of `business_key` with `patch` merged in.
    ///
    /// # Errors
    ///
    /// - [`VersionError::NotFound`] if there is no current version.
    /// - [`VersionError::Validation`] if the merged payload is invalid.
    /// - [`VersionError::Conflict`] if another writer advanced the chain
    ///   between load and write.
    /// - [`VersionError::Persistence`] if the store fails.
    pub async fn create_new_version(
        &self,
        business_key: &BusinessKey,
        patch: &P::Patch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<P>, VersionError> {
        let current = self.load_current(business_key).await?;
        self.supersede(current, patch, actor).await
    }

    /// Like [`create_new_version`](Self::create_new_version), but only if
    /// `expected_version` is still current.
    ///
    /// # Errors
    ///
    /// As for [`create_new_version`](Self::create_new_version); a version
    /// mismatch is reported as [`VersionError::Conflict`] without writing.
    pub async fn create_new_version_expecting(
        &self,
        business_key: &BusinessKey,
        expected_version: u32,
        patch: &P::Patch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<P>, VersionError> {
        let current = self.load_current(business_key).await?;
        if current.version != expected_version {
            tracing::warn!(
                kind = P::KIND,
                business_key = %business_key,
                expected_version,
                current_version = current.version,
                "Rejected stale version update"
            );
            return Err(VersionError::Conflict {
                kind: P::KIND,
                business_key: business_key.clone(),
                expected: Some(expected_version),
            });
        }
        self.supersede(current, patch, actor).await
    }

    /// Close the current version of `business_key` without a successor.
    ///
    /// # Errors
    ///
    /// - [`VersionError::NotFound`] if there is no current version.
    /// - [`VersionError::Conflict`] if another writer advanced the chain first.
    /// - [`VersionError::Persistence`] if the store fails.
    pub async fn soft_delete(
        &self,
        business_key: &BusinessKey,
        actor: &ActorId,
    ) -> Result<VersionedRecord<P>, VersionError> {
        let mut current = self.load_current(business_key).await?;
        let closed_at = self.transition_time(&current);
        let token = CasToken::new(business_key.clone(), current.version);

        self.store
            .close_current(P::KIND, &token, closed_at, None)
            .await
            .map_err(|e| Self::store_failure(&token, e))?;

        tracing::info!(
            kind = P::KIND,
            business_key = %business_key,
            version = current.version,
            actor = %actor,
            "Soft-deleted record"
        );
        current.valid_to = Some(closed_at);
        current.is_current = false;
        Ok(current)
    }

    /// Load and decode the current version.
    ///
    /// # Errors
    ///
    /// [`VersionError::NotFound`] if there is none, or
    /// [`VersionError::Persistence`] if the store fails.
    pub async fn load_current(&self, business_key: &BusinessKey) -> Result<VersionedRecord<P>, VersionError> {
        let raw = self
            .store
            .find_current(P::KIND, business_key)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))?
            .ok_or_else(|| VersionError::not_found(P::KIND, business_key))?;
        decode(raw)
    }

    /// Close `current` and open its successor carrying `patch`.
    ///
    /// `current` must have been loaded by the caller; the write fails with
    /// [`VersionError::Conflict`] if it is no longer current.
    ///
    /// # Errors
    ///
    /// [`VersionError::Validation`], [`VersionError::Conflict`], or
    /// [`VersionError::Persistence`].
    pub async fn supersede(
        &self,
        current: VersionedRecord<P>,
        patch: &P::Patch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<P>, VersionError> {
        let payload = current.payload.apply(patch)?;
        payload.validate()?;

        let closed_at = self.transition_time(&current);
        let token = CasToken::new(current.business_key.clone(), current.version);
        let successor = VersionedRecord {
            id: RecordId::new(),
            tenant_id: current.tenant_id,
            business_key: current.business_key,
            version: next_version(current.version)?,
            valid_from: closed_at,
            valid_to: None,
            is_current: true,
            created_at: current.created_at,
            created_by: current.created_by,
            changed_by: actor.clone(),
            payload,
        };

        self.store
            .close_current(P::KIND, &token, closed_at, Some(encode(&successor)?))
            .await
            .map_err(|e| Self::store_failure(&token, e))?;

        tracing::info!(
            kind = P::KIND,
            business_key = %successor.business_key,
            version = successor.version,
            actor = %actor,
            "Created record version"
        );
        Ok(successor)
    }

    /// Instant at which `current` closes: now, but strictly after its start.
    fn transition_time(&self, current: &VersionedRecord<P>) -> DateTime<Utc> {
        let now = truncate_to_micros(self.clock.now());
        later_of(now, just_after(current.valid_from))
    }

    async fn raw_history(&self, business_key: &BusinessKey) -> Result<Vec<RawRecord>, VersionError> {
        self.store
            .find_history(P::KIND, business_key)
            .await
            .map_err(|e| VersionError::from_store(P::KIND, e))
    }

    fn store_failure(token: &CasToken, error: crate::error::StoreError) -> VersionError {
        let error = VersionError::from_store(P::KIND, error);
        if error.is_conflict() {
            tracing::warn!(
                kind = P::KIND,
                business_key = %token.business_key,
                expected_version = token.expected_version,
                "Lost version race"
            );
        }
        error
    }
}

/// The next representable instant at microsecond precision.
fn just_after(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.checked_add_signed(TimeDelta::microseconds(1)).unwrap_or(ts)
}

fn later_of(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    if a >= b { a } else { b }
}

fn next_version(version: u32) -> Result<u32, VersionError> {
    version
        .checked_add(1)
        .ok_or_else(|| VersionError::Persistence("version counter exhausted".to_owned()))
}

pub(crate) fn encode<P: Payload>(record: &VersionedRecord<P>) -> Result<RawRecord, VersionError> {
    record
        .to_raw()
        .map_err(|e| VersionError::Persistence(format!("cannot encode {} payload: {e}", P::KIND)))
}

pub(crate) fn decode<P: Payload>(raw: RawRecord) -> Result<VersionedRecord<P>, VersionError> {
    let id = raw.id;
    raw.decode()
        .map_err(|e| VersionError::Persistence(format!("corrupt {} row {id}: {e}", P::KIND)))
}
