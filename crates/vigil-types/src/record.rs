//! The shared shape of every append-only, temporally versioned record.
//!
//! A logical record is a chain of version rows sharing one
//! [`BusinessKey`]. Each row is truth for the half-open interval
//! `[valid_from, valid_to)`; `valid_to = None` marks the single open row.
//! Rows are never edited after insertion except to close their interval.
//!
//! This module only checks static shape. State transitions live in the
//! lifecycle manager of `vigil-core`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enums::RecordState;
use crate::ids::{ActorId, BusinessKey, RecordId, TenantId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A row that violates the static shape rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// Versions start at 1.
    #[error("version must be >= 1")]
    VersionZero,

    /// A closed interval must not be empty or inverted.
    #[error("valid_from {valid_from} must be before valid_to {valid_to}")]
    EmptyInterval {
        /// Start of the interval.
        valid_from: DateTime<Utc>,
        /// End of the interval.
        valid_to: DateTime<Utc>,
    },

    /// `is_current` must be true exactly when the interval is open.
    #[error("is_current={is_current} disagrees with open interval={open}")]
    CurrentFlagMismatch {
        /// The stored flag.
        is_current: bool,
        /// Whether `valid_to` is unset.
        open: bool,
    },
}

/// Entity-specific validation failure reported by a [`Payload`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .messages.join("; "))]
pub struct PayloadInvalid {
    /// One message per failed check.
    pub messages: Vec<String>,
}

impl PayloadInvalid {
    /// A failure with a single message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

impl From<validator::ValidationErrors> for PayloadInvalid {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors {
                let detail = error
                    .message
                    .as_ref()
                    .map_or_else(|| error.code.to_string(), ToString::to_string);
                messages.push(format!("{field}: {detail}"));
            }
        }
        messages.sort();
        if messages.is_empty() {
            messages.push(errors.to_string());
        }
        Self { messages }
    }
}

impl From<serde_json::Error> for PayloadInvalid {
    fn from(error: serde_json::Error) -> Self {
        Self::new(format!("malformed payload: {error}"))
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Entity-specific data carried by a versioned record.
///
/// The core never interprets payloads. It asks them to merge a patch and to
/// validate themselves, and stores them as JSON.
pub trait Payload: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Storage collection name. Business keys are unique per kind.
    const KIND: &'static str;

    /// Partial update applied by `create_new_version`.
    type Patch: Clone + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Merge `patch` onto this payload, producing the successor payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadInvalid`] if the patch cannot be applied.
    fn apply(&self, patch: &Self::Patch) -> Result<Self, PayloadInvalid>;

    /// Entity-specific invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadInvalid`] describing every failed check.
    fn validate(&self) -> Result<(), PayloadInvalid> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VersionedRecord
// ---------------------------------------------------------------------------

/// One version row of a logical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord<P> {
    /// Identifier unique to this version row.
    pub id: RecordId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Identifier shared by all versions of the logical record.
    pub business_key: BusinessKey,
    /// 1, 2, 3, ... per business key.
    pub version: u32,
    /// Inclusive start of validity.
    pub valid_from: DateTime<Utc>,
    /// Exclusive end of validity; `None` while open.
    pub valid_to: Option<DateTime<Utc>>,
    /// True exactly for the open row.
    pub is_current: bool,
    /// When version 1 was created. Copied forward unchanged.
    pub created_at: DateTime<Utc>,
    /// Who created version 1. Copied forward unchanged.
    pub created_by: ActorId,
    /// Who produced this particular version.
    pub changed_by: ActorId,
    /// Entity data.
    pub payload: P,
}

impl<P> VersionedRecord<P> {
    /// Check the static shape rules of a single row.
    ///
    /// # Errors
    ///
    /// Returns the first [`ShapeError`] found.
    pub fn validate_shape(&self) -> Result<(), ShapeError> {
        if self.version == 0 {
            return Err(ShapeError::VersionZero);
        }
        if let Some(valid_to) = self.valid_to {
            if self.valid_from >= valid_to {
                return Err(ShapeError::EmptyInterval {
                    valid_from: self.valid_from,
                    valid_to,
                });
            }
        }
        let open = self.valid_to.is_none();
        if self.is_current != open {
            return Err(ShapeError::CurrentFlagMismatch {
                is_current: self.is_current,
                open,
            });
        }
        Ok(())
    }

    /// Whether `at` falls within `[valid_from, valid_to)`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.valid_from && self.valid_to.is_none_or(|end| at < end)
    }

    /// Lifecycle state of this row given the row that follows it.
    pub fn state_given<Q>(&self, successor: Option<&VersionedRecord<Q>>) -> RecordState {
        if self.is_current {
            return RecordState::ActiveCurrent;
        }
        match (self.valid_to, successor) {
            (Some(end), Some(next)) if next.valid_from == end => RecordState::ClosedHistorical,
            _ => RecordState::DeletedTerminal,
        }
    }

    /// Replace the payload, keeping every versioning field.
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> VersionedRecord<Q> {
        VersionedRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            business_key: self.business_key,
            version: self.version,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            is_current: self.is_current,
            created_at: self.created_at,
            created_by: self.created_by,
            changed_by: self.changed_by,
            payload: f(self.payload),
        }
    }

    /// Fallible variant of [`map_payload`](Self::map_payload).
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn try_map_payload<Q, E>(
        self,
        f: impl FnOnce(P) -> Result<Q, E>,
    ) -> Result<VersionedRecord<Q>, E> {
        let VersionedRecord {
            id,
            tenant_id,
            business_key,
            version,
            valid_from,
            valid_to,
            is_current,
            created_at,
            created_by,
            changed_by,
            payload,
        } = self;
        Ok(VersionedRecord {
            id,
            tenant_id,
            business_key,
            version,
            valid_from,
            valid_to,
            is_current,
            created_at,
            created_by,
            changed_by,
            payload: f(payload)?,
        })
    }
}

impl<P: Serialize> VersionedRecord<P> {
    /// Encode the payload as JSON for storage.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be serialized.
    pub fn to_raw(&self) -> Result<VersionedRecord<Value>, serde_json::Error> {
        let payload = serde_json::to_value(&self.payload)?;
        Ok(self.clone_shell(payload))
    }

    fn clone_shell(&self, payload: Value) -> VersionedRecord<Value> {
        VersionedRecord {
            id: self.id,
            tenant_id: self.tenant_id.clone(),
            business_key: self.business_key.clone(),
            version: self.version,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            is_current: self.is_current,
            created_at: self.created_at,
            created_by: self.created_by.clone(),
            changed_by: self.changed_by.clone(),
            payload,
        }
    }
}

impl VersionedRecord<Value> {
    /// Decode a stored JSON payload into a typed one.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload does not match `P`.
    pub fn decode<P: DeserializeOwned>(self) -> Result<VersionedRecord<P>, serde_json::Error> {
        self.try_map_payload(serde_json::from_value)
    }
}

/// Derive the lifecycle state of every row of a chain ordered by version.
pub fn derive_states<P>(chain: &[VersionedRecord<P>]) -> Vec<RecordState> {
    chain
        .iter()
        .enumerate()
        .map(|(i, row)| row.state_given(chain.get(i.saturating_add(1))))
        .collect()
}

/// Drop sub-microsecond precision so stores agree on interval boundaries.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Apply an RFC 7396 JSON merge patch to `target` in place.
///
/// Objects merge recursively, `null` removes a member, and any other patch
/// value replaces the target wholesale.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_members) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_members) = target {
        for (name, value) in patch_members {
            if value.is_null() {
                target_members.remove(name);
            } else {
                merge_patch(
                    target_members.entry(name.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}
