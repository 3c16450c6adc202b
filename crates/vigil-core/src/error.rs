//! Error types for the versioning core.
//!
//! [`VersionError`] is what every lifecycle, query, and repository
//! operation returns. Storage adapters report [`StoreError`], which the
//! core maps onto the conflict and persistence variants.

use vigil_types::{BusinessKey, PayloadInvalid};

/// Errors returned by versioned-record operations.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    /// The payload failed entity-specific checks. Caller-correctable.
    #[error("validation failed: {0}")]
    Validation(#[from] PayloadInvalid),

    /// No current version exists. Covers both "never existed" and "deleted".
    #[error("{kind} `{key}` not found")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Business key or row ID that was looked up.
        key: String,
    },

    /// A concurrent writer won the compare-and-swap. Reload and retry.
    ///
    /// `expected` is the current version the losing writer based its change
    /// on, or `None` when it expected the key to have no current version.
    #[error("{kind} `{business_key}` {}", conflict_detail(*.expected))]
    Conflict {
        /// Entity kind.
        kind: &'static str,
        /// Contended business key.
        business_key: BusinessKey,
        /// Version the writer expected to be current.
        expected: Option<u32>,
    },

    /// The underlying store failed. Nothing was applied.
    #[error("persistence error: {0}")]
    Persistence(String),
}

fn conflict_detail(expected: Option<u32>) -> String {
    expected.map_or_else(
        || String::from("is already taken"),
        |version| format!("changed concurrently (expected current version {version})"),
    )
}

impl VersionError {
    /// Whether the operation may succeed if re-derived against fresh state.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether this is a [`VersionError::NotFound`].
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub(crate) fn from_store(kind: &'static str, error: StoreError) -> Self {
        match error {
            StoreError::Conflict {
                business_key,
                expected,
            } => Self::Conflict {
                kind,
                business_key,
                expected,
            },
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

/// Errors reported by a [`RecordStore`](crate::store::RecordStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The compare-and-swap precondition did not hold.
    #[error("compare-and-swap failed for `{business_key}` (expected {expected:?})")]
    Conflict {
        /// Contended business key.
        business_key: BusinessKey,
        /// Version expected to be current, or `None` for an opening insert.
        expected: Option<u32>,
    },

    /// Infrastructure failure. The write had no effect.
    #[error("{0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_version_conflict() {
        let err = VersionError::from_store(
            "case",
            StoreError::Conflict {
                business_key: BusinessKey::new("case-1"),
                expected: Some(2),
            },
        );
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "case `case-1` changed concurrently (expected current version 2)"
        );
    }

    #[test]
    fn opening_conflict_reads_as_taken_key() {
        let err = VersionError::Conflict {
            kind: "case",
            business_key: BusinessKey::new("case-1"),
            expected: None,
        };
        assert_eq!(err.to_string(), "case `case-1` is already taken");
    }

    #[test]
    fn backend_failure_maps_to_persistence() {
        let err = VersionError::from_store("case", StoreError::Backend("disk full".to_owned()));
        assert!(matches!(err, VersionError::Persistence(ref m) if m == "disk full"));
        assert!(!err.is_conflict());
    }
}
