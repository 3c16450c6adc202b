//! Whole-chain invariant checks.
//!
//! For every business key:
//! 1. at most one row is current, and only the last row may be;
//! 2. versions run 1, 2, 3, ... without gaps;
//! 3. each version starts exactly where its predecessor ended, unless the
//!    predecessor was soft-deleted and the chain was later reopened;
//! 4. identity and audit fields (`tenant_id`, `created_at`, `created_by`)
//!    are the same on every row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_types::{ShapeError, VersionedRecord};

/// One broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum ChainViolation {
    /// A single row fails its static shape checks.
    #[error("version {version}: {message}")]
    Shape {
        /// Offending version.
        version: u32,
        /// The shape error.
        message: String,
    },

    /// More than one row is current.
    #[error("{count} rows are current")]
    MultipleCurrent {
        /// Number of current rows.
        count: usize,
    },

    /// A current row is followed by another row.
    #[error("version {version} is current but not the latest")]
    CurrentNotLatest {
        /// Offending version.
        version: u32,
    },

    /// Version numbers skip, repeat, or do not start at 1.
    #[error("expected version {expected}, found {found}")]
    VersionGap {
        /// Version the sequence called for.
        expected: u32,
        /// Version actually present.
        found: u32,
    },

    /// A version starts before its predecessor ended.
    #[error("version {version} starts at {valid_from}, before predecessor ended at {predecessor_end}")]
    Overlap {
        /// Offending version.
        version: u32,
        /// Its start.
        valid_from: DateTime<Utc>,
        /// The predecessor's end.
        predecessor_end: DateTime<Utc>,
    },

    /// A version starts after its predecessor ended, and reopening is not
    /// allowed for this kind.
    #[error("version {version} leaves a gap after its predecessor")]
    Gap {
        /// Offending version.
        version: u32,
    },

    /// A field that must be copied forward changed.
    #[error("version {version} changed immutable field `{field}`")]
    ImmutableFieldChanged {
        /// Offending version.
        version: u32,
        /// Name of the field.
        field: &'static str,
    },
}

impl From<(u32, ShapeError)> for ChainViolation {
    fn from((version, error): (u32, ShapeError)) -> Self {
        Self::Shape {
            version,
            message: error.to_string(),
        }
    }
}

/// Check a chain ordered by version. Returns every violation found.
///
/// `allow_reopen` permits a gap after a soft-deleted row.
pub fn check_chain<P>(chain: &[VersionedRecord<P>], allow_reopen: bool) -> Vec<ChainViolation> {
    let mut violations = Vec::new();

    let current_count = chain.iter().filter(|r| r.is_current).count();
    if current_count > 1 {
        violations.push(ChainViolation::MultipleCurrent {
            count: current_count,
        });
    }

    let mut expected: u32 = 1;
    let mut previous: Option<&VersionedRecord<P>> = None;
    for row in chain {
        if let Err(error) = row.validate_shape() {
            violations.push((row.version, error).into());
        }
        if row.version != expected {
            violations.push(ChainViolation::VersionGap {
                expected,
                found: row.version,
            });
        }
        expected = row.version.saturating_add(1);

        if let Some(prev) = previous {
            check_link(prev, row, allow_reopen, &mut violations);
        }
        previous = Some(row);
    }

    violations
}

fn check_link<P>(
    prev: &VersionedRecord<P>,
    row: &VersionedRecord<P>,
    allow_reopen: bool,
    violations: &mut Vec<ChainViolation>,
) {
    if prev.is_current {
        violations.push(ChainViolation::CurrentNotLatest {
            version: prev.version,
        });
    }
    if let Some(end) = prev.valid_to {
        if row.valid_from < end {
            violations.push(ChainViolation::Overlap {
                version: row.version,
                valid_from: row.valid_from,
                predecessor_end: end,
            });
        } else if row.valid_from > end && !allow_reopen {
            violations.push(ChainViolation::Gap {
                version: row.version,
            });
        }
    }

    let changed = [
        ("tenant_id", prev.tenant_id != row.tenant_id),
        ("created_at", prev.created_at != row.created_at),
        ("created_by", prev.created_by != row.created_by),
        ("business_key", prev.business_key != row.business_key),
    ];
    for (field, differs) in changed {
        if differs {
            violations.push(ChainViolation::ImmutableFieldChanged {
                version: row.version,
                field,
            });
        }
    }
}
