//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Record lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a single version row.
///
/// The state is derived from a row and its successor; it is never stored.
/// `ClosedHistorical` and `DeletedTerminal` are final for the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    /// The open row representing present-day truth.
    ActiveCurrent,
    /// Closed and immediately followed by a successor version.
    ClosedHistorical,
    /// Closed by a soft delete with no immediate successor.
    DeletedTerminal,
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Built-in policy presets a tenant starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Preset {
    /// The platform default.
    #[default]
    Standard,
    /// Tighter thresholds, fewer automatic actions.
    Strict,
    /// Looser thresholds, more automation.
    Relaxed,
}

impl Preset {
    /// Parse a preset from its wire name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "STANDARD" => Some(Self::Standard),
            "STRICT" => Some(Self::Strict),
            "RELAXED" => Some(Self::Relaxed),
            _ => None,
        }
    }
}

/// Configuration categories, each backed by its own versioned policy chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "kebab-case")]
pub enum PolicyCategory {
    /// Duplicate-contact detection and merging.
    ContactMatching,
    /// Family/guest invitations.
    Invitation,
    /// Case notes.
    Note,
    /// CRM interaction cadence.
    Interaction,
}

impl PolicyCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::ContactMatching,
        Self::Invitation,
        Self::Note,
        Self::Interaction,
    ];

    /// Storage collection name for this category's policy rows.
    pub const fn storage_kind(self) -> &'static str {
        match self {
            Self::ContactMatching => "policy.contact_matching",
            Self::Invitation => "policy.invitation",
            Self::Note => "policy.note",
            Self::Interaction => "policy.interaction",
        }
    }

    /// URL slug, matching the serde representation.
    pub const fn slug(self) -> &'static str {
        match self {
            Self::ContactMatching => "contact-matching",
            Self::Invitation => "invitation",
            Self::Note => "note",
            Self::Interaction => "interaction",
        }
    }

    /// Parse a category from its URL slug.
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug() == slug)
    }
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

/// Workflow status of a case file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    /// First call received, arrangements not started.
    #[default]
    Inquiry,
    /// Arrangement conference in progress.
    Arranging,
    /// Services scheduled.
    Scheduled,
    /// Services held, paperwork pending.
    Completed,
    /// Case closed and billed.
    Archived,
}
