//! Shared type definitions for the Vigil record-versioning core.
//!
//! Every mutable business entity on the platform (cases, contracts, notes,
//! invitations, campaigns, photos) and every per-tenant configuration
//! policy is stored as a chain of [`VersionedRecord`] rows. This crate
//! holds the record shape, the identifiers, and the payload types; the
//! behavior lives in `vigil-core`.
//!
//! # Modules
//!
//! - [`ids`] -- Typed identifiers (row IDs, business keys, tenants, actors)
//! - [`enums`] -- Record states, policy categories and presets, case status
//! - [`record`] -- [`VersionedRecord`], the [`Payload`] trait, shape checks
//! - [`policy`] -- Policy payload and per-category parameter sets
//! - [`entities`] -- Sample versioned business entities

pub mod entities;
pub mod enums;
pub mod ids;
pub mod policy;
pub mod record;

// Re-export all public types at crate root for convenience.
pub use entities::{CaseFile, CaseFilePatch, CaseNote, CaseNotePatch};
pub use enums::{CaseStatus, PolicyCategory, Preset, RecordState};
pub use ids::{ActorId, BusinessKey, RecordId, TenantId};
pub use policy::{
    ContactMatchingParams, InteractionParams, InvitationParams, NoteParams, Policy, PolicyParams,
    PolicyPatch, policy_business_key,
};
pub use record::{
    Payload, PayloadInvalid, ShapeError, VersionedRecord, derive_states, merge_patch,
    truncate_to_micros,
};
