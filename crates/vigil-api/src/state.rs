//! Shared application state for the API server.
//!
//! [`AppState`] holds one repository per exposed entity kind and one
//! resolver per policy category, all built from the same
//! [`RecordEngine`] so they share a store and clock.

use vigil_core::{PolicyResolver, RecordEngine, Repository};
use vigil_types::{CaseFile, CaseNote, ContactMatchingParams, InteractionParams, InvitationParams, NoteParams};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Funeral cases.
    pub cases: Repository<CaseFile>,
    /// Notes attached to cases.
    pub notes: Repository<CaseNote>,
    /// Contact-matching policies.
    pub contact_matching: PolicyResolver<ContactMatchingParams>,
    /// Family invitation policies.
    pub invitation: PolicyResolver<InvitationParams>,
    /// Case-note policies.
    pub note: PolicyResolver<NoteParams>,
    /// Family interaction policies.
    pub interaction: PolicyResolver<InteractionParams>,
}

impl AppState {
    /// Build every repository and resolver from `engine`.
    pub fn new(engine: &RecordEngine) -> Self {
        Self {
            cases: engine.repository(),
            notes: engine.repository(),
            contact_matching: engine.policies(),
            invitation: engine.policies(),
            note: engine.policies(),
            interaction: engine.policies(),
        }
    }
}
