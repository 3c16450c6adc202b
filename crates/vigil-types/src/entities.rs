//! Sample versioned business entities.
//!
//! Cases and notes are the most frequently edited records on the platform.
//! Their validation rules live here with the payload; the versioning core
//! only calls [`Payload::validate`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::{Validate, ValidationError};

use crate::enums::CaseStatus;
use crate::ids::BusinessKey;
use crate::record::{Payload, PayloadInvalid};

// ---------------------------------------------------------------------------
// Case file
// ---------------------------------------------------------------------------

/// A funeral case: one decedent, one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CaseFile {
    /// Human-facing case number, e.g. `2026-0142`.
    #[validate(length(min = 1, max = 64))]
    pub case_number: String,
    /// Full name of the deceased.
    #[validate(length(min = 1, max = 200))]
    pub decedent_name: String,
    /// Workflow status.
    #[serde(default)]
    pub status: CaseStatus,
    /// Contracted amount for goods and services.
    #[validate(custom(function = "non_negative"))]
    #[ts(type = "string")]
    pub contract_amount: Decimal,
}

/// Partial update of a [`CaseFile`]. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
pub struct CaseFilePatch {
    /// New case number.
    #[serde(default)]
    pub case_number: Option<String>,
    /// Corrected decedent name.
    #[serde(default)]
    pub decedent_name: Option<String>,
    /// New workflow status.
    #[serde(default)]
    pub status: Option<CaseStatus>,
    /// Amended contract amount.
    #[serde(default)]
    #[ts(type = "string | null")]
    pub contract_amount: Option<Decimal>,
}

fn non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

impl Payload for CaseFile {
    const KIND: &'static str = "case";

    type Patch = CaseFilePatch;

    fn apply(&self, patch: &CaseFilePatch) -> Result<Self, PayloadInvalid> {
        Ok(Self {
            case_number: patch
                .case_number
                .clone()
                .unwrap_or_else(|| self.case_number.clone()),
            decedent_name: patch
                .decedent_name
                .clone()
                .unwrap_or_else(|| self.decedent_name.clone()),
            status: patch.status.unwrap_or(self.status),
            contract_amount: patch.contract_amount.unwrap_or(self.contract_amount),
        })
    }

    fn validate(&self) -> Result<(), PayloadInvalid> {
        Validate::validate(self)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Case note
// ---------------------------------------------------------------------------

/// A staff note attached to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CaseNote {
    /// Business key of the case the note belongs to.
    pub case_key: BusinessKey,
    /// Note text.
    #[validate(length(min = 1, max = 100_000))]
    pub body: String,
    /// Whether the note is pinned to the top of the case.
    #[serde(default)]
    pub pinned: bool,
}

/// Partial update of a [`CaseNote`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
pub struct CaseNotePatch {
    /// Replacement text.
    #[serde(default)]
    pub body: Option<String>,
    /// New pin state.
    #[serde(default)]
    pub pinned: Option<bool>,
}

impl Payload for CaseNote {
    const KIND: &'static str = "note";

    type Patch = CaseNotePatch;

    fn apply(&self, patch: &CaseNotePatch) -> Result<Self, PayloadInvalid> {
        Ok(Self {
            case_key: self.case_key.clone(),
            body: patch.body.clone().unwrap_or_else(|| self.body.clone()),
            pinned: patch.pinned.unwrap_or(self.pinned),
        })
    }

    fn validate(&self) -> Result<(), PayloadInvalid> {
        if self.case_key.is_blank() {
            return Err(PayloadInvalid::new("case_key: must not be blank"));
        }
        Validate::validate(self)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn case() -> CaseFile {
        CaseFile {
            case_number: "2026-0142".to_owned(),
            decedent_name: "Ada Byron".to_owned(),
            status: CaseStatus::Inquiry,
            contract_amount: Decimal::new(100, 0),
        }
    }

    #[test]
    fn patch_leaves_absent_fields_unchanged() {
        let patch = CaseFilePatch {
            contract_amount: Some(Decimal::new(150, 0)),
            ..CaseFilePatch::default()
        };
        let next = case().apply(&patch).unwrap();
        assert_eq!(next.contract_amount, Decimal::new(150, 0));
        assert_eq!(next.decedent_name, "Ada Byron");
        assert_eq!(next.status, CaseStatus::Inquiry);
    }

    #[test]
    fn negative_amount_rejected() {
        let mut bad = case();
        bad.contract_amount = Decimal::new(-1, 0);
        let err = Payload::validate(&bad).unwrap_err();
        assert!(err.messages.iter().any(|m| m.starts_with("contract_amount")));
    }

    #[test]
    fn empty_name_rejected() {
        let mut bad = case();
        bad.decedent_name = String::new();
        assert!(Payload::validate(&bad).is_err());
    }

    #[test]
    fn note_requires_case_key() {
        let note = CaseNote {
            case_key: BusinessKey::new(""),
            body: "Family prefers lilies".to_owned(),
            pinned: false,
        };
        assert!(Payload::validate(&note).is_err());
    }

    #[test]
    fn note_patch_cannot_move_note_between_cases() {
        let note = CaseNote {
            case_key: BusinessKey::new("case-1"),
            body: "Call back Tuesday".to_owned(),
            pinned: false,
        };
        let patch: Result<CaseNotePatch, _> =
            serde_json::from_str(r#"{"case_key": "case-2"}"#);
        assert!(patch.is_err());

        let pinned = note
            .apply(&CaseNotePatch {
                pinned: Some(true),
                ..CaseNotePatch::default()
            })
            .unwrap();
        assert_eq!(pinned.case_key.as_str(), "case-1");
        assert!(pinned.pinned);
    }
}
