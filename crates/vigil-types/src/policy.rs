//! Per-tenant configuration policies.
//!
//! Every business rule that varies by tenant reads its parameters from a
//! [`Policy`], which is stored as an ordinary versioned record. Each
//! [`PolicyCategory`] has its own strongly typed parameter set and three
//! built-in presets. A tenant that never configured a category is governed
//! by the platform default preset.

use core::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use validator::{Validate, ValidationError};

use crate::enums::{PolicyCategory, Preset};
use crate::ids::{BusinessKey, TenantId};
use crate::record::{merge_patch, Payload, PayloadInvalid};

/// A typed parameter set for one policy category.
pub trait PolicyParams:
    Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + Validate + 'static
{
    /// The category these parameters configure.
    const CATEGORY: PolicyCategory;

    /// Parameter values for a built-in preset.
    fn preset(preset: Preset) -> Self;
}

/// Business key of a tenant's policy chain for a category.
///
/// Deterministic, so concurrent writers for the same tenant and category
/// contend on the same compare-and-swap.
pub fn policy_business_key(category: PolicyCategory, tenant_id: &TenantId) -> BusinessKey {
    BusinessKey::new(format!("policy:{}:{tenant_id}", category.slug()))
}

// ---------------------------------------------------------------------------
// Policy payload
// ---------------------------------------------------------------------------

/// The payload of a policy version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "P: PolicyParams")]
pub struct Policy<P> {
    /// Preset the parameters were last reset from.
    pub preset: Preset,
    /// Why this version exists.
    pub reason: String,
    /// The parameters consumed by business rules.
    pub params: P,
}

impl<P: PolicyParams> Policy<P> {
    /// A policy holding a preset's parameters.
    pub fn from_preset(preset: Preset, reason: impl Into<String>) -> Self {
        Self {
            preset,
            reason: reason.into(),
            params: P::preset(preset),
        }
    }
}

/// A change to a policy.
///
/// `params` is an RFC 7396 merge patch over the current parameters. When
/// `preset` is set the parameters are first reset to that preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPatch {
    /// Partial parameters to merge.
    #[serde(default)]
    pub params: Value,
    /// Optional preset to reset to before merging.
    #[serde(default)]
    pub preset: Option<Preset>,
    /// Why the change is made. Required.
    pub reason: String,
}

impl PolicyPatch {
    /// A patch that merges `params` with the given reason.
    pub fn merge(params: Value, reason: impl Into<String>) -> Self {
        Self {
            params,
            preset: None,
            reason: reason.into(),
        }
    }
}

impl<P: PolicyParams> Payload for Policy<P> {
    const KIND: &'static str = P::CATEGORY.storage_kind();

    type Patch = PolicyPatch;

    fn apply(&self, patch: &PolicyPatch) -> Result<Self, PayloadInvalid> {
        let base = patch.preset.map_or_else(|| self.params.clone(), P::preset);
        let mut doc = serde_json::to_value(&base)?;
        // An absent `params` leaves the parameters as they are.
        if !patch.params.is_null() {
            merge_patch(&mut doc, &patch.params);
        }
        let params: P = serde_json::from_value(doc)?;
        Ok(Self {
            preset: patch.preset.unwrap_or(self.preset),
            reason: patch.reason.clone(),
            params,
        })
    }

    fn validate(&self) -> Result<(), PayloadInvalid> {
        if self.reason.trim().is_empty() {
            return Err(PayloadInvalid::new("reason: a policy change must state a reason"));
        }
        self.params.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contact matching
// ---------------------------------------------------------------------------

/// Duplicate-contact detection.
///
/// A candidate pair scores the weighted sum of matching fields (0-100).
/// Pairs at or above `min_threshold` are flagged for review; pairs at or
/// above `auto_merge_threshold` are merged automatically when enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_contact_matching"))]
pub struct ContactMatchingParams {
    /// Minimum score for a pair to be flagged as a possible duplicate.
    #[validate(range(min = 1, max = 100))]
    pub min_threshold: u8,
    /// Minimum score for an automatic merge.
    #[validate(range(min = 1, max = 100))]
    pub auto_merge_threshold: u8,
    /// Whether automatic merges run at all.
    pub auto_merge_enabled: bool,
    /// Weight of a full-name match.
    #[validate(range(max = 100))]
    pub name_weight: u8,
    /// Weight of an email match.
    #[validate(range(max = 100))]
    pub email_weight: u8,
    /// Weight of a phone match.
    #[validate(range(max = 100))]
    pub phone_weight: u8,
    /// Weight of a postal address match.
    #[validate(range(max = 100))]
    pub address_weight: u8,
}

fn validate_contact_matching(params: &ContactMatchingParams) -> Result<(), ValidationError> {
    if params.auto_merge_threshold < params.min_threshold {
        return Err(ValidationError::new("auto_merge_below_min_threshold"));
    }
    let total = u16::from(params.name_weight)
        .saturating_add(u16::from(params.email_weight))
        .saturating_add(u16::from(params.phone_weight))
        .saturating_add(u16::from(params.address_weight));
    if total != 100 {
        return Err(ValidationError::new("weights_must_sum_to_100"));
    }
    Ok(())
}

impl PolicyParams for ContactMatchingParams {
    const CATEGORY: PolicyCategory = PolicyCategory::ContactMatching;

    fn preset(preset: Preset) -> Self {
        let (min_threshold, auto_merge_threshold, auto_merge_enabled) = match preset {
            Preset::Standard => (75, 95, false),
            Preset::Strict => (85, 100, false),
            Preset::Relaxed => (60, 90, true),
        };
        Self {
            min_threshold,
            auto_merge_threshold,
            auto_merge_enabled,
            name_weight: 40,
            email_weight: 30,
            phone_weight: 20,
            address_weight: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

/// Family and guest invitations to a case portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
pub struct InvitationParams {
    /// Hours before an unanswered invitation expires.
    #[validate(range(min = 1, max = 720))]
    pub expiry_hours: u32,
    /// How many times staff may resend one invitation.
    #[validate(range(max = 10))]
    pub max_resends: u8,
    /// Whether invitations need staff approval before sending.
    pub require_staff_approval: bool,
    /// Whether a reminder goes out halfway to expiry.
    pub reminder_enabled: bool,
}

impl PolicyParams for InvitationParams {
    const CATEGORY: PolicyCategory = PolicyCategory::Invitation;

    fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Standard => Self {
                expiry_hours: 72,
                max_resends: 3,
                require_staff_approval: true,
                reminder_enabled: true,
            },
            Preset::Strict => Self {
                expiry_hours: 24,
                max_resends: 1,
                require_staff_approval: true,
                reminder_enabled: false,
            },
            Preset::Relaxed => Self {
                expiry_hours: 168,
                max_resends: 5,
                require_staff_approval: false,
                reminder_enabled: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Notes
// ---------------------------------------------------------------------------

/// Case notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
pub struct NoteParams {
    /// Longest accepted note body, in characters.
    #[validate(range(min = 1, max = 100_000))]
    pub max_body_length: u32,
    /// Minutes after creation during which the author may edit a note.
    #[validate(range(max = 10_080))]
    pub edit_window_minutes: u32,
    /// Whether notes can be pinned to the top of a case.
    pub allow_pinning: bool,
}

impl PolicyParams for NoteParams {
    const CATEGORY: PolicyCategory = PolicyCategory::Note;

    fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Standard => Self {
                max_body_length: 10_000,
                edit_window_minutes: 60,
                allow_pinning: true,
            },
            Preset::Strict => Self {
                max_body_length: 4_000,
                edit_window_minutes: 15,
                allow_pinning: false,
            },
            Preset::Relaxed => Self {
                max_body_length: 50_000,
                edit_window_minutes: 1_440,
                allow_pinning: true,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Interactions
// ---------------------------------------------------------------------------

/// Cadence of CRM follow-ups with families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_interaction"))]
pub struct InteractionParams {
    /// Days after services before the first follow-up.
    #[validate(range(min = 1, max = 365))]
    pub follow_up_days: u16,
    /// Upper bound on outreach per family per week.
    #[validate(range(min = 1, max = 14))]
    pub max_touches_per_week: u8,
    /// Hour (0-23, tenant local time) when quiet hours begin.
    #[validate(range(max = 23))]
    pub quiet_hours_start: u8,
    /// Hour (0-23, tenant local time) when quiet hours end.
    #[validate(range(max = 23))]
    pub quiet_hours_end: u8,
}

fn validate_interaction(params: &InteractionParams) -> Result<(), ValidationError> {
    if params.quiet_hours_start == params.quiet_hours_end {
        return Err(ValidationError::new("quiet_hours_must_not_be_empty"));
    }
    Ok(())
}

impl PolicyParams for InteractionParams {
    const CATEGORY: PolicyCategory = PolicyCategory::Interaction;

    fn preset(preset: Preset) -> Self {
        let (follow_up_days, max_touches_per_week) = match preset {
            Preset::Standard => (30, 3),
            Preset::Strict => (45, 1),
            Preset::Relaxed => (14, 5),
        };
        Self {
            follow_up_days,
            max_touches_per_week,
            quiet_hours_start: 20,
            quiet_hours_end: 8,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use serde_json::json;

    use super::*;

    fn every_preset<P: PolicyParams>() {
        for preset in [Preset::Standard, Preset::Strict, Preset::Relaxed] {
            assert!(
                P::preset(preset).validate().is_ok(),
                "{:?} preset {preset:?} is invalid",
                P::CATEGORY
            );
        }
    }

    #[test]
    fn all_presets_validate() {
        every_preset::<ContactMatchingParams>();
        every_preset::<InvitationParams>();
        every_preset::<NoteParams>();
        every_preset::<InteractionParams>();
    }

    #[test]
    fn standard_contact_matching_threshold_is_75() {
        assert_eq!(ContactMatchingParams::preset(Preset::Standard).min_threshold, 75);
    }

    #[test]
    fn policy_kind_follows_category() {
        assert_eq!(
            <Policy<ContactMatchingParams> as Payload>::KIND,
            "policy.contact_matching"
        );
        assert_eq!(<Policy<NoteParams> as Payload>::KIND, "policy.note");
    }

    #[test]
    fn business_key_is_deterministic_per_tenant() {
        let tenant = TenantId::new("fh-42");
        assert_eq!(
            policy_business_key(PolicyCategory::ContactMatching, &tenant).as_str(),
            "policy:contact-matching:fh-42"
        );
    }

    #[test]
    fn patch_merges_partial_params() {
        let current: Policy<ContactMatchingParams> =
            Policy::from_preset(Preset::Standard, "initial");
        let next = current
            .apply(&PolicyPatch::merge(json!({"min_threshold": 60}), "too many misses"))
            .unwrap();
        assert_eq!(next.params.min_threshold, 60);
        assert_eq!(next.params.auto_merge_threshold, 95);
        assert_eq!(next.reason, "too many misses");
        assert_eq!(next.preset, Preset::Standard);
    }

    #[test]
    fn patch_with_preset_resets_first() {
        let mut current: Policy<NoteParams> = Policy::from_preset(Preset::Standard, "initial");
        current.params.edit_window_minutes = 5;
        let patch = PolicyPatch {
            params: json!({"allow_pinning": true}),
            preset: Some(Preset::Strict),
            reason: "audit finding".to_owned(),
        };
        let next = current.apply(&patch).unwrap();
        assert_eq!(next.preset, Preset::Strict);
        assert_eq!(next.params.edit_window_minutes, 15);
        assert!(next.params.allow_pinning);
    }

    #[test]
    fn preset_only_patch_keeps_no_overrides() {
        let mut current: Policy<NoteParams> = Policy::from_preset(Preset::Standard, "initial");
        current.params.edit_window_minutes = 5;
        let patch: PolicyPatch =
            serde_json::from_value(json!({"preset": "STRICT", "reason": "compliance"})).unwrap();
        assert!(patch.params.is_null());
        let next = current.apply(&patch).unwrap();
        assert_eq!(next.params, NoteParams::preset(Preset::Strict));
    }

    #[test]
    fn unknown_parameter_in_patch_rejected() {
        let current: Policy<InvitationParams> = Policy::from_preset(Preset::Standard, "initial");
        let result = current.apply(&PolicyPatch::merge(json!({"expiry_days": 3}), "typo"));
        assert!(result.is_err());
    }

    #[test]
    fn blank_reason_fails_validation() {
        let policy: Policy<InvitationParams> = Policy::from_preset(Preset::Standard, "  ");
        assert!(policy.validate().is_err());
    }

    #[test]
    fn cross_field_rules_enforced() {
        let mut params = ContactMatchingParams::preset(Preset::Standard);
        params.auto_merge_threshold = 50;
        assert!(params.validate().is_err());

        let mut weights = ContactMatchingParams::preset(Preset::Standard);
        weights.name_weight = 90;
        assert!(weights.validate().is_err());

        let mut quiet = InteractionParams::preset(Preset::Standard);
        quiet.quiet_hours_end = quiet.quiet_hours_start;
        assert!(quiet.validate().is_err());
    }
}
