//! Policy resolution: per-tenant configuration with default fallback.
//!
//! A policy is an ordinary versioned record whose business key is derived
//! from its category and tenant (see [`policy_business_key`]). Every change
//! goes through the same lifecycle as business data, so each one is
//! audited and [`PolicyResolver::policy_as_of`] can reconstruct which
//! parameters governed a past decision.
//!
//! Reads never fail for a missing policy: a tenant that has not configured
//! a category (or has reset it) is governed by the default preset.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use vigil_types::{
    ActorId, BusinessKey, Payload, Policy, PolicyCategory, PolicyParams, PolicyPatch, Preset, TenantId,
    VersionedRecord, policy_business_key,
};

use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::error::VersionError;
use crate::guard::{RetryPolicy, retry_on_conflict};
use crate::lifecycle::NewRecord;
use crate::repository::Repository;
use crate::store::RecordStore;

/// Reason recorded on a policy seeded implicitly from the default preset.
const SEED_REASON: &str = "seeded from default preset";

/// Errors from parameter lookups.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The category has no parameter with this name.
    #[error("{category} policy has no parameter `{name}`")]
    UnknownParameter {
        /// Category slug.
        category: &'static str,
        /// Requested parameter name.
        name: String,
    },

    /// The underlying record operation failed.
    #[error(transparent)]
    Version(#[from] VersionError),
}

/// Where a resolved policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySource {
    /// The tenant's stored policy.
    Configured {
        /// Version of the policy record.
        version: u32,
    },
    /// No stored policy applies; the built-in preset does.
    Default {
        /// The preset in effect.
        preset: Preset,
    },
}

/// The policy governing a tenant for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound = "P: PolicyParams")]
pub struct ResolvedPolicy<P> {
    /// Tenant the policy applies to.
    pub tenant_id: TenantId,
    /// Policy category.
    pub category: PolicyCategory,
    /// Stored or default.
    pub source: PolicySource,
    /// Start of the stored version's validity. `None` for defaults.
    pub valid_from: Option<DateTime<Utc>>,
    /// Who made the stored version. `None` for defaults.
    pub changed_by: Option<ActorId>,
    /// Preset, reason, and parameters.
    pub policy: Policy<P>,
}

impl<P: PolicyParams> ResolvedPolicy<P> {
    /// The resolved parameters.
    pub const fn params(&self) -> &P {
        &self.policy.params
    }

    /// Whether the tenant has a stored policy in effect.
    pub const fn is_configured(&self) -> bool {
        matches!(self.source, PolicySource::Configured { .. })
    }

    fn configured(record: VersionedRecord<Policy<P>>) -> Self {
        Self {
            tenant_id: record.tenant_id,
            category: P::CATEGORY,
            source: PolicySource::Configured {
                version: record.version,
            },
            valid_from: Some(record.valid_from),
            changed_by: Some(record.changed_by),
            policy: record.payload,
        }
    }

    fn default_for(tenant_id: &TenantId, preset: Preset) -> Self {
        Self {
            tenant_id: tenant_id.clone(),
            category: P::CATEGORY,
            source: PolicySource::Default { preset },
            valid_from: None,
            changed_by: None,
            policy: Policy::from_preset(preset, "platform default"),
        }
    }
}

/// Resolves and updates one policy category for any tenant.
pub struct PolicyResolver<P> {
    repository: Repository<Policy<P>>,
    default_preset: Preset,
    retry: RetryPolicy,
}

impl<P> Clone for PolicyResolver<P> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            default_preset: self.default_preset,
            retry: self.retry.clone(),
        }
    }
}

impl<P: PolicyParams> PolicyResolver<P> {
    /// Resolver over `store`, configured from `config`.
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        // A reset policy chain can always be configured again.
        let repository = Repository::new(store, clock)
            .with_reopen(true)
            .with_retry(config.retry.clone());
        Self {
            repository,
            default_preset: config.default_preset,
            retry: config.retry.clone(),
        }
    }

    /// Business key of `tenant_id`'s policy chain.
    pub fn business_key(tenant_id: &TenantId) -> BusinessKey {
        policy_business_key(P::CATEGORY, tenant_id)
    }

    /// Preset that applies when nothing is configured.
    pub const fn default_preset(&self) -> Preset {
        self.default_preset
    }

    /// The policy governing `tenant_id` now.
    ///
    /// # Errors
    ///
    /// Only [`VersionError::Persistence`]; an unconfigured tenant gets the
    /// default preset.
    pub async fn find_current_policy(&self, tenant_id: &TenantId) -> Result<ResolvedPolicy<P>, VersionError> {
        let key = Self::business_key(tenant_id);
        match self.repository.find_by_business_key(&key).await {
            Ok(record) => Ok(ResolvedPolicy::configured(record)),
            Err(err) if err.is_not_found() => {
                tracing::debug!(
                    category = P::CATEGORY.slug(),
                    tenant_id = %tenant_id,
                    preset = ?self.default_preset,
                    "No policy configured, using default preset"
                );
                Ok(ResolvedPolicy::default_for(tenant_id, self.default_preset))
            }
            Err(err) => Err(err),
        }
    }

    /// Read one value off the current parameters.
    pub async fn resolve_with<T>(&self, tenant_id: &TenantId, read: impl FnOnce(&P) -> T) -> Result<T, VersionError> {
        let resolved = self.find_current_policy(tenant_id).await?;
        Ok(read(resolved.params()))
    }

    /// Read one parameter by its field name.
    pub async fn resolve_parameter(&self, tenant_id: &TenantId, name: &str) -> Result<Value, PolicyError> {
        let resolved = self.find_current_policy(tenant_id).await?;
        let params = serde_json::to_value(resolved.params())
            .map_err(|e| VersionError::Persistence(format!("cannot encode {} parameters: {e}", P::CATEGORY.slug())))?;
        params
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownParameter {
                category: P::CATEGORY.slug(),
                name: name.to_owned(),
            })
    }

    /// The policy that governed `tenant_id` at `at`.
    ///
    /// Instants before the first configuration, or after a reset, resolve
    /// to the default preset.
    pub async fn policy_as_of(
        &self,
        tenant_id: &TenantId,
        at: DateTime<Utc>,
    ) -> Result<ResolvedPolicy<P>, VersionError> {
        let key = Self::business_key(tenant_id);
        match self.repository.find_as_of(&key, at).await {
            Ok(record) => Ok(ResolvedPolicy::configured(record)),
            Err(err) if err.is_not_found() => Ok(ResolvedPolicy::default_for(tenant_id, self.default_preset)),
            Err(err) => Err(err),
        }
    }

    /// Store a first policy for `tenant_id`, seeded from `preset`.
    ///
    /// # Errors
    ///
    /// [`VersionError::Conflict`] if the tenant already has one.
    pub async fn configure(
        &self,
        tenant_id: &TenantId,
        preset: Preset,
        reason: &str,
        actor: &ActorId,
    ) -> Result<VersionedRecord<Policy<P>>, VersionError> {
        self.repository
            .create(NewRecord {
                tenant_id: tenant_id.clone(),
                business_key: Some(Self::business_key(tenant_id)),
                actor: actor.clone(),
                payload: Policy::from_preset(preset, reason),
            })
            .await
    }

    /// Supersede the tenant's stored policy with `patch` applied.
    ///
    /// # Errors
    ///
    /// [`VersionError::NotFound`] if nothing is configured yet,
    /// [`VersionError::Validation`] if the reason is missing or the result
    /// is out of range.
    pub async fn update(
        &self,
        tenant_id: &TenantId,
        patch: &PolicyPatch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<Policy<P>>, VersionError> {
        self.repository
            .create_new_version(&Self::business_key(tenant_id), patch, actor)
            .await
    }

    /// [`update`](Self::update), only if `expected_version` is still current.
    pub async fn update_expecting(
        &self,
        tenant_id: &TenantId,
        expected_version: u32,
        patch: &PolicyPatch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<Policy<P>>, VersionError> {
        self.repository
            .create_new_version_expecting(&Self::business_key(tenant_id), expected_version, patch, actor)
            .await
    }

    /// Apply `patch` to whatever governs the tenant now, retrying on
    /// conflict. An unconfigured tenant gets a policy seeded from the
    /// default preset with `patch` applied.
    pub async fn update_with_retry(
        &self,
        tenant_id: &TenantId,
        patch: &PolicyPatch,
        actor: &ActorId,
    ) -> Result<VersionedRecord<Policy<P>>, VersionError> {
        let repository = &self.repository;
        let key = &Self::business_key(tenant_id);
        let default_preset = self.default_preset;
        retry_on_conflict(&self.retry, move |_attempt| async move {
            match repository.find_by_business_key(key).await {
                Ok(current) => {
                    repository
                        .create_new_version_expecting(key, current.version, patch, actor)
                        .await
                }
                Err(err) if err.is_not_found() => {
                    let payload = Policy::<P>::from_preset(default_preset, SEED_REASON).apply(patch)?;
                    repository
                        .create(NewRecord {
                            tenant_id: tenant_id.clone(),
                            business_key: Some(key.clone()),
                            actor: actor.clone(),
                            payload,
                        })
                        .await
                }
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Drop the tenant's stored policy so the default applies again.
    /// History is kept.
    pub async fn reset(&self, tenant_id: &TenantId, actor: &ActorId) -> Result<(), VersionError> {
        self.repository.delete(&Self::business_key(tenant_id), actor).await
    }

    /// Every stored version of the tenant's policy, ascending. Empty if the
    /// tenant never configured this category.
    pub async fn policy_history(&self, tenant_id: &TenantId) -> Result<Vec<VersionedRecord<Policy<P>>>, VersionError> {
        match self.repository.find_history(&Self::business_key(tenant_id)).await {
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }
}
