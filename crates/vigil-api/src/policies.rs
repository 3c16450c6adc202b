//! REST handlers for tenant policies.
//!
//! Reads never fail for an unconfigured tenant: they return the default
//! preset with `"source": {"kind": "default", ...}`.
//!
//! # Endpoints (per category, e.g. `contact-matching`)
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/policies/contact-matching` | Policy in effect |
//! | `PUT` | `/api/policies/contact-matching` | Change it (`reason` required) |
//! | `DELETE` | `/api/policies/contact-matching` | Reset to the default preset |
//! | `GET` | `/api/policies/contact-matching/history` | Stored versions |
//! | `GET` | `/api/policies/contact-matching/as-of?at=` | Policy in effect at an instant |
//! | `GET` | `/api/policies/contact-matching/parameters/{name}` | One parameter |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use vigil_core::PolicyResolver;
use vigil_types::{ContactMatchingParams, InteractionParams, InvitationParams, NoteParams, PolicyParams, PolicyPatch};

use crate::context::{Actor, Tenant};
use crate::error::ApiError;
use crate::handlers::AsOfQuery;
use crate::state::AppState;

/// A policy category served over HTTP.
pub trait ExposedPolicy: PolicyParams {
    /// The resolver for this category.
    fn resolver(state: &AppState) -> &PolicyResolver<Self>;
}

impl ExposedPolicy for ContactMatchingParams {
    fn resolver(state: &AppState) -> &PolicyResolver<Self> {
        &state.contact_matching
    }
}

impl ExposedPolicy for InvitationParams {
    fn resolver(state: &AppState) -> &PolicyResolver<Self> {
        &state.invitation
    }
}

impl ExposedPolicy for NoteParams {
    fn resolver(state: &AppState) -> &PolicyResolver<Self> {
        &state.note
    }
}

impl ExposedPolicy for InteractionParams {
    fn resolver(state: &AppState) -> &PolicyResolver<Self> {
        &state.interaction
    }
}

/// Request body for `PUT /api/policies/{category}`.
#[derive(Debug, Deserialize)]
pub struct PolicyUpdateRequest {
    /// Version the caller last read. When set, the update fails with 409 if
    /// it is no longer current; when absent, the update is retried against
    /// fresh state on conflict.
    #[serde(default)]
    pub expected_version: Option<u32>,
    /// Parameter patch, optional preset reset, and reason.
    #[serde(flatten)]
    pub patch: PolicyPatch,
}

/// Return the policy governing the tenant.
pub async fn get_policy<P: ExposedPolicy>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let resolved = P::resolver(&state).find_current_policy(&tenant_id).await?;
    Ok(Json(resolved))
}

/// Change the tenant's policy. An unconfigured tenant is seeded from the
/// default preset first.
pub async fn put_policy<P: ExposedPolicy>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    body: Result<Json<PolicyUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let resolver = P::resolver(&state);
    let record = match body.expected_version {
        Some(expected) => {
            resolver
                .update_expecting(&tenant_id, expected, &body.patch, &actor)
                .await?
        }
        None => resolver.update_with_retry(&tenant_id, &body.patch, &actor).await?,
    };
    Ok(Json(record))
}

/// Drop the tenant's stored policy so the default applies again.
pub async fn reset_policy<P: ExposedPolicy>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
) -> Result<impl IntoResponse, ApiError> {
    P::resolver(&state).reset(&tenant_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Return every stored version of the tenant's policy.
pub async fn policy_history<P: ExposedPolicy>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let versions = P::resolver(&state).policy_history(&tenant_id).await?;
    Ok(Json(serde_json::json!({
        "category": P::CATEGORY,
        "count": versions.len(),
        "versions": versions,
    })))
}

/// Return the policy that governed the tenant at `?at=`.
pub async fn policy_as_of<P: ExposedPolicy>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let resolved = P::resolver(&state).policy_as_of(&tenant_id, query.at).await?;
    Ok(Json(resolved))
}

/// Return a single parameter of the policy governing the tenant.
pub async fn get_parameter<P: ExposedPolicy>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let value = P::resolver(&state).resolve_parameter(&tenant_id, &name).await?;
    Ok(Json(serde_json::json!({
        "category": P::CATEGORY,
        "name": name,
        "value": value,
    })))
}
