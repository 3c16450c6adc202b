//! REST handlers for versioned business entities.
//!
//! Each handler is generic over an [`Exposed`] entity and is mounted once
//! per entity kind by the router. Records of other tenants are reported as
//! not found.
//!
//! # Endpoints (per entity, e.g. `cases`)
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/cases` | Create version 1 |
//! | `GET` | `/api/cases` | Current rows of the tenant |
//! | `GET` | `/api/cases/{key}` | Current version |
//! | `PATCH` | `/api/cases/{key}` | New version (optional `expected_version`) |
//! | `DELETE` | `/api/cases/{key}` | Soft delete |
//! | `GET` | `/api/cases/{key}/history` | All versions with derived state |
//! | `GET` | `/api/cases/{key}/as-of?at=` | Version in effect at an instant |
//! | `GET` | `/api/cases/{key}/verify` | Chain invariant check |
//! | `GET` | `/api/cases/by-id/{id}` | Any row by ID |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use vigil_core::{NewRecord, Repository};
use vigil_types::{BusinessKey, CaseFile, CaseNote, Payload, RecordId, TenantId, VersionedRecord};

use crate::context::{Actor, Tenant};
use crate::error::ApiError;
use crate::state::AppState;

/// An entity kind served over HTTP.
pub trait Exposed: Payload {
    /// The repository holding this kind.
    fn repository(state: &AppState) -> &Repository<Self>;
}

impl Exposed for CaseFile {
    fn repository(state: &AppState) -> &Repository<Self> {
        &state.cases
    }
}

impl Exposed for CaseNote {
    fn repository(state: &AppState) -> &Repository<Self> {
        &state.notes
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/{entity}`.
#[derive(Debug, Deserialize)]
#[serde(bound = "P: DeserializeOwned")]
pub struct CreateRequest<P> {
    /// Business key to use. Generated when absent.
    #[serde(default)]
    pub business_key: Option<BusinessKey>,
    /// Initial payload.
    pub payload: P,
}

/// Request body for `PATCH /api/{entity}/{key}`.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct UpdateRequest<T> {
    /// Version the caller last read. When set, the update fails with 409 if
    /// it is no longer current.
    #[serde(default)]
    pub expected_version: Option<u32>,
    /// Changes to merge onto the current payload.
    pub patch: T,
}

/// Query parameters for `GET .../as-of`.
#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    /// RFC 3339 instant.
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Hide records that belong to another tenant.
fn owned_by<P: Payload>(record: VersionedRecord<P>, tenant_id: &TenantId) -> Result<VersionedRecord<P>, ApiError> {
    if record.tenant_id == *tenant_id {
        Ok(record)
    } else {
        Err(ApiError::NotFound(format!("{} `{}`", P::KIND, record.business_key)))
    }
}

async fn current_owned<E: Exposed>(
    state: &AppState,
    business_key: &BusinessKey,
    tenant_id: &TenantId,
) -> Result<VersionedRecord<E>, ApiError> {
    let record = E::repository(state).find_by_business_key(business_key).await?;
    owned_by(record, tenant_id)
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse::<Uuid>()
        .map_err(|e| ApiError::BadRequest(format!("invalid UUID `{raw}`: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Create version 1 of a record.
pub async fn create<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    body: Result<Json<CreateRequest<E>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let record = E::repository(&state)
        .create(NewRecord {
            tenant_id,
            business_key: body.business_key,
            actor,
            payload: body.payload,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// List the tenant's current records.
pub async fn list<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
) -> Result<impl IntoResponse, ApiError> {
    let records = E::repository(&state)
        .find_current_by_filter(&tenant_id, |_| true)
        .await?;
    Ok(Json(serde_json::json!({
        "count": records.len(),
        "records": records,
    })))
}

/// Return the current version of a record.
pub async fn get_current<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = current_owned::<E>(&state, &BusinessKey::new(key), &tenant_id).await?;
    Ok(Json(record))
}

/// Supersede the current version with a patch.
pub async fn update<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    Path(key): Path<String>,
    body: Result<Json<UpdateRequest<E::Patch>>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body?;
    let business_key = BusinessKey::new(key);
    let current = current_owned::<E>(&state, &business_key, &tenant_id).await?;
    let expected = body.expected_version.unwrap_or(current.version);
    let record = E::repository(&state)
        .create_new_version_expecting(&business_key, expected, &body.patch, &actor)
        .await?;
    Ok(Json(record))
}

/// Soft-delete a record.
pub async fn delete<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Actor(actor): Actor,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let business_key = BusinessKey::new(key);
    current_owned::<E>(&state, &business_key, &tenant_id).await?;
    E::repository(&state).delete(&business_key, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Return every version of a record with its derived state.
pub async fn history<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let business_key = BusinessKey::new(key);
    let versions = E::repository(&state).find_history_with_state(&business_key).await?;
    if versions.first().is_some_and(|v| v.record.tenant_id != tenant_id) {
        return Err(ApiError::NotFound(format!("{} `{business_key}`", E::KIND)));
    }
    Ok(Json(serde_json::json!({
        "business_key": business_key,
        "count": versions.len(),
        "versions": versions,
    })))
}

/// Return the version in effect at `?at=`.
pub async fn as_of<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(key): Path<String>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let record = E::repository(&state)
        .find_as_of(&BusinessKey::new(key), query.at)
        .await?;
    Ok(Json(owned_by(record, &tenant_id)?))
}

/// Return any row, current or closed, by its ID.
pub async fn get_by_id<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = RecordId::from(parse_uuid(&id)?);
    let record = E::repository(&state).find_by_id(id).await?;
    Ok(Json(owned_by(record, &tenant_id)?))
}

/// Check a record's stored chain against the versioning invariants.
pub async fn verify<E: Exposed>(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let business_key = BusinessKey::new(key);
    let repository = E::repository(&state);
    let history = repository.find_history(&business_key).await?;
    if history.first().is_some_and(|r| r.tenant_id != tenant_id) {
        return Err(ApiError::NotFound(format!("{} `{business_key}`", E::KIND)));
    }
    let violations = repository.verify(&business_key).await?;
    Ok(Json(serde_json::json!({
        "business_key": business_key,
        "versions": history.len(),
        "healthy": violations.is_empty(),
        "violations": violations,
    })))
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
