//! Request extractors for the caller's tenant and identity.
//!
//! Every route is tenant scoped via the `X-Tenant-Id` header. Routes that
//! write also need `X-Actor-Id`, which is recorded on the new version.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use vigil_types::{ActorId, TenantId};

use crate::error::ApiError;

/// Header naming the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header naming the user or service making a change.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// The tenant from `X-Tenant-Id`.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantId);

/// The actor from `X-Actor-Id`.
#[derive(Debug, Clone)]
pub struct Actor(pub ActorId);

fn required_header(parts: &Parts, name: &str) -> Result<String, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name} header")))?
        .to_str()
        .map_err(|e| ApiError::BadRequest(format!("invalid {name} header: {e}")))?
        .trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("empty {name} header")));
    }
    Ok(value.to_owned())
}

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        required_header(parts, TENANT_HEADER).map(|t| Self(TenantId::new(t)))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        required_header(parts, ACTOR_HEADER).map(|a| Self(ActorId::new(a)))
    }
}
