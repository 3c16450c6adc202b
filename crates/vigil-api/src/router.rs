//! Axum router construction for the API.
//!
//! Assembles entity and policy routes into a single [`Router`] with CORS
//! and request tracing enabled.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vigil_types::{CaseFile, CaseNote, ContactMatchingParams, InteractionParams, InvitationParams, NoteParams};

use crate::handlers::{self, Exposed};
use crate::policies::{self, ExposedPolicy};
use crate::state::AppState;

/// Build the complete Axum router.
///
/// - `GET /health`
/// - `/api/cases/...`, `/api/notes/...` -- see [`handlers`]
/// - `/api/policies/{category}/...` -- see [`policies`]
///
/// CORS is configured to allow any origin for development. In
/// production this should be restricted.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(entity_routes::<CaseFile>("cases"))
        .merge(entity_routes::<CaseNote>("notes"))
        .merge(policy_routes::<ContactMatchingParams>())
        .merge(policy_routes::<InvitationParams>())
        .merge(policy_routes::<NoteParams>())
        .merge(policy_routes::<InteractionParams>())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn entity_routes<E: Exposed>(segment: &str) -> Router<Arc<AppState>> {
    let base = format!("/api/{segment}");
    Router::new()
        .route(&base, get(handlers::list::<E>).post(handlers::create::<E>))
        .route(&format!("{base}/by-id/{{id}}"), get(handlers::get_by_id::<E>))
        .route(
            &format!("{base}/{{key}}"),
            get(handlers::get_current::<E>)
                .patch(handlers::update::<E>)
                .delete(handlers::delete::<E>),
        )
        .route(&format!("{base}/{{key}}/history"), get(handlers::history::<E>))
        .route(&format!("{base}/{{key}}/as-of"), get(handlers::as_of::<E>))
        .route(&format!("{base}/{{key}}/verify"), get(handlers::verify::<E>))
}

fn policy_routes<P: ExposedPolicy>() -> Router<Arc<AppState>> {
    let base = format!("/api/policies/{}", P::CATEGORY.slug());
    Router::new()
        .route(
            &base,
            get(policies::get_policy::<P>)
                .put(policies::put_policy::<P>)
                .delete(policies::reset_policy::<P>),
        )
        .route(&format!("{base}/history"), get(policies::policy_history::<P>))
        .route(&format!("{base}/as-of"), get(policies::policy_as_of::<P>))
        .route(&format!("{base}/parameters/{{name}}"), get(policies::get_parameter::<P>))
}
