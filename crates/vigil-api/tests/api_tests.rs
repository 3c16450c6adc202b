//! Integration tests for the Vigil HTTP API.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, against an in-memory store.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use vigil_api::{AppState, build_router};
use vigil_core::{CoreConfig, RecordEngine};

const TENANT: &str = "fh-42";

fn make_router() -> Router {
    let engine = RecordEngine::in_memory(CoreConfig::default());
    build_router(Arc::new(AppState::new(&engine)))
}

async fn send(router: &Router, method: &str, uri: &str, tenant: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", "director");
    if let Some(tenant) = tenant {
        request = request.header("x-tenant-id", tenant);
    }
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn new_case(key: &str, amount: &str) -> Value {
    json!({
        "business_key": key,
        "payload": {
            "case_number": "2026-0042",
            "decedent_name": "Edsger Dijkstra",
            "status": "arranging",
            "contract_amount": amount,
        }
    })
}

// =========================================================================
// Entities
// =========================================================================

#[tokio::test]
async fn test_health() {
    let router = make_router();
    let (status, json) = send(&router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_missing_tenant_header_is_bad_request() {
    let router = make_router();
    let (status, json) = send(&router, "GET", "/api/cases", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_case_lifecycle() {
    let router = make_router();

    let (status, created) = send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["version"], 1);
    assert_eq!(created["is_current"], true);

    let (status, updated) = send(
        &router,
        "PATCH",
        "/api/cases/case-1",
        Some(TENANT),
        Some(json!({ "patch": { "contract_amount": "150" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["version"], 2);
    assert_eq!(updated["payload"]["contract_amount"], "150");

    let (status, current) = send(&router, "GET", "/api/cases/case-1", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["version"], 2);

    let (status, _) = send(&router, "DELETE", "/api/cases/case-1", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, "GET", "/api/cases/case-1", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, history) = send(&router, "GET", "/api/cases/case-1/history", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["count"], 2);
    assert_eq!(history["versions"][0]["state"], "CLOSED_HISTORICAL");
    assert_eq!(history["versions"][1]["state"], "DELETED_TERMINAL");
    assert_eq!(history["versions"][0]["payload"]["contract_amount"], "100");

    let (status, verify) = send(&router, "GET", "/api/cases/case-1/verify", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verify["healthy"], true);
}

#[tokio::test]
async fn test_list_returns_only_current_rows_of_tenant() {
    let router = make_router();
    send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-2", "200"))).await;
    send(&router, "POST", "/api/cases", Some("fh-7"), Some(new_case("case-3", "300"))).await;
    send(
        &router,
        "PATCH",
        "/api/cases/case-1",
        Some(TENANT),
        Some(json!({ "patch": { "status": "scheduled" } })),
    )
    .await;

    let (status, json) = send(&router, "GET", "/api/cases", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    let records = json["records"].as_array().unwrap();
    let case_1 = records.iter().find(|r| r["business_key"] == "case-1").unwrap();
    assert_eq!(case_1["version"], 2);
    assert_eq!(case_1["payload"]["status"], "scheduled");
}

#[tokio::test]
async fn test_stale_expected_version_conflicts() {
    let router = make_router();
    send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    send(
        &router,
        "PATCH",
        "/api/cases/case-1",
        Some(TENANT),
        Some(json!({ "expected_version": 1, "patch": { "contract_amount": "150" } })),
    )
    .await;

    let (status, json) = send(
        &router,
        "PATCH",
        "/api/cases/case-1",
        Some(TENANT),
        Some(json!({ "expected_version": 1, "patch": { "contract_amount": "175" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], 409);
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let router = make_router();
    send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    let (status, _) = send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_payload_is_unprocessable() {
    let router = make_router();
    let (status, json) = send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "-5"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("contract_amount"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let router = make_router();
    let (status, _) = send(
        &router,
        "POST",
        "/api/cases",
        Some(TENANT),
        Some(json!({ "payload": { "case_number": 7 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_unknown_key_is_not_found() {
    let router = make_router();
    let (status, _) = send(
        &router,
        "PATCH",
        "/api/cases/ghost",
        Some(TENANT),
        Some(json!({ "patch": { "contract_amount": "1" } })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_other_tenants_records_are_hidden() {
    let router = make_router();
    let (_, created) = send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    let id = created["id"].as_str().unwrap().to_owned();

    for uri in ["/api/cases/case-1", "/api/cases/case-1/history", &format!("/api/cases/by-id/{id}")] {
        let (status, _) = send(&router, "GET", uri, Some("fh-7"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let (status, _) = send(&router, "DELETE", "/api/cases/case-1", Some("fh-7"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, found) = send(&router, "GET", &format!("/api/cases/by-id/{id}"), Some(TENANT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["business_key"], "case-1");
}

#[tokio::test]
async fn test_foreign_create_does_not_reveal_record_state() {
    let router = make_router();
    let note = json!({ "business_key": "note-1", "payload": { "case_key": "case-1", "body": "Flowers." } });
    send(&router, "POST", "/api/notes", Some(TENANT), Some(note.clone())).await;

    let (live_status, live) = send(&router, "POST", "/api/notes", Some("fh-7"), Some(note.clone())).await;
    send(&router, "DELETE", "/api/notes/note-1", Some(TENANT), None).await;
    let (deleted_status, deleted) = send(&router, "POST", "/api/notes", Some("fh-7"), Some(note.clone())).await;

    assert_eq!(live_status, StatusCode::CONFLICT);
    assert_eq!(deleted_status, StatusCode::CONFLICT);
    assert_eq!(live, deleted);

    // The owner still learns that the deleted note cannot be reopened.
    let (status, _) = send(&router, "POST", "/api/notes", Some(TENANT), Some(note)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_by_id_rejects_bad_uuid() {
    let router = make_router();
    let (status, _) = send(&router, "GET", "/api/cases/by-id/not-a-uuid", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_as_of() {
    let router = make_router();
    let (_, created) = send(&router, "POST", "/api/cases", Some(TENANT), Some(new_case("case-1", "100"))).await;
    let valid_from = created["valid_from"].as_str().unwrap().to_owned();

    let (status, json) = send(
        &router,
        "GET",
        &format!("/api/cases/case-1/as-of?at={}", valid_from.replace('+', "%2B")),
        Some(TENANT),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 1);

    let (status, _) = send(
        &router,
        "GET",
        "/api/cases/case-1/as-of?at=2000-01-01T00:00:00Z",
        Some(TENANT),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, "GET", "/api/cases/case-1/as-of?at=yesterday", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notes_reference_cases() {
    let router = make_router();
    let (status, note) = send(
        &router,
        "POST",
        "/api/notes",
        Some(TENANT),
        Some(json!({ "payload": { "case_key": "case-1", "body": "Family arriving at 3pm." } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = note["business_key"].as_str().unwrap().to_owned();

    let (status, pinned) = send(
        &router,
        "PATCH",
        &format!("/api/notes/{key}"),
        Some(TENANT),
        Some(json!({ "patch": { "pinned": true } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pinned["payload"]["pinned"], true);
    assert_eq!(pinned["payload"]["body"], "Family arriving at 3pm.");
}

// =========================================================================
// Policies
// =========================================================================

#[tokio::test]
async fn test_policy_defaults_then_update() {
    let router = make_router();

    let (status, json) = send(&router, "GET", "/api/policies/contact-matching", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source"]["kind"], "default");
    assert_eq!(json["source"]["preset"], "STANDARD");
    assert_eq!(json["policy"]["params"]["min_threshold"], 75);

    let (status, json) = send(
        &router,
        "PUT",
        "/api/policies/contact-matching",
        Some(TENANT),
        Some(json!({ "params": { "min_threshold": 60 }, "reason": "too many missed duplicates" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 1);

    let (_, json) = send(&router, "GET", "/api/policies/contact-matching", Some(TENANT), None).await;
    assert_eq!(json["source"]["kind"], "configured");
    assert_eq!(json["source"]["version"], 1);
    assert_eq!(json["policy"]["params"]["min_threshold"], 60);
    assert_eq!(json["policy"]["reason"], "too many missed duplicates");

    let (status, json) = send(
        &router,
        "GET",
        "/api/policies/contact-matching/parameters/min_threshold",
        Some(TENANT),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], 60);

    let (_, json) = send(&router, "GET", "/api/policies/contact-matching/history", Some(TENANT), None).await;
    assert_eq!(json["count"], 1);
}

#[tokio::test]
async fn test_policy_update_validation() {
    let router = make_router();

    let (status, _) = send(
        &router,
        "PUT",
        "/api/policies/contact-matching",
        Some(TENANT),
        Some(json!({ "params": { "min_threshold": 60 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        "PUT",
        "/api/policies/contact-matching",
        Some(TENANT),
        Some(json!({ "params": { "min_threshold": 60 }, "reason": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &router,
        "PUT",
        "/api/policies/contact-matching",
        Some(TENANT),
        Some(json!({ "params": { "name_weight": 90 }, "reason": "weights no longer sum to 100" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_policy_expected_version_conflict() {
    let router = make_router();
    send(
        &router,
        "PUT",
        "/api/policies/invitation",
        Some(TENANT),
        Some(json!({ "params": { "max_resends": 4 }, "reason": "initial" })),
    )
    .await;
    let (status, json) = send(
        &router,
        "PUT",
        "/api/policies/invitation",
        Some(TENANT),
        Some(json!({ "expected_version": 1, "params": { "max_resends": 2 }, "reason": "fewer" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 2);

    let (status, _) = send(
        &router,
        "PUT",
        "/api/policies/invitation",
        Some(TENANT),
        Some(json!({ "expected_version": 1, "params": { "max_resends": 1 }, "reason": "stale" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_policy_reset_restores_default() {
    let router = make_router();
    send(
        &router,
        "PUT",
        "/api/policies/note",
        Some(TENANT),
        Some(json!({ "preset": "STRICT", "reason": "compliance" })),
    )
    .await;
    let (status, _) = send(&router, "DELETE", "/api/policies/note", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, json) = send(&router, "GET", "/api/policies/note", Some(TENANT), None).await;
    assert_eq!(json["source"]["kind"], "default");
}

#[tokio::test]
async fn test_policy_unknown_parameter_and_category() {
    let router = make_router();
    let (status, _) = send(
        &router,
        "GET",
        "/api/policies/interaction/parameters/shoe_size",
        Some(TENANT),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, "GET", "/api/policies/payments", Some(TENANT), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_policy_as_of_before_configuration_is_default() {
    let router = make_router();
    send(
        &router,
        "PUT",
        "/api/policies/contact-matching",
        Some(TENANT),
        Some(json!({ "params": { "min_threshold": 60 }, "reason": "tune" })),
    )
    .await;
    let (status, json) = send(
        &router,
        "GET",
        "/api/policies/contact-matching/as-of?at=2000-01-01T00:00:00Z",
        Some(TENANT),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source"]["kind"], "default");
    assert_eq!(json["policy"]["params"]["min_threshold"], 75);
}
