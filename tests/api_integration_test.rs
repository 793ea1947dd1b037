//! REST API integration tests.
//!
//! Drives the full router (auth middleware included) over an in-memory
//! store and asserts the stable transport mapping of the error taxonomy:
//! quota, auth, and conflict must arrive as distinct statuses and codes.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use casevault::domain::{BillingStatus, Role};
use casevault::infra::{CaseStore, SqliteCaseStore};
use casevault::server::{build_router, build_services, Config};
use casevault::usage::{DEFAULT_USAGE_QUEUE_DEPTH, FREE_TIER_USAGE_LIMIT};

use common::TestEnv;

fn test_config() -> Config {
    Config {
        database_url: String::new(),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        max_connections: 1,
        free_tier_usage_limit: FREE_TIER_USAGE_LIMIT,
        usage_queue_depth: DEFAULT_USAGE_QUEUE_DEPTH,
    }
}

/// Router over the given env's store, with auth middleware wired.
fn app(store: Arc<SqliteCaseStore>) -> Router {
    let dyn_store: Arc<dyn CaseStore> = store;
    let (state, auth_state) = build_services(dyn_store, &test_config());
    build_router(auth_state).with_state(state)
}

async fn send(
    app: &Router,
    method: Method,
    path: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }

    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_missing_key_is_401() {
    let env = TestEnv::new().await;
    let app = app(env.store.clone());

    let (status, body) = send(&app, Method::POST, "/cases", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_unknown_key_is_401() {
    let env = TestEnv::new().await;
    let app = app(env.store.clone());

    let (status, body) = send(&app, Method::POST, "/cases", Some("cv_bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "INVALID_API_KEY");
}

#[tokio::test]
async fn test_case_lifecycle_over_http() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (_, raw_key) = env.seed_key(tenant, Role::User).await;
    let app = app(env.store.clone());

    // Create
    let (status, body) = send(&app, Method::POST, "/cases", Some(&raw_key), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "draft");
    let case_id = body["case_id"].as_str().unwrap().to_string();

    // Read
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/cases/{case_id}"),
        Some(&raw_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "draft");

    // Finalize
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/cases/{case_id}/finalize"),
        Some(&raw_key),
        Some(json!({"ranking_snapshot": {"a": 1, "b": 2}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "finalized");
    let signature = body["signature"].as_str().unwrap().to_string();
    assert_eq!(signature.len(), 64);

    // Re-finalize conflicts
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/cases/{case_id}/finalize"),
        Some(&raw_key),
        Some(json!({"ranking_snapshot": {"a": 9}})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "CASE_IMMUTABLE");

    // Replay verification holds
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/cases/{case_id}/verify-replay"),
        Some(&raw_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["expected"], signature);
}

#[tokio::test]
async fn test_cross_tenant_read_is_404() {
    let env = TestEnv::new().await;
    let tenant_a = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let tenant_b = env.seed_tenant("beta-clinic", BillingStatus::Free).await;
    let (_, key_a) = env.seed_key(tenant_a, Role::User).await;
    let (_, key_b) = env.seed_key(tenant_b, Role::User).await;
    let app = app(env.store.clone());

    let (_, body) = send(&app, Method::POST, "/cases", Some(&key_a), None).await;
    let case_id = body["case_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/cases/{case_id}"),
        Some(&key_b),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn test_quota_denial_is_402() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("free-clinic", BillingStatus::Free).await;
    let (key_id, raw_key) = env.seed_key(tenant, Role::User).await;
    env.seed_usage_events(tenant, key_id, 1001).await;
    let app = app(env.store.clone());

    let (status, body) = send(&app, Method::POST, "/cases", Some(&raw_key), None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(error_code(&body), "QUOTA_EXCEEDED");
}

#[tokio::test]
async fn test_admin_routes_gate_on_role() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (_, user_key) = env.seed_key(tenant, Role::User).await;
    let (_, admin_key) = env.seed_key(tenant, Role::Admin).await;
    let app = app(env.store.clone());

    let (status, body) = send(&app, Method::GET, "/admin/api-keys", Some(&user_key), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ADMIN_REQUIRED");

    // Admin issues a key; the raw secret appears exactly once, here.
    let (status, body) = send(
        &app,
        Method::POST,
        "/admin/api-keys",
        Some(&admin_key),
        Some(json!({"role": "user", "label": "reporting"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let issued_key = body["api_key"].as_str().unwrap().to_string();
    assert!(issued_key.starts_with("cv_"));
    let issued_id = body["id"].as_str().unwrap().to_string();

    // The issued key works, then dies on revocation.
    let (status, _) = send(&app, Method::POST, "/cases", Some(&issued_key), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/admin/api-keys/{issued_id}/revoke"),
        Some(&admin_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, "/cases", Some(&issued_key), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "INVALID_API_KEY");
}

#[tokio::test]
async fn test_key_listing_exposes_no_secrets() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (_, admin_key) = env.seed_key(tenant, Role::Admin).await;
    let app = app(env.store.clone());

    let (status, body) = send(&app, Method::GET, "/admin/api-keys", Some(&admin_key), None).await;
    assert_eq!(status, StatusCode::OK);

    let listing = body.to_string();
    assert!(!listing.contains(&admin_key));
    assert!(!listing.contains("key_hash"));
}

#[tokio::test]
async fn test_health_is_open() {
    let env = TestEnv::new().await;
    let app = app(env.store.clone());

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
