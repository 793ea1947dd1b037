//! Health and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::domain::TenantId;
use crate::server::AppState;

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "casevault",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /ready, probes database connectivity.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    match state
        .store
        .fetch_tenant(TenantId::from_uuid(uuid::Uuid::nil()))
        .await
    {
        Ok(_) => Ok(Json(serde_json::json!({
            "status": "ready",
            "database": "connected",
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("database unavailable: {e}"),
        )),
    }
}
