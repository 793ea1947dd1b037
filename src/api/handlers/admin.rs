//! Admin and key-lifecycle handlers.
//!
//! All /admin routes require role=admin on the calling key; rotation is
//! available to any authenticated key (it only affects the caller's own
//! credential).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiError, ErrorCode};
use crate::auth::{AuthContext, AuthContextExt};
use crate::domain::{ApiKeyId, Role};
use crate::scope::ScopeContext;
use crate::server::AppState;

fn require_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if !auth.is_admin() {
        return Err(ApiError::new(ErrorCode::AdminRequired, "admin role required"));
    }
    Ok(())
}

/// GET /admin/api-keys
///
/// Key metadata only; digests and raw secrets are never returned.
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;

    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let keys = state.authenticator.list_keys(&scope).await?;
    Ok(Json(keys))
}

#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
    pub role: Role,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueKeyResponse {
    pub id: ApiKeyId,
    pub role: Role,
    /// Raw secret, shown exactly once and never persisted.
    pub api_key: String,
}

/// POST /admin/api-keys
pub async fn issue_api_key(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(body): Json<IssueKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;

    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let (record, raw_key) = state
        .authenticator
        .issue_key(&scope, body.role, body.label)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueKeyResponse {
            id: record.id,
            role: record.role,
            api_key: raw_key,
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct RevokeKeyResponse {
    pub revoked: ApiKeyId,
}

/// POST /admin/api-keys/{key_id}/revoke
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(key_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;

    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let key_id = ApiKeyId::from_uuid(key_id);
    state.authenticator.revoke_key(&scope, key_id).await?;

    Ok(Json(RevokeKeyResponse { revoked: key_id }))
}

#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    pub id: ApiKeyId,
    /// Replacement secret, shown exactly once.
    pub api_key: String,
}

/// POST /auth/api-keys/rotate
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let (record, raw_key) = state.authenticator.rotate_key(&scope, &auth).await?;

    Ok(Json(RotateKeyResponse {
        id: record.id,
        api_key: raw_key,
    }))
}
