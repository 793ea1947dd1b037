//! Case lifecycle handlers.
//!
//! Thin wrappers: each handler opens its own tenant scope from the
//! authenticated context and delegates to the engine or verifier.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ApiError;
use crate::auth::AuthContextExt;
use crate::domain::{CaseId, CaseStatus};
use crate::scope::ScopeContext;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct CreateCaseResponse {
    pub case_id: CaseId,
    pub status: CaseStatus,
}

/// POST /cases
pub async fn create_case(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let case = state.engine.create_case(&scope).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCaseResponse {
            case_id: case.id,
            status: case.status,
        }),
    ))
}

/// GET /cases/{case_id}
pub async fn get_case(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let case = state
        .engine
        .get_case(&scope, CaseId::from_uuid(case_id), auth.api_key_id)
        .await?;

    Ok(Json(case))
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub ranking_snapshot: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub case_id: CaseId,
    pub status: CaseStatus,
    pub signature: String,
}

/// POST /cases/{case_id}/finalize
pub async fn finalize_case(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(case_id): Path<Uuid>,
    Json(body): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let outcome = state
        .engine
        .finalize(&scope, CaseId::from_uuid(case_id), body.ranking_snapshot)
        .await?;

    Ok(Json(FinalizeResponse {
        case_id: outcome.case_id,
        status: CaseStatus::Finalized,
        signature: outcome.signature,
    }))
}

/// POST /cases/{case_id}/verify-replay
///
/// An integrity mismatch is reported in the body (`ok = false`), not as a
/// transport error: the verification itself succeeded.
pub async fn verify_replay(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(case_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = ScopeContext::new();
    let scope = ctx.open(auth.tenant_id)?;

    let report = state
        .verifier
        .verify_replay(&scope, CaseId::from_uuid(case_id), auth.api_key_id)
        .await?;

    Ok(Json(report))
}
