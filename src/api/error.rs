//! Structured API error responses with stable error codes.
//!
//! Each core error kind maps to a distinct, stable transport status so
//! clients can branch programmatically: quota, auth, and conflict are
//! never conflated.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::CoreError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No credential provided
    AuthRequired,
    /// Credential unknown or revoked
    InvalidApiKey,
    /// Valid credential, admin role required
    AdminRequired,
    /// Entity absent within the active tenant scope
    ResourceNotFound,
    /// Case is already finalized
    CaseImmutable,
    /// Free-tier usage cap reached
    QuotaExceeded,
    /// Operation requires a different case status
    InvalidCaseState,
    /// Request body is malformed
    InvalidRequestBody,
    /// Tenant-scope misuse; fail-closed denial
    ScopeDenied,
    /// Database operation failed
    DatabaseError,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ErrorCode::AdminRequired => StatusCode::FORBIDDEN,
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::CaseImmutable => StatusCode::CONFLICT,
            ErrorCode::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::InvalidCaseState => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::ScopeDenied => StatusCode::FORBIDDEN,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::AdminRequired => "ADMIN_REQUIRED",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::CaseImmutable => "CASE_IMMUTABLE",
            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",
            ErrorCode::InvalidCaseState => "INVALID_CASE_STATE",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::ScopeDenied => "SCOPE_DENIED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{code}")
    }
}

/// Structured error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                message: message.into(),
                resource_id: None,
            },
        }
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => {
                ApiError::new(ErrorCode::DatabaseError, format!("database error: {e}"))
            }
            CoreError::Unauthorized(msg) => ApiError::new(ErrorCode::InvalidApiKey, msg),
            CoreError::Forbidden(msg) => ApiError::new(ErrorCode::AdminRequired, msg),
            CoreError::CaseNotFound(id) => {
                ApiError::new(ErrorCode::ResourceNotFound, format!("case not found: {id}"))
                    .with_resource_id(id.to_string())
            }
            CoreError::TenantNotFound(id) => ApiError::new(
                ErrorCode::ResourceNotFound,
                format!("tenant not found: {id}"),
            )
            .with_resource_id(id.to_string()),
            CoreError::ApiKeyNotFound(id) => ApiError::new(
                ErrorCode::ResourceNotFound,
                format!("api key not found: {id}"),
            )
            .with_resource_id(id.to_string()),
            CoreError::ImmutableState(id) => ApiError::new(
                ErrorCode::CaseImmutable,
                format!("case {id} is already finalized"),
            )
            .with_resource_id(id.to_string()),
            CoreError::QuotaExceeded { used, limit } => ApiError::new(
                ErrorCode::QuotaExceeded,
                format!("free tier limit exceeded ({used} events over limit {limit}); upgrade to continue"),
            ),
            CoreError::InvalidState {
                case_id,
                status,
                expected,
            } => ApiError::new(
                ErrorCode::InvalidCaseState,
                format!("case {case_id} is {status}, expected {expected}"),
            )
            .with_resource_id(case_id.to_string()),
            CoreError::PermissionDenied(msg) => ApiError::new(ErrorCode::ScopeDenied, msg),
            CoreError::Canonicalization(msg) => {
                ApiError::new(ErrorCode::InvalidRequestBody, msg)
            }
            CoreError::Internal(msg) => ApiError::new(ErrorCode::InternalError, msg),
        }
    }
}

/// Missing-credential error (no `X-API-Key` header).
pub fn auth_required() -> ApiError {
    ApiError::new(ErrorCode::AuthRequired, "missing X-API-Key header")
}
