//! Authentication middleware for Axum.
//!
//! Extracts the `X-API-Key` header, resolves it through the
//! [`KeyAuthenticator`], and attaches the resulting [`AuthContext`] to the
//! request. Handlers open their own tenant scope from that context; the
//! middleware authenticates, it does not touch data.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::api::error::auth_required;
use crate::api::ApiError;

use super::{AuthContext, KeyAuthenticator};

/// Header carrying the raw API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Auth context extension attached to authenticated requests.
#[derive(Clone)]
pub struct AuthContextExt(pub AuthContext);

/// Shared middleware state.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub authenticator: Arc<KeyAuthenticator>,
}

/// Authentication middleware.
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let raw_key = match request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(key) if !key.trim().is_empty() => key.to_string(),
        _ => return auth_required().into_response(),
    };

    let endpoint = request.uri().path().to_string();

    let context = match state.authenticator.authenticate(&raw_key, &endpoint).await {
        Ok(context) => context,
        Err(e) => return ApiError::from(e).into_response(),
    };

    request.extensions_mut().insert(AuthContextExt(context));
    next.run(request).await
}
