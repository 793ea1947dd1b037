//! REST route definitions.

use axum::routing::{get, post};
use axum::Router;

use crate::server::AppState;

use super::handlers::{admin, cases};

/// Authenticated API routes (the auth middleware is layered in server.rs).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cases", post(cases::create_case))
        .route("/cases/:case_id", get(cases::get_case))
        .route("/cases/:case_id/finalize", post(cases::finalize_case))
        .route("/cases/:case_id/verify-replay", post(cases::verify_replay))
        .route("/auth/api-keys/rotate", post(admin::rotate_api_key))
        .route(
            "/admin/api-keys",
            get(admin::list_api_keys).post(admin::issue_api_key),
        )
        .route("/admin/api-keys/:key_id/revoke", post(admin::revoke_api_key))
}
