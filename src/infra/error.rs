//! Error taxonomy for casevault.
//!
//! Every public operation returns one of these kinds. Isolation and
//! state-machine violations always propagate; only usage-recording
//! failures are swallowed (at the call site, with a warning).

use thiserror::Error;

use crate::domain::{CaseId, CaseStatus, TenantId};

/// Errors surfaced by the casevault core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Credential missing, unknown, or revoked
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential, insufficient role
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Case absent within the active tenant scope. Cross-tenant rows are
    /// indistinguishable from nonexistent ones.
    #[error("case not found: {0}")]
    CaseNotFound(CaseId),

    /// Tenant row absent
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantId),

    /// API key row absent within the active tenant scope
    #[error("api key not found: {0}")]
    ApiKeyNotFound(crate::domain::ApiKeyId),

    /// Attempted re-finalize of a finalized case
    #[error("case {0} is already finalized")]
    ImmutableState(CaseId),

    /// Soft billing cap reached on the free tier
    #[error("usage quota exceeded: {used} events over limit {limit}")]
    QuotaExceeded { used: u64, limit: u64 },

    /// Operation requires a different case status (e.g. replay on a draft)
    #[error("case {case_id} is {status}, expected {expected}")]
    InvalidState {
        case_id: CaseId,
        status: CaseStatus,
        expected: CaseStatus,
    },

    /// Tenant-scope misuse (double open, missing scope). Fail-closed:
    /// never degrades to an unscoped view.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Snapshot could not be canonicalized
    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for casevault operations
pub type Result<T> = std::result::Result<T, CoreError>;
