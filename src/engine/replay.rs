//! Replay verification of finalized cases.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::crypto;
use crate::domain::{AccessAction, AccessLogEntry, ApiKeyId, CaseId, CaseStatus};
use crate::infra::{CaseStore, CoreError, Result};
use crate::scope::TenantScope;

/// Result of a replay verification.
///
/// `ok = false` is an integrity failure: either the stored snapshot or
/// signature was tampered with, or the write and verify paths disagree on
/// canonicalization. It is surfaced as a value so callers can branch on it
/// without treating the verification itself as failed.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub case_id: CaseId,
    pub ok: bool,
    pub expected: String,
    pub computed: String,
}

/// Recomputes and compares result signatures against stored snapshots.
///
/// Pure and idempotent: any number of calls on an unmodified record
/// produce the same report, and nothing is written except a best-effort
/// `VERIFY` audit entry.
pub struct ReplayVerifier {
    store: Arc<dyn CaseStore>,
}

impl ReplayVerifier {
    pub fn new(store: Arc<dyn CaseStore>) -> Self {
        Self { store }
    }

    /// Verify a finalized case under the active scope.
    ///
    /// `CaseNotFound` when absent in this tenant's scope, `InvalidState`
    /// when not yet finalized; replay is only meaningful on immutable
    /// records.
    pub async fn verify_replay(
        &self,
        scope: &TenantScope,
        case_id: CaseId,
        actor: ApiKeyId,
    ) -> Result<ReplayReport> {
        let case = self
            .store
            .fetch_case(scope, case_id)
            .await?
            .ok_or(CoreError::CaseNotFound(case_id))?;

        if !case.is_finalized() {
            return Err(CoreError::InvalidState {
                case_id,
                status: case.status,
                expected: CaseStatus::Finalized,
            });
        }

        // A finalized case always carries both fields; their absence means
        // the write-once invariant was violated outside this service.
        let snapshot = case.ranking_snapshot.as_ref().ok_or_else(|| {
            CoreError::Internal(format!("finalized case {case_id} has no ranking_snapshot"))
        })?;
        let expected = case.result_signature.clone().ok_or_else(|| {
            CoreError::Internal(format!("finalized case {case_id} has no result_signature"))
        })?;

        // Identical canonicalization + digest as the finalize path.
        let computed = crypto::result_signature(snapshot)?;
        let ok = computed == expected;

        let entry = AccessLogEntry::new(scope, case_id, actor, AccessAction::Verify);
        if let Err(e) = self.store.append_access_log(&entry).await {
            warn!(%case_id, "access log insert failed (non-fatal): {e}");
        }

        Ok(ReplayReport {
            case_id,
            ok,
            expected,
            computed,
        })
    }
}
