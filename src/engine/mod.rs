//! Case lifecycle engine.
//!
//! States: `draft` (initial) → `finalized` (terminal). There is no path
//! back. The finalize transition is guarded by a conditional update in the
//! store. The status predicate is the only concurrency mechanism, and it
//! is sufficient: of N racing finalizes exactly one updates a row, the
//! rest observe `ImmutableState`.

mod replay;

pub use replay::{ReplayReport, ReplayVerifier};

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::crypto;
use crate::domain::{AccessAction, AccessLogEntry, ApiKeyId, CaseId, CaseRecord};
use crate::infra::{CaseStore, CoreError, Result};
use crate::scope::TenantScope;
use crate::usage::UsageGuard;

/// Outcome of a finalize transition.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub case_id: CaseId,
    pub signature: String,
}

/// Draft→finalized state machine over a tenant-scoped store.
pub struct CaseEngine {
    store: Arc<dyn CaseStore>,
    guard: Arc<UsageGuard>,
}

impl CaseEngine {
    pub fn new(store: Arc<dyn CaseStore>, guard: Arc<UsageGuard>) -> Self {
        Self { store, guard }
    }

    /// Create a new draft case under the active scope.
    ///
    /// The usage guard is consulted first; on denial nothing is created.
    pub async fn create_case(&self, scope: &TenantScope) -> Result<CaseRecord> {
        self.guard.check_quota(scope).await?;

        let case = CaseRecord::draft(scope);
        self.store.insert_case(scope, &case).await?;
        Ok(case)
    }

    /// Finalize a draft case: canonicalize the snapshot, sign it, and
    /// apply the conditional transition.
    ///
    /// Errors: `CaseNotFound` when the case does not exist under this
    /// tenant (foreign cases included), `ImmutableState` when it is (or
    /// concurrently became) finalized. A finalized row is never
    /// overwritten.
    pub async fn finalize(
        &self,
        scope: &TenantScope,
        case_id: CaseId,
        ranking_snapshot: serde_json::Value,
    ) -> Result<FinalizeOutcome> {
        let case = self
            .store
            .fetch_case(scope, case_id)
            .await?
            .ok_or(CoreError::CaseNotFound(case_id))?;

        if case.is_finalized() {
            return Err(CoreError::ImmutableState(case_id));
        }

        // Signature is computed before the transition so the conditional
        // update persists snapshot, signature, and status atomically.
        let signature = crypto::result_signature(&ranking_snapshot)?;

        let updated = self
            .store
            .finalize_case(scope, case_id, &ranking_snapshot, &signature, Utc::now())
            .await?;

        if updated == 0 {
            // The case existed above, so a concurrent finalize won the race.
            return Err(CoreError::ImmutableState(case_id));
        }

        Ok(FinalizeOutcome { case_id, signature })
    }

    /// Tenant-scoped read. A case belonging to another tenant is
    /// indistinguishable from a nonexistent one.
    ///
    /// Appends a best-effort `VIEW` entry to the access log; audit
    /// failures never fail the read.
    pub async fn get_case(
        &self,
        scope: &TenantScope,
        case_id: CaseId,
        actor: ApiKeyId,
    ) -> Result<CaseRecord> {
        let case = self
            .store
            .fetch_case(scope, case_id)
            .await?
            .ok_or(CoreError::CaseNotFound(case_id))?;

        let entry = AccessLogEntry::new(scope, case_id, actor, AccessAction::View);
        if let Err(e) = self.store.append_access_log(&entry).await {
            warn!(%case_id, "access log insert failed (non-fatal): {e}");
        }

        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BillingStatus, TenantId};
    use crate::infra::MockCaseStore;
    use crate::scope::ScopeContext;
    use crate::usage::{UsageRecorder, FREE_TIER_USAGE_LIMIT};
    use serde_json::json;

    fn engine_with(store: MockCaseStore, guard_store: MockCaseStore) -> CaseEngine {
        let (recorder, _rx) = UsageRecorder::test_pair(4);
        // The guard reads quota state through its own store handle.
        let guard = Arc::new(UsageGuard::new(
            Arc::new(guard_store),
            recorder,
            FREE_TIER_USAGE_LIMIT,
        ));
        CaseEngine::new(Arc::new(store), guard)
    }

    #[tokio::test]
    async fn test_quota_denial_creates_nothing() {
        let mut guard_store = MockCaseStore::new();
        guard_store
            .expect_billing_status()
            .returning(|_| Ok(BillingStatus::Free));
        guard_store
            .expect_count_usage_events()
            .returning(|_| Ok(FREE_TIER_USAGE_LIMIT + 1));

        // No insert_case expectation: a denial must not reach the store.
        let store = MockCaseStore::new();
        let engine = engine_with(store, guard_store);

        let ctx = ScopeContext::new();
        let scope = ctx.open(TenantId::new()).unwrap();

        let err = engine.create_case(&scope).await.unwrap_err();
        assert!(matches!(err, CoreError::QuotaExceeded { .. }));
    }

    #[tokio::test]
    async fn test_finalize_missing_case_is_not_found() {
        let mut store = MockCaseStore::new();
        store.expect_fetch_case().returning(|_, _| Ok(None));

        let engine = engine_with(store, MockCaseStore::new());
        let ctx = ScopeContext::new();
        let scope = ctx.open(TenantId::new()).unwrap();

        let err = engine
            .finalize(&scope, CaseId::new(), json!({"a": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CaseNotFound(_)));
    }

    #[tokio::test]
    async fn test_finalize_lost_race_is_immutable_state() {
        let tenant = TenantId::new();
        let ctx = ScopeContext::new();
        let scope = ctx.open(tenant).unwrap();
        let draft = CaseRecord::draft(&scope);
        let case_id = draft.id;

        let mut store = MockCaseStore::new();
        store
            .expect_fetch_case()
            .returning(move |_, _| Ok(Some(draft.clone())));
        // The draft was observed, but the conditional update hit 0 rows:
        // another finalize won in between.
        store
            .expect_finalize_case()
            .returning(|_, _, _, _, _| Ok(0));

        let engine = engine_with(store, MockCaseStore::new());

        let err = engine
            .finalize(&scope, case_id, json!({"a": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ImmutableState(id) if id == case_id));
    }

    #[tokio::test]
    async fn test_get_case_survives_audit_failure() {
        let tenant = TenantId::new();
        let ctx = ScopeContext::new();
        let scope = ctx.open(tenant).unwrap();
        let draft = CaseRecord::draft(&scope);
        let case_id = draft.id;

        let mut store = MockCaseStore::new();
        store
            .expect_fetch_case()
            .returning(move |_, _| Ok(Some(draft.clone())));
        store
            .expect_append_access_log()
            .returning(|_| Err(CoreError::Internal("audit table offline".to_string())));

        let engine = engine_with(store, MockCaseStore::new());

        let case = engine
            .get_case(&scope, case_id, ApiKeyId::new())
            .await
            .unwrap();
        assert_eq!(case.id, case_id);
    }
}
