//! Trait definitions for casevault storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use crate::domain::{
    AccessLogEntry, ApiKeyId, ApiKeyRecord, BillingStatus, CaseId, CaseRecord, TenantId,
    TenantRecord, UsageEvent,
};
use crate::scope::TenantScope;

use super::Result;

/// Tenant-scoped persistence for cases, keys, and audit rows.
///
/// Invariant: every operation on a tenant-scoped table takes a
/// [`TenantScope`] and filters on its tenant; there is no unscoped
/// query path for scoped tables. Credential lookup and tenant
/// provisioning are the only scope-free operations, because they run
/// before a scope can exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CaseStore: Send + Sync {
    // ---- cases (scoped) ----

    /// Insert a new draft case under the scope's tenant.
    async fn insert_case(&self, scope: &TenantScope, case: &CaseRecord) -> Result<()>;

    /// Fetch a case within the scope's tenant. `None` covers both
    /// nonexistent and foreign-tenant cases.
    async fn fetch_case(&self, scope: &TenantScope, case_id: CaseId) -> Result<Option<CaseRecord>>;

    /// Conditional finalize: set snapshot, signature, status and
    /// `finalized_at` only if the case is still a draft under this tenant.
    /// Returns the number of rows updated (0 = lost the race or absent).
    async fn finalize_case(
        &self,
        scope: &TenantScope,
        case_id: CaseId,
        snapshot: &serde_json::Value,
        signature: &str,
        finalized_at: DateTime<Utc>,
    ) -> Result<u64>;

    // ---- usage + audit ----

    /// Billing tier of the scope's tenant, read fresh on every call so an
    /// upgrade is observed without restart.
    async fn billing_status(&self, scope: &TenantScope) -> Result<BillingStatus>;

    /// Count of usage events for the scope's tenant.
    async fn count_usage_events(&self, scope: &TenantScope) -> Result<u64>;

    /// Append a usage event. Called from the background writer; the
    /// tenant was stamped onto the event at enqueue time.
    async fn append_usage_event(&self, event: &UsageEvent) -> Result<()>;

    /// Append an access-log entry (VIEW / VERIFY).
    async fn append_access_log(&self, entry: &AccessLogEntry) -> Result<()>;

    // ---- api keys ----

    /// Look up an API key by digest. Scope-free: this is how a request
    /// learns its tenant. Revocation is checked by the caller.
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>>;

    /// Insert a new API key row.
    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<()>;

    /// Revoke a key under the scope's tenant. Returns rows updated
    /// (0 = absent, foreign, or already revoked).
    async fn revoke_api_key(
        &self,
        scope: &TenantScope,
        key_id: ApiKeyId,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64>;

    /// List keys for the scope's tenant, newest first.
    async fn list_api_keys(&self, scope: &TenantScope) -> Result<Vec<ApiKeyRecord>>;

    // ---- tenants (provisioning / administrative) ----

    /// Insert a tenant row (provisioning flow).
    async fn insert_tenant(&self, tenant: &TenantRecord) -> Result<()>;

    /// Fetch a tenant row.
    async fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Option<TenantRecord>>;

    /// Flip a tenant's billing tier (administrative action). Returns rows
    /// updated.
    async fn set_billing_status(&self, tenant_id: TenantId, status: BillingStatus) -> Result<u64>;
}
