//! Record types persisted by the case store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::TenantScope;

use super::{AccessAction, ApiKeyId, BillingStatus, CaseId, CaseStatus, Role, TenantId};

/// A tenant row. Not tenant-scoped itself; it is the scope root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: TenantId,
    pub name: String,
    pub billing_status: BillingStatus,
    pub created_at: DateTime<Utc>,
}

impl TenantRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            billing_status: BillingStatus::Free,
            created_at: Utc::now(),
        }
    }
}

/// An API key row. Carries the one-way digest of the secret; the raw
/// secret exists only transiently at issuance time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: ApiKeyId,
    pub tenant_id: TenantId,
    /// SHA-256 hex of the raw key (never the plaintext)
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub role: Role,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// A case record. `ranking_snapshot` and `result_signature` are write-once:
/// null while the case is a draft, set by the single finalize transition,
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub tenant_id: TenantId,
    pub status: CaseStatus,
    pub ranking_snapshot: Option<serde_json::Value>,
    pub result_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl CaseRecord {
    /// New draft case under the given scope's tenant.
    pub fn draft(scope: &TenantScope) -> Self {
        Self {
            id: CaseId::new(),
            tenant_id: scope.tenant_id(),
            status: CaseStatus::Draft,
            ranking_snapshot: None,
            result_signature: None,
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status == CaseStatus::Finalized
    }
}

/// Append-only metering row. No update or delete path exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub api_key_id: ApiKeyId,
    pub endpoint: String,
    pub created_at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(tenant_id: TenantId, api_key_id: ApiKeyId, endpoint: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            tenant_id,
            api_key_id,
            endpoint: endpoint.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only audit trail row for case accesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub case_id: CaseId,
    pub actor_key_id: ApiKeyId,
    pub action: AccessAction,
    pub created_at: DateTime<Utc>,
}

impl AccessLogEntry {
    /// Build an entry under an active scope; the tenant comes from the
    /// scope, not from the caller.
    pub fn new(
        scope: &TenantScope,
        case_id: CaseId,
        actor_key_id: ApiKeyId,
        action: AccessAction,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            tenant_id: scope.tenant_id(),
            case_id,
            actor_key_id,
            action,
            created_at: Utc::now(),
        }
    }
}
