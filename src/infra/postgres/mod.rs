//! PostgreSQL case store for server deployments.
//!
//! Tenant filtering is applied in the query layer: every scoped statement
//! binds the scope's tenant id, and the finalize transition is a single
//! conditional UPDATE so concurrent finalizes resolve to one winner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    AccessLogEntry, ApiKeyId, ApiKeyRecord, BillingStatus, CaseId, CaseRecord, CaseStatus, Role,
    TenantId, TenantRecord, UsageEvent,
};
use crate::infra::{CaseStore, CoreError, Result};
use crate::scope::TenantScope;

/// PostgreSQL-backed case store
pub struct PgCaseStore {
    pool: PgPool,
}

impl PgCaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply migrations.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::migrations::run_postgres(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct CaseRow {
    id: Uuid,
    tenant_id: Uuid,
    status: String,
    ranking_snapshot: Option<serde_json::Value>,
    result_signature: Option<String>,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl CaseRow {
    fn into_record(self) -> Result<CaseRecord> {
        let status = CaseStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Internal(format!("unknown case status: {}", self.status)))?;

        Ok(CaseRecord {
            id: CaseId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            status,
            ranking_snapshot: self.ranking_snapshot,
            result_signature: self.result_signature,
            created_at: self.created_at,
            finalized_at: self.finalized_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApiKeyRow {
    id: Uuid,
    tenant_id: Uuid,
    key_hash: String,
    role: String,
    label: Option<String>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl ApiKeyRow {
    fn into_record(self) -> Result<ApiKeyRecord> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| CoreError::Internal(format!("unknown role: {}", self.role)))?;

        Ok(ApiKeyRecord {
            id: ApiKeyId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            key_hash: self.key_hash,
            role,
            label: self.label,
            created_at: self.created_at,
            revoked_at: self.revoked_at,
        })
    }
}

#[async_trait]
impl CaseStore for PgCaseStore {
    async fn insert_case(&self, scope: &TenantScope, case: &CaseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cases (id, tenant_id, status, ranking_snapshot, result_signature, created_at, finalized_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(case.id.0)
        .bind(scope.tenant_id().0)
        .bind(case.status.as_str())
        .bind(&case.ranking_snapshot)
        .bind(&case.result_signature)
        .bind(case.created_at)
        .bind(case.finalized_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_case(&self, scope: &TenantScope, case_id: CaseId) -> Result<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(
            r#"
            SELECT id, tenant_id, status, ranking_snapshot, result_signature, created_at, finalized_at
            FROM cases
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(case_id.0)
        .bind(scope.tenant_id().0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CaseRow::into_record).transpose()
    }

    async fn finalize_case(
        &self,
        scope: &TenantScope,
        case_id: CaseId,
        snapshot: &serde_json::Value,
        signature: &str,
        finalized_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE cases
            SET status = 'finalized',
                ranking_snapshot = $1,
                result_signature = $2,
                finalized_at = $3
            WHERE id = $4 AND tenant_id = $5 AND status = 'draft'
            "#,
        )
        .bind(snapshot)
        .bind(signature)
        .bind(finalized_at)
        .bind(case_id.0)
        .bind(scope.tenant_id().0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn billing_status(&self, scope: &TenantScope) -> Result<BillingStatus> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT billing_status FROM tenants WHERE id = $1")
                .bind(scope.tenant_id().0)
                .fetch_optional(&self.pool)
                .await?;

        let (status,) = row.ok_or(CoreError::TenantNotFound(scope.tenant_id()))?;
        BillingStatus::parse(&status)
            .ok_or_else(|| CoreError::Internal(format!("unknown billing status: {status}")))
    }

    async fn count_usage_events(&self, scope: &TenantScope) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_events WHERE tenant_id = $1")
            .bind(scope.tenant_id().0)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as u64)
    }

    async fn append_usage_event(&self, event: &UsageEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_events (id, tenant_id, api_key_id, endpoint, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.tenant_id.0)
        .bind(event.api_key_id.0)
        .bind(&event.endpoint)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_access_log(&self, entry: &AccessLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_logs (id, tenant_id, case_id, actor_key_id, action, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id.0)
        .bind(entry.case_id.0)
        .bind(entry.actor_key_id.0)
        .bind(entry.action.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, tenant_id, key_hash, role, label, created_at, revoked_at
            FROM api_keys
            WHERE key_hash = $1
            LIMIT 1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApiKeyRow::into_record).transpose()
    }

    async fn insert_api_key(&self, record: &ApiKeyRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, tenant_id, key_hash, role, label, created_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.0)
        .bind(record.tenant_id.0)
        .bind(&record.key_hash)
        .bind(record.role.as_str())
        .bind(&record.label)
        .bind(record.created_at)
        .bind(record.revoked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn revoke_api_key(
        &self,
        scope: &TenantScope,
        key_id: ApiKeyId,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET revoked_at = $1
            WHERE id = $2 AND tenant_id = $3 AND revoked_at IS NULL
            "#,
        )
        .bind(revoked_at)
        .bind(key_id.0)
        .bind(scope.tenant_id().0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_api_keys(&self, scope: &TenantScope) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, tenant_id, key_hash, role, label, created_at, revoked_at
            FROM api_keys
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(scope.tenant_id().0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ApiKeyRow::into_record).collect()
    }

    async fn insert_tenant(&self, tenant: &TenantRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, billing_status, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tenant.id.0)
        .bind(&tenant.name)
        .bind(tenant.billing_status.as_str())
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Option<TenantRecord>> {
        let row: Option<(Uuid, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, name, billing_status, created_at FROM tenants WHERE id = $1",
        )
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, name, billing, created_at)| {
            Ok(TenantRecord {
                id: TenantId::from_uuid(id),
                name,
                billing_status: BillingStatus::parse(&billing).ok_or_else(|| {
                    CoreError::Internal(format!("unknown billing status: {billing}"))
                })?,
                created_at,
            })
        })
        .transpose()
    }

    async fn set_billing_status(&self, tenant_id: TenantId, status: BillingStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE tenants SET billing_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
