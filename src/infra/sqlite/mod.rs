//! SQLite case store for local development and the test suite.
//!
//! SQLite has no row-level security, so tenant filtering lives entirely in
//! the query layer here: every scoped statement binds the scope's tenant id.
//! UUIDs and timestamps are stored as TEXT (hyphenated / RFC 3339), JSON
//! snapshots as serialized TEXT.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::domain::{
    AccessLogEntry, ApiKeyId, ApiKeyRecord, BillingStatus, CaseId, CaseRecord, CaseStatus, Role,
    TenantId, TenantRecord, UsageEvent,
};
use crate::infra::{CaseStore, CoreError, Result};
use crate::scope::TenantScope;

/// SQLite-backed case store
pub struct SqliteCaseStore {
    pool: SqlitePool,
}

impl SqliteCaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a store from a database path and apply migrations.
    pub async fn from_path(path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store with migrations applied. A single connection keeps
    /// every statement on the same in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::migrations::run_sqlite(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(s: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(s).map_err(|e| CoreError::Internal(format!("corrupt uuid column: {e}")))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Internal(format!("corrupt timestamp column: {e}")))
}

#[derive(Debug, FromRow)]
struct CaseRow {
    id: String,
    tenant_id: String,
    status: String,
    ranking_snapshot: Option<String>,
    result_signature: Option<String>,
    created_at: String,
    finalized_at: Option<String>,
}

impl CaseRow {
    fn into_record(self) -> Result<CaseRecord> {
        let status = CaseStatus::parse(&self.status)
            .ok_or_else(|| CoreError::Internal(format!("unknown case status: {}", self.status)))?;
        let snapshot = self
            .ranking_snapshot
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| CoreError::Internal(format!("corrupt ranking_snapshot: {e}")))?;

        Ok(CaseRecord {
            id: CaseId::from_uuid(parse_uuid(&self.id)?),
            tenant_id: TenantId::from_uuid(parse_uuid(&self.tenant_id)?),
            status,
            ranking_snapshot: snapshot,
            result_signature: self.result_signature,
            created_at: parse_ts(&self.created_at)?,
            finalized_at: self.finalized_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApiKeyRow {
    id: String,
    tenant_id: String,
    key_hash: String,
    role: String,
    label: Option<String>,
    created_at: String,
    revoked_at: Option<String>,
}

impl ApiKeyRow {
    fn into_record(self) -> Result<ApiKeyRecord> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| CoreError::Internal(format!("unknown role: {}", self.role)))?;

        Ok(ApiKeyRecord {
            id: ApiKeyId::from_uuid(parse_uuid(&self.id)?),
            tenant_id: TenantId::from_uuid(parse_uuid(&self.tenant_id)?),
            key_hash: self.key_hash,
            role,
            label: self.label,
            created_at: parse_ts(&self.created_at)?,
            revoked_at: self.revoked_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

#[async_trait]
impl CaseStore for SqliteCaseStore {
    async fn insert_case(&self, scope: &TenantScope, case: &CaseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cases (id, tenant_id, status, ranking_snapshot, result_signature, created_at, finalized_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(case.id.0.to_string())
        .bind(scope.tenant_id().0.to_string())
        .bind(case.status.as_str())
        .bind(
            case.ranking_snapshot
                .as_ref()
                .map(|v| v.to_string()),
        )
        .bind(&case.result_signature)
        .bind(case.created_at.to_rfc3339())
        .bind(case.finalized_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_case(&self, scope: &TenantScope, case_id: CaseId) -> Result<Option<CaseRecord>> {
        let row = sqlx::query_as::<_, CaseRow>(
            r#"
            SELECT id, tenant_id, status, ranking_snapshot, result_signature, created_at, finalized_at
            FROM cases
            WHERE id = ? AND tenant_id = ?
            "#,
        )
        .bind(case_id.0.to_string())
        .bind(scope.tenant_id().0.to_string())
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
        // Conditional update: the status predicate is the sole concurrency
        // guard, so racing finalizes resolve to exactly one winner.
        let result = sqlx::query(
            r#"
            UPDATE cases
            SET status = 'finalized',
                ranking_snapshot = ?,
                result_signature = ?,
                finalized_at = ?
            WHERE id = ? AND tenant_id = ? AND status = 'draft'
            "#,
        )
        .bind(snapshot.to_string())
        .bind(signature)
        .bind(finalized_at.to_rfc3339())
        .bind(case_id.0.to_string())
        .bind(scope.tenant_id().0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn billing_status(&self, scope: &TenantScope) -> Result<BillingStatus> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT billing_status FROM tenants WHERE id = ?")
                .bind(scope.tenant_id().0.to_string())
                .fetch_optional(&self.pool)
                .await?;

        let (status,) = row.ok_or(CoreError::TenantNotFound(scope.tenant_id()))?;
        BillingStatus::parse(&status)
            .ok_or_else(|| CoreError::Internal(format!("unknown billing status: {status}")))
    }

    async fn count_usage_events(&self, scope: &TenantScope) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM usage_events WHERE tenant_id = ?")
            .bind(scope.tenant_id().0.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 as u64)
    }

    async fn append_usage_event(&self, event: &UsageEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_events (id, tenant_id, api_key_id, endpoint, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.tenant_id.0.to_string())
        .bind(event.api_key_id.0.to_string())
        .bind(&event.endpoint)
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_access_log(&self, entry: &AccessLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO access_logs (id, tenant_id, case_id, actor_key_id, action, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.tenant_id.0.to_string())
        .bind(entry.case_id.0.to_string())
        .bind(entry.actor_key_id.0.to_string())
        .bind(entry.action.as_str())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, tenant_id, key_hash, role, label, created_at, revoked_at
            FROM api_keys
            WHERE key_hash = ?
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
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.0.to_string())
        .bind(record.tenant_id.0.to_string())
        .bind(&record.key_hash)
        .bind(record.role.as_str())
        .bind(&record.label)
        .bind(record.created_at.to_rfc3339())
        .bind(record.revoked_at.map(|t| t.to_rfc3339()))
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
            SET revoked_at = ?
            WHERE id = ? AND tenant_id = ? AND revoked_at IS NULL
            "#,
        )
        .bind(revoked_at.to_rfc3339())
        .bind(key_id.0.to_string())
        .bind(scope.tenant_id().0.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_api_keys(&self, scope: &TenantScope) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query_as::<_, ApiKeyRow>(
            r#"
            SELECT id, tenant_id, key_hash, role, label, created_at, revoked_at
            FROM api_keys
            WHERE tenant_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(scope.tenant_id().0.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ApiKeyRow::into_record).collect()
    }

    async fn insert_tenant(&self, tenant: &TenantRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, billing_status, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(tenant.id.0.to_string())
        .bind(&tenant.name)
        .bind(tenant.billing_status.as_str())
        .bind(tenant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_tenant(&self, tenant_id: TenantId) -> Result<Option<TenantRecord>> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, name, billing_status, created_at FROM tenants WHERE id = ?",
        )
        .bind(tenant_id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, name, billing, created_at)| {
            Ok(TenantRecord {
                id: TenantId::from_uuid(parse_uuid(&id)?),
                name,
                billing_status: BillingStatus::parse(&billing).ok_or_else(|| {
                    CoreError::Internal(format!("unknown billing status: {billing}"))
                })?,
                created_at: parse_ts(&created_at)?,
            })
        })
        .transpose()
    }

    async fn set_billing_status(&self, tenant_id: TenantId, status: BillingStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE tenants SET billing_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(tenant_id.0.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
