//! Common fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;

use casevault::auth::KeyAuthenticator;
use casevault::domain::{
    ApiKeyId, ApiKeyRecord, BillingStatus, Role, TenantId, TenantRecord, UsageEvent,
};
use casevault::engine::{CaseEngine, ReplayVerifier};
use casevault::infra::{CaseStore, SqliteCaseStore};
use casevault::scope::{ScopeContext, TenantScope};
use casevault::usage::{spawn_usage_writer, UsageGuard, FREE_TIER_USAGE_LIMIT};

/// Fully wired service over an in-memory store.
pub struct TestEnv {
    pub store: Arc<SqliteCaseStore>,
    pub engine: Arc<CaseEngine>,
    pub verifier: Arc<ReplayVerifier>,
    pub guard: Arc<UsageGuard>,
    pub authenticator: Arc<KeyAuthenticator>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteCaseStore::in_memory().await.unwrap());
        let dyn_store: Arc<dyn CaseStore> = store.clone();

        let (recorder, _writer) = spawn_usage_writer(dyn_store.clone(), 64);
        let guard = Arc::new(UsageGuard::new(
            dyn_store.clone(),
            recorder.clone(),
            FREE_TIER_USAGE_LIMIT,
        ));
        let engine = Arc::new(CaseEngine::new(dyn_store.clone(), guard.clone()));
        let verifier = Arc::new(ReplayVerifier::new(dyn_store.clone()));
        let authenticator = Arc::new(KeyAuthenticator::new(dyn_store, recorder));

        Self {
            store,
            engine,
            verifier,
            guard,
            authenticator,
        }
    }

    /// Create a tenant with the given billing tier.
    pub async fn seed_tenant(&self, name: &str, billing: BillingStatus) -> TenantId {
        let tenant = TenantRecord::new(name);
        self.store.insert_tenant(&tenant).await.unwrap();
        if billing == BillingStatus::Paid {
            self.store
                .set_billing_status(tenant.id, BillingStatus::Paid)
                .await
                .unwrap();
        }
        tenant.id
    }

    /// Insert an API key row directly; returns (key_id, raw_key).
    pub async fn seed_key(&self, tenant_id: TenantId, role: Role) -> (ApiKeyId, String) {
        let (raw_key, key_hash) = KeyAuthenticator::generate_key();
        let record = ApiKeyRecord {
            id: ApiKeyId::new(),
            tenant_id,
            key_hash,
            role,
            label: Some("test-key".to_string()),
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.store.insert_api_key(&record).await.unwrap();
        (record.id, raw_key)
    }

    /// Append `count` usage events directly, bypassing the recorder queue.
    pub async fn seed_usage_events(&self, tenant_id: TenantId, api_key_id: ApiKeyId, count: u64) {
        for _ in 0..count {
            let event = UsageEvent::new(tenant_id, api_key_id, "/cases");
            self.store.append_usage_event(&event).await.unwrap();
        }
    }
}

/// Open a fresh scope for one unit of work.
pub fn open_scope(tenant_id: TenantId) -> TenantScope {
    ScopeContext::new().open(tenant_id).unwrap()
}
