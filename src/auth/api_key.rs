//! API key authentication.
//!
//! Keys are formatted as `cv_<random>` and stored only as SHA-256 digests
//! (lookup-token pattern: deterministic, unsalted, irreversible). The raw
//! secret exists exactly once, in the issuance response, and is never
//! persisted or logged.

use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::domain::{ApiKeyId, ApiKeyRecord, Role, TenantId};
use crate::infra::{CaseStore, CoreError, Result};
use crate::scope::TenantScope;
use crate::usage::UsageRecorder;

/// API key prefix
pub const API_KEY_PREFIX: &str = "cv_";

/// Identity resolved from a credential.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub api_key_id: ApiKeyId,
    pub tenant_id: TenantId,
    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Resolves opaque credentials to (tenant, role) and manages key lifecycle.
pub struct KeyAuthenticator {
    store: Arc<dyn CaseStore>,
    recorder: UsageRecorder,
}

impl KeyAuthenticator {
    pub fn new(store: Arc<dyn CaseStore>, recorder: UsageRecorder) -> Self {
        Self { store, recorder }
    }

    /// Generate a new raw key and its storage digest.
    ///
    /// Returns (plaintext_key, key_hash).
    pub fn generate_key() -> (String, String) {
        use rand::Rng;
        let random_bytes: [u8; 24] = rand::thread_rng().gen();
        let random_part = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);

        let plaintext_key = format!("{API_KEY_PREFIX}{random_part}");
        let key_hash = Self::hash_key(&plaintext_key);

        (plaintext_key, key_hash)
    }

    /// SHA-256 hex of the raw key.
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Resolve a raw credential.
    ///
    /// Fails with `Unauthorized` when the digest is unknown or the key is
    /// revoked. Revoked keys are rejected unconditionally, and the two
    /// failures are indistinguishable to the caller. A successful
    /// authentication records a usage event; recording never blocks or
    /// fails the request.
    pub async fn authenticate(&self, raw_key: &str, endpoint: &str) -> Result<AuthContext> {
        let key_hash = Self::hash_key(raw_key);

        let record = self
            .store
            .find_api_key_by_hash(&key_hash)
            .await?
            .filter(|r| !r.is_revoked())
            .ok_or_else(|| CoreError::Unauthorized("invalid or revoked API key".to_string()))?;

        self.recorder
            .record(record.tenant_id, record.id, endpoint);

        Ok(AuthContext {
            api_key_id: record.id,
            tenant_id: record.tenant_id,
            role: record.role,
        })
    }

    /// As [`authenticate`](Self::authenticate), additionally requiring the
    /// admin role.
    pub async fn require_admin(&self, raw_key: &str, endpoint: &str) -> Result<AuthContext> {
        let context = self.authenticate(raw_key, endpoint).await?;
        if !context.is_admin() {
            return Err(CoreError::Forbidden("admin role required".to_string()));
        }
        Ok(context)
    }

    /// Issue a new key under the scope's tenant. The raw secret is
    /// returned once and only its digest is stored.
    pub async fn issue_key(
        &self,
        scope: &TenantScope,
        role: Role,
        label: Option<String>,
    ) -> Result<(ApiKeyRecord, String)> {
        let (raw_key, key_hash) = Self::generate_key();

        let record = ApiKeyRecord {
            id: ApiKeyId::new(),
            tenant_id: scope.tenant_id(),
            key_hash,
            role,
            label,
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.store.insert_api_key(&record).await?;

        Ok((record, raw_key))
    }

    /// Rotate the calling key: revoke it and issue a replacement with the
    /// same role.
    pub async fn rotate_key(
        &self,
        scope: &TenantScope,
        current: &AuthContext,
    ) -> Result<(ApiKeyRecord, String)> {
        self.revoke_key(scope, current.api_key_id).await?;
        self.issue_key(scope, current.role, Some("rotated".to_string()))
            .await
    }

    /// Revoke a key under the scope's tenant. Absent, foreign, and
    /// already-revoked keys are all `ApiKeyNotFound`.
    pub async fn revoke_key(&self, scope: &TenantScope, key_id: ApiKeyId) -> Result<()> {
        let updated = self.store.revoke_api_key(scope, key_id, Utc::now()).await?;
        if updated == 0 {
            return Err(CoreError::ApiKeyNotFound(key_id));
        }
        Ok(())
    }

    /// List the tenant's keys. Digests stay internal; callers see metadata
    /// only.
    pub async fn list_keys(&self, scope: &TenantScope) -> Result<Vec<ApiKeyRecord>> {
        self.store.list_api_keys(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::MockCaseStore;
    use tokio::sync::mpsc;

    fn test_recorder() -> (UsageRecorder, mpsc::Receiver<crate::domain::UsageEvent>) {
        UsageRecorder::test_pair(8)
    }

    fn key_record(role: Role, key_hash: String, revoked: bool) -> ApiKeyRecord {
        ApiKeyRecord {
            id: ApiKeyId::new(),
            tenant_id: TenantId::new(),
            key_hash,
            role,
            label: None,
            created_at: Utc::now(),
            revoked_at: revoked.then(Utc::now),
        }
    }

    #[test]
    fn test_generate_key_shape() {
        let (key, hash) = KeyAuthenticator::generate_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(hash.len(), 64); // SHA-256 hex
        assert_eq!(hash, KeyAuthenticator::hash_key(&key));
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let (a, _) = KeyAuthenticator::generate_key();
        let (b, _) = KeyAuthenticator::generate_key();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_authenticate_unknown_key() {
        let mut store = MockCaseStore::new();
        store.expect_find_api_key_by_hash().returning(|_| Ok(None));

        let (recorder, _rx) = test_recorder();
        let auth = KeyAuthenticator::new(Arc::new(store), recorder);

        let err = auth.authenticate("cv_nope", "/cases").await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_authenticate_revoked_key() {
        let (raw, hash) = KeyAuthenticator::generate_key();
        let mut store = MockCaseStore::new();
        store
            .expect_find_api_key_by_hash()
            .returning(move |_| Ok(Some(key_record(Role::Admin, hash.clone(), true))));

        let (recorder, _rx) = test_recorder();
        let auth = KeyAuthenticator::new(Arc::new(store), recorder);

        // Digest matches, but revocation rejects unconditionally.
        let err = auth.authenticate(&raw, "/cases").await.unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_authenticate_records_usage() {
        let (raw, hash) = KeyAuthenticator::generate_key();
        let mut store = MockCaseStore::new();
        store
            .expect_find_api_key_by_hash()
            .returning(move |_| Ok(Some(key_record(Role::User, hash.clone(), false))));

        let (recorder, mut rx) = test_recorder();
        let auth = KeyAuthenticator::new(Arc::new(store), recorder);

        let context = auth.authenticate(&raw, "/cases").await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.tenant_id, context.tenant_id);
        assert_eq!(event.api_key_id, context.api_key_id);
        assert_eq!(event.endpoint, "/cases");
    }

    #[tokio::test]
    async fn test_auth_survives_full_usage_queue() {
        let (raw, hash) = KeyAuthenticator::generate_key();
        let mut store = MockCaseStore::new();
        store
            .expect_find_api_key_by_hash()
            .returning(move |_| Ok(Some(key_record(Role::User, hash.clone(), false))));

        let (recorder, _rx) = UsageRecorder::test_pair(1);
        // Fill the queue so the auth-time record is dropped.
        recorder.record(TenantId::new(), ApiKeyId::new(), "/warmup");

        let auth = KeyAuthenticator::new(Arc::new(store), recorder);
        assert!(auth.authenticate(&raw, "/cases").await.is_ok());
    }

    #[tokio::test]
    async fn test_require_admin_rejects_user_role() {
        let (raw, hash) = KeyAuthenticator::generate_key();
        let mut store = MockCaseStore::new();
        store
            .expect_find_api_key_by_hash()
            .returning(move |_| Ok(Some(key_record(Role::User, hash.clone(), false))));

        let (recorder, _rx) = test_recorder();
        let auth = KeyAuthenticator::new(Arc::new(store), recorder);

        let err = auth.require_admin(&raw, "/admin").await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
