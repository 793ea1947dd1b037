//! Replay verification: idempotent recomputation, tamper detection, and
//! the VERIFY audit trail.

mod common;

use casevault::domain::{BillingStatus, CaseId, Role};
use casevault::infra::CoreError;
use common::{open_scope, TestEnv};
use serde_json::json;

#[tokio::test]
async fn test_replay_ok_and_idempotent() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (key, _) = env.seed_key(tenant, Role::User).await;

    let scope = open_scope(tenant);
    let case = env.engine.create_case(&scope).await.unwrap();
    let outcome = env
        .engine
        .finalize(&scope, case.id, json!({"rank": 1, "remedy": "Arnica", "score": 0.91}))
        .await
        .unwrap();

    // Any number of calls on the unmodified record agree.
    for _ in 0..3 {
        let report = env
            .verifier
            .verify_replay(&scope, case.id, key)
            .await
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.expected, outcome.signature);
        assert_eq!(report.computed, outcome.signature);
    }
}

#[tokio::test]
async fn test_replay_on_draft_is_invalid_state() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (key, _) = env.seed_key(tenant, Role::User).await;

    let scope = open_scope(tenant);
    let case = env.engine.create_case(&scope).await.unwrap();

    let err = env
        .verifier
        .verify_replay(&scope, case.id, key)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));
}

#[tokio::test]
async fn test_replay_on_missing_case_is_not_found() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (key, _) = env.seed_key(tenant, Role::User).await;

    let scope = open_scope(tenant);
    let err = env
        .verifier
        .verify_replay(&scope, CaseId::new(), key)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CaseNotFound(_)));
}

#[tokio::test]
async fn test_replay_detects_tampered_snapshot() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (key, _) = env.seed_key(tenant, Role::User).await;

    let scope = open_scope(tenant);
    let case = env.engine.create_case(&scope).await.unwrap();
    env.engine
        .finalize(&scope, case.id, json!({"rank": 1}))
        .await
        .unwrap();

    // Tamper with the stored snapshot behind the service's back.
    sqlx::query("UPDATE cases SET ranking_snapshot = ? WHERE id = ?")
        .bind(json!({"rank": 99}).to_string())
        .bind(case.id.0.to_string())
        .execute(env.store.pool())
        .await
        .unwrap();

    let report = env
        .verifier
        .verify_replay(&scope, case.id, key)
        .await
        .unwrap();
    assert!(!report.ok);
    assert_ne!(report.expected, report.computed);
}

#[tokio::test]
async fn test_replay_appends_verify_audit_entry() {
    let env = TestEnv::new().await;
    let tenant = env.seed_tenant("alpha-clinic", BillingStatus::Free).await;
    let (key, _) = env.seed_key(tenant, Role::User).await;

    let scope = open_scope(tenant);
    let case = env.engine.create_case(&scope).await.unwrap();
    env.engine
        .finalize(&scope, case.id, json!({"rank": 1}))
        .await
        .unwrap();

    env.verifier
        .verify_replay(&scope, case.id, key)
        .await
        .unwrap();

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM access_logs WHERE case_id = ? AND action = 'VERIFY'",
    )
    .bind(case.id.0.to_string())
    .fetch_one(env.store.pool())
    .await
    .unwrap();
    assert_eq!(count, 1);

    let (actor,): (String,) = sqlx::query_as(
        "SELECT actor_key_id FROM access_logs WHERE case_id = ? AND action = 'VERIFY'",
    )
    .bind(case.id.0.to_string())
    .fetch_one(env.store.pool())
    .await
    .unwrap();
    assert_eq!(actor, key.0.to_string());
}
