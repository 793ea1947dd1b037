//! Usage metering and the soft billing cap.
//!
//! Recording is instrumentation, not bookkeeping: the producer hands the
//! event to a bounded channel with `try_send` and moves on. A full queue or
//! a failed insert is logged and dropped; the instrumented request never
//! observes the writer's failure or latency.
//!
//! The quota check is intentionally a soft, racy guard: it reads the
//! current count without locking, so concurrent load may overshoot the
//! threshold slightly. That is documented behavior, not a bug to fix with
//! a linearizable counter.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::domain::{ApiKeyId, BillingStatus, TenantId, UsageEvent};
use crate::infra::{CaseStore, CoreError, Result};
use crate::scope::TenantScope;

/// Usage events the free tier may accrue before case creation is denied.
pub const FREE_TIER_USAGE_LIMIT: u64 = 1000;

/// Default depth of the usage handoff queue.
pub const DEFAULT_USAGE_QUEUE_DEPTH: usize = 1024;

/// Non-blocking producer handle for usage events.
#[derive(Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<UsageEvent>,
}

impl UsageRecorder {
    /// Enqueue a usage event. Never blocks and never fails the caller;
    /// if the queue is full the event is dropped with a warning.
    pub fn record(&self, tenant_id: TenantId, api_key_id: ApiKeyId, endpoint: &str) {
        let event = UsageEvent::new(tenant_id, api_key_id, endpoint);
        if let Err(e) = self.tx.try_send(event) {
            warn!(%tenant_id, endpoint, "usage event dropped: {e}");
        }
    }
}

#[cfg(test)]
impl UsageRecorder {
    /// Recorder wired to an in-test receiver instead of the writer task.
    pub(crate) fn test_pair(depth: usize) -> (Self, mpsc::Receiver<UsageEvent>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self { tx }, rx)
    }
}

/// Start the background usage writer.
///
/// Returns the producer handle and the writer task. The task drains the
/// queue until every producer handle is dropped.
pub fn spawn_usage_writer(
    store: Arc<dyn CaseStore>,
    queue_depth: usize,
) -> (UsageRecorder, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<UsageEvent>(queue_depth);

    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = store.append_usage_event(&event).await {
                warn!(tenant_id = %event.tenant_id, "usage event insert failed: {e}");
            }
        }
    });

    (UsageRecorder { tx }, handle)
}

/// Gate for the soft billing cap, consulted before case creation.
pub struct UsageGuard {
    store: Arc<dyn CaseStore>,
    recorder: UsageRecorder,
    free_tier_limit: u64,
}

impl UsageGuard {
    pub fn new(store: Arc<dyn CaseStore>, recorder: UsageRecorder, free_tier_limit: u64) -> Self {
        Self {
            store,
            recorder,
            free_tier_limit,
        }
    }

    /// Record a usage event under the active scope, best-effort.
    pub fn record(&self, scope: &TenantScope, endpoint: &str, api_key_id: ApiKeyId) {
        self.recorder.record(scope.tenant_id(), api_key_id, endpoint);
    }

    /// Producer handle, for wiring into the authenticator.
    pub fn recorder(&self) -> UsageRecorder {
        self.recorder.clone()
    }

    /// Deny with `QuotaExceeded` when a free-tier tenant has accrued more
    /// than the limit. Billing status is read fresh each call, so an
    /// upgrade to `paid` lifts the cap without restart.
    pub async fn check_quota(&self, scope: &TenantScope) -> Result<()> {
        if self.store.billing_status(scope).await? == BillingStatus::Paid {
            return Ok(());
        }

        let used = self.store.count_usage_events(scope).await?;
        if used > self.free_tier_limit {
            return Err(CoreError::QuotaExceeded {
                used,
                limit: self.free_tier_limit,
            });
        }

        Ok(())
    }
}
