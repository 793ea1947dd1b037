//! Tenant scoping.
//!
//! A [`TenantScope`] binds one unit of work to exactly one tenant. It is the
//! only value accepted by tenant-scoped store operations, so a scoped query
//! cannot be constructed without one. The isolation guarantee holds at
//! construction time, not just as a runtime check.
//!
//! Each request builds its own [`ScopeContext`] and opens at most one scope
//! through it. Opening a second scope while one is active is an error, and
//! the scope is released on every exit path (including panics) via `Drop`.
//! Scopes are never cached or shared across units of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::TenantId;
use crate::infra::{CoreError, Result};

/// Per-unit-of-work gate for opening a tenant scope.
#[derive(Debug)]
pub struct ScopeContext {
    active: Arc<AtomicBool>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the scope for `tenant_id`.
    ///
    /// Fails with `PermissionDenied` if a scope opened through this context
    /// is still active. The returned scope releases the context when dropped.
    pub fn open(&self, tenant_id: TenantId) -> Result<TenantScope> {
        if self.active.swap(true, Ordering::AcqRel) {
            return Err(CoreError::PermissionDenied(
                "a tenant scope is already active for this unit of work".to_string(),
            ));
        }
        Ok(TenantScope {
            tenant_id,
            active: Arc::clone(&self.active),
        })
    }
}

impl Default for ScopeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// An active tenant scope.
///
/// Deliberately neither `Clone` nor constructible outside [`ScopeContext`];
/// holding one is proof that the unit of work is bound to `tenant_id`.
#[derive(Debug)]
pub struct TenantScope {
    tenant_id: TenantId,
    active: Arc<AtomicBool>,
}

impl TenantScope {
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl Drop for TenantScope {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
