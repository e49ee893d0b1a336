// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Context Store
//!
//! Holds the active [`Identity`] for one logical task tree. The slot lives in a
//! tokio task-local, so concurrently running requests never observe each
//! other's tuple and the binding survives every `.await` inside the tree.
//!
//! ```text
//! scope(fut)             empty root slot ("absent"), writable by set/clear
//! run_with(id, fut)      fresh slot holding `id` for exactly `fut`
//!   └─ spawn(fut)        child task inherits a copy of the current state
//! ```
//!
//! Nested [`run_with`] calls stack: when the inner future completes (with a
//! value, an error, or by being dropped) the outer slot is visible again,
//! untouched by anything the inner future did.

use std::cell::RefCell;
use std::future::Future;

use tokio::task::JoinHandle;

use crate::domain::errors::IsolationError;
use crate::domain::identity::{Identity, TenantId};

tokio::task_local! {
    static ACTIVE_CONTEXT: RefCell<ContextState>;
}

/// What the current task tree sees when it asks for its identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContextState {
    /// Nothing was ever installed on this path.
    #[default]
    Absent,
    /// `clear()` installed the explicit empty-tenant marker.
    Cleared,
    Active(Identity),
}

impl ContextState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            ContextState::Active(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        self.identity().and_then(Identity::tenant)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity().and_then(|i| i.user_id.as_deref())
    }

    pub fn role(&self) -> Option<&str> {
        self.identity().and_then(|i| i.role.as_deref())
    }

    pub fn is_system_admin(&self) -> bool {
        self.identity().is_some_and(Identity::is_system_admin)
    }
}

/// Snapshot of the current task tree's context.
pub fn get() -> ContextState {
    ACTIVE_CONTEXT
        .try_with(|slot| slot.borrow().clone())
        .unwrap_or_default()
}

/// Install `identity` for the remainder of the current scope.
///
/// Fails with [`IsolationError::ContextScopeMissing`] when the task was not
/// started under [`scope`], [`run_with`] or [`spawn`].
pub fn set(identity: Identity) -> Result<(), IsolationError> {
    ACTIVE_CONTEXT
        .try_with(|slot| *slot.borrow_mut() = ContextState::Active(identity))
        .map_err(|_| IsolationError::ContextScopeMissing)
}

/// Install the empty-tenant marker. Used to simulate unauthenticated flows.
pub fn clear() -> Result<(), IsolationError> {
    ACTIVE_CONTEXT
        .try_with(|slot| *slot.borrow_mut() = ContextState::Cleared)
        .map_err(|_| IsolationError::ContextScopeMissing)
}

/// Run `fut` in a fresh, empty root scope.
pub async fn scope<F: Future>(fut: F) -> F::Output {
    ACTIVE_CONTEXT
        .scope(RefCell::new(ContextState::Absent), fut)
        .await
}

/// Run `fut` with `identity` bound, restoring the enclosing state afterwards.
pub async fn run_with<F: Future>(identity: Identity, fut: F) -> F::Output {
    ACTIVE_CONTEXT
        .scope(RefCell::new(ContextState::Active(identity)), fut)
        .await
}

/// Spawn a task that inherits the caller's current context.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let inherited = get();
    tokio::spawn(ACTIVE_CONTEXT.scope(RefCell::new(inherited), fut))
}

/// Run `f` under another tenant while keeping the current user and role.
pub async fn with_tenant<F, Fut, T>(tenant_id: impl Into<TenantId>, f: F) -> Result<T, IsolationError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let tenant_id = tenant_id.into();
    if tenant_id.is_empty() {
        return Err(IsolationError::TenantContextMissing);
    }

    let current = get();
    let identity = Identity {
        tenant_id,
        user_id: current.user_id().map(str::to_string),
        role: current.role().map(str::to_string),
    };
    Ok(run_with(identity, f()).await)
}

pub fn tenant_id() -> Option<TenantId> {
    get().tenant_id().cloned()
}

pub fn user_id() -> Option<String> {
    get().user_id().map(str::to_string)
}

pub fn role() -> Option<String> {
    get().role().map(str::to_string)
}

pub fn is_system_admin() -> bool {
    get().is_system_admin()
}

/// Tenant id for callers that must never run unscoped.
pub fn require_tenant_id() -> Result<TenantId, IsolationError> {
    tenant_id().ok_or(IsolationError::TenantContextMissing)
}
