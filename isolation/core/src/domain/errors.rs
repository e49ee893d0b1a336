// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Isolation Error Taxonomy
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | `TenantContextMissing` | `require_tenant_id`, `with_tenant` | fatal, HTTP 403 |
//! | `TenantContextRequired` | Access Interceptor | fatal, HTTP 403 |
//! | `InvalidScopedQuery` | Access Interceptor | caller bug, HTTP 400 |
//! | `UnknownEntity` | Access Interceptor | configuration bug |
//! | `ContextScopeMissing` | `set` / `clear` outside a scope | programming error |
//! | `ConnectionBootstrapFailed` | Connection-Level Enforcer | logged, degraded unless gated |
//! | `SessionSyncFailed` | Connection-Level Enforcer | aborts the pending query |
//!
//! Cross-tenant access is deliberately *not* an error: a scoped operation that
//! names another tenant's row simply matches nothing.

use crate::domain::query::OperationKind;
use crate::domain::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("Tenant context is required but not set. Ensure the request passed the boundary guard.")]
    TenantContextMissing,

    #[error("Tenant context required for {operation} on {entity}")]
    TenantContextRequired {
        operation: OperationKind,
        entity: String,
    },

    #[error("{operation} on {entity} requires a filter")]
    InvalidScopedQuery {
        operation: OperationKind,
        entity: String,
    },

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("No tenant context scope is active on this task")]
    ContextScopeMissing,

    #[error("Connection bootstrap failed: {0}")]
    ConnectionBootstrapFailed(String),

    #[error("Session sync failed: {0}")]
    SessionSyncFailed(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for IsolationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::SessionSync(detail) => IsolationError::SessionSyncFailed(detail),
            other => IsolationError::Repository(other),
        }
    }
}

impl IsolationError {
    /// True for the errors that mean "no usable tenant was bound".
    pub fn is_missing_context(&self) -> bool {
        matches!(
            self,
            IsolationError::TenantContextMissing | IsolationError::TenantContextRequired { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_sync_failure_is_lifted() {
        let err: IsolationError = RepositoryError::SessionSync("app.tenant_id: broken pipe".to_string()).into();
        assert!(matches!(err, IsolationError::SessionSyncFailed(_)));

        let err: IsolationError = RepositoryError::Database("boom".to_string()).into();
        assert!(matches!(err, IsolationError::Repository(RepositoryError::Database(_))));
        assert!(!err.is_missing_context());
    }
}
