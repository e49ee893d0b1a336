// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Access Interceptor
//!
//! Single chokepoint between application code and every [`DataStore`] driver.
//! Each operation is rewritten according to the entity policy table and the
//! identity bound to the current task tree before the driver sees it.
//!
//! # Flow
//!
//! 1. Resolve the entity policy (unknown entities are rejected)
//! 2. `ContextOptional` entities pass through unmodified
//! 3. No active tenant and not `SYSTEM_ADMIN`: reject with `TenantContextRequired`
//! 4. Single-row operation without a filter: reject with `InvalidScopedQuery`
//! 5. The `SYSTEM_ADMIN` role passes through unmodified
//! 6. Inject the tenant:
//!    - reads, updates, deletes: `caller_filter AND tenant_column = tenant`
//!    - create: tenant force-set on the payload
//!    - update: tenant force-set on the payload as well, so a row can never
//!      be moved into another tenant
//!    - upsert: filter scoped, both payloads force-set
//! 7. Execute and record an access-audit event
//!
//! A scoped operation that names another tenant's row matches zero rows. The
//! caller sees `None` / `0`, exactly as if the row did not exist.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::domain::audit::{AccessAuditEvent, AccessAuditSink, AccessMode, AccessOutcome};
use crate::domain::entity::{EntityPolicy, EntityPolicyTable};
use crate::domain::errors::IsolationError;
use crate::domain::query::{DataOperation, Filter, OperationKind, OperationOutcome, Record};
use crate::domain::repository::{DataStore, RepositoryError};
use crate::domain::tenant_context::{self, ContextState};

/// Rewrite `operation` for `policy` under `context`.
///
/// Pure function of its inputs; [`TenantScopedStore::execute`] is the only
/// production caller.
pub fn scope_operation(
    policy: &EntityPolicy,
    context: &ContextState,
    operation: DataOperation,
) -> Result<(DataOperation, AccessMode), IsolationError> {
    if !policy.is_tenant_scoped() {
        return Ok((operation, AccessMode::Unscoped));
    }

    let kind = operation.kind();
    let tenant = if context.is_system_admin() {
        None
    } else {
        let tenant = context
            .tenant_id()
            .ok_or_else(|| IsolationError::TenantContextRequired {
                operation: kind,
                entity: policy.entity.clone(),
            })?;
        Some(tenant)
    };

    // Applies to the bypass role too.
    if requires_filter(kind) && operation.filter().is_none() {
        return Err(IsolationError::InvalidScopedQuery {
            operation: kind,
            entity: policy.entity.clone(),
        });
    }

    let Some(tenant) = tenant else {
        return Ok((operation, AccessMode::Bypass));
    };

    let column = policy.tenant_column.as_str();
    let tenant_value = Value::String(tenant.as_str().to_string());
    let scope = |filter: Option<Filter>| {
        let tenant_filter = Filter::eq(column, tenant_value.clone());
        match filter {
            Some(filter) => filter.and(tenant_filter),
            None => tenant_filter,
        }
    };
    let stamp = |mut data: Record| {
        data.insert(column.to_string(), tenant_value.clone());
        data
    };

    let scoped = match operation {
        DataOperation::FindUnique { filter } => DataOperation::FindUnique {
            filter: Some(scope(filter)),
        },
        DataOperation::FindFirst { filter } => DataOperation::FindFirst {
            filter: Some(scope(filter)),
        },
        DataOperation::FindMany { filter } => DataOperation::FindMany {
            filter: Some(scope(filter)),
        },
        DataOperation::Create { data } => DataOperation::Create { data: stamp(data) },
        DataOperation::Update { filter, data } => DataOperation::Update {
            filter: Some(scope(filter)),
            data: stamp(data),
        },
        DataOperation::UpdateMany { filter, data } => DataOperation::UpdateMany {
            filter: Some(scope(filter)),
            data: stamp(data),
        },
        DataOperation::Delete { filter } => DataOperation::Delete {
            filter: Some(scope(filter)),
        },
        DataOperation::DeleteMany { filter } => DataOperation::DeleteMany {
            filter: Some(scope(filter)),
        },
        DataOperation::Upsert {
            filter,
            create,
            update,
        } => DataOperation::Upsert {
            filter: Some(scope(filter)),
            create: stamp(create),
            update: stamp(update),
        },
    };

    Ok((scoped, AccessMode::Scoped))
}

/// Single-row operations must name the row they target.
fn requires_filter(kind: OperationKind) -> bool {
    matches!(
        kind,
        OperationKind::FindUnique | OperationKind::Update | OperationKind::Delete | OperationKind::Upsert
    )
}

/// Repository facade that enforces tenant scoping on every operation.
#[derive(Clone)]
pub struct TenantScopedStore {
    driver: Arc<dyn DataStore>,
    policies: Arc<EntityPolicyTable>,
    audit: Arc<dyn AccessAuditSink>,
}

impl TenantScopedStore {
    pub fn new(
        driver: Arc<dyn DataStore>,
        policies: Arc<EntityPolicyTable>,
        audit: Arc<dyn AccessAuditSink>,
    ) -> Self {
        Self {
            driver,
            policies,
            audit,
        }
    }

    /// Typed handle for one entity type.
    pub fn entity(&self, entity: &str) -> EntityHandle<'_> {
        EntityHandle {
            store: self,
            entity: entity.to_string(),
        }
    }

    pub async fn execute(
        &self,
        entity: &str,
        operation: DataOperation,
    ) -> Result<OperationOutcome, IsolationError> {
        let policy = self.policies.resolve(entity).inspect_err(|_| {
            warn!(entity = %entity, operation = %operation.kind(), "Rejected operation on unknown entity");
        })?;

        let context = tenant_context::get();
        let kind = operation.kind();

        let (operation, mode) = match scope_operation(policy, &context, operation) {
            Ok(scoped) => scoped,
            Err(e) => {
                self.record(policy, kind, &context, AccessMode::Scoped, AccessOutcome::Rejected, Some(&e));
                return Err(e);
            }
        };

        match self.driver.execute(policy, operation).await {
            Ok(outcome) => {
                self.record(policy, kind, &context, mode, AccessOutcome::Succeeded, None);
                Ok(outcome)
            }
            Err(e) => {
                self.record(policy, kind, &context, mode, AccessOutcome::Failed, Some(&e));
                Err(e.into())
            }
        }
    }

    fn record(
        &self,
        policy: &EntityPolicy,
        operation: OperationKind,
        context: &ContextState,
        mode: AccessMode,
        outcome: AccessOutcome,
        error: Option<&dyn std::error::Error>,
    ) {
        metrics::counter!(
            "tenantry_data_access_total",
            "entity" => policy.entity.clone(),
            "operation" => operation.as_str(),
            "mode" => mode.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        self.audit.record(AccessAuditEvent {
            operation,
            entity: policy.entity.clone(),
            tenant_id: context.tenant_id().cloned(),
            user_id: context.user_id().map(str::to_string),
            mode,
            outcome,
            error: error.map(|e| e.to_string()),
            timestamp: Utc::now(),
        });
    }
}

/// Per-entity facade over [`TenantScopedStore::execute`].
pub struct EntityHandle<'a> {
    store: &'a TenantScopedStore,
    entity: String,
}

impl EntityHandle<'_> {
    async fn run(&self, operation: DataOperation) -> Result<OperationOutcome, IsolationError> {
        self.store.execute(&self.entity, operation).await
    }

    pub async fn find_unique(&self, filter: Filter) -> Result<Option<Record>, IsolationError> {
        self.run(DataOperation::FindUnique { filter: Some(filter) })
            .await
            .and_then(|o| expect_record(OperationKind::FindUnique, o))
    }

    pub async fn find_first(&self, filter: Option<Filter>) -> Result<Option<Record>, IsolationError> {
        self.run(DataOperation::FindFirst { filter })
            .await
            .and_then(|o| expect_record(OperationKind::FindFirst, o))
    }

    pub async fn find_many(&self, filter: Option<Filter>) -> Result<Vec<Record>, IsolationError> {
        match self.run(DataOperation::FindMany { filter }).await? {
            OperationOutcome::Records(records) => Ok(records),
            _ => Err(unexpected(OperationKind::FindMany)),
        }
    }

    pub async fn create(&self, data: Record) -> Result<Record, IsolationError> {
        self.run(DataOperation::Create { data })
            .await
            .and_then(|o| expect_record(OperationKind::Create, o))?
            .ok_or_else(|| unexpected(OperationKind::Create))
    }

    /// `None` when no row matched, including rows owned by another tenant.
    pub async fn update(&self, filter: Filter, data: Record) -> Result<Option<Record>, IsolationError> {
        self.run(DataOperation::Update {
            filter: Some(filter),
            data,
        })
        .await
        .and_then(|o| expect_record(OperationKind::Update, o))
    }

    pub async fn update_many(&self, filter: Option<Filter>, data: Record) -> Result<u64, IsolationError> {
        self.run(DataOperation::UpdateMany { filter, data })
            .await
            .and_then(|o| expect_count(OperationKind::UpdateMany, o))
    }

    pub async fn delete(&self, filter: Filter) -> Result<Option<Record>, IsolationError> {
        self.run(DataOperation::Delete { filter: Some(filter) })
            .await
            .and_then(|o| expect_record(OperationKind::Delete, o))
    }

    pub async fn delete_many(&self, filter: Option<Filter>) -> Result<u64, IsolationError> {
        self.run(DataOperation::DeleteMany { filter })
            .await
            .and_then(|o| expect_count(OperationKind::DeleteMany, o))
    }

    pub async fn upsert(&self, filter: Filter, create: Record, update: Record) -> Result<Record, IsolationError> {
        self.run(DataOperation::Upsert {
            filter: Some(filter),
            create,
            update,
        })
        .await
        .and_then(|o| expect_record(OperationKind::Upsert, o))?
        .ok_or_else(|| unexpected(OperationKind::Upsert))
    }
}

fn unexpected(kind: OperationKind) -> IsolationError {
    RepositoryError::UnexpectedOutcome(kind.to_string()).into()
}

fn expect_record(kind: OperationKind, outcome: OperationOutcome) -> Result<Option<Record>, IsolationError> {
    match outcome {
        OperationOutcome::Record(record) => Ok(record),
        _ => Err(unexpected(kind)),
    }
}

fn expect_count(kind: OperationKind, outcome: OperationOutcome) -> Result<u64, IsolationError> {
    match outcome {
        OperationOutcome::Count(count) => Ok(count),
        _ => Err(unexpected(kind)),
    }
}
