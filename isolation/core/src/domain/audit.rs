// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Access-audit events recorded by the Access Interceptor for every operation,
//! including bypassed and rejected ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::TenantId;
use crate::domain::query::OperationKind;

/// How the interceptor treated the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Tenant id injected into the operation.
    Scoped,
    /// Bypass marker present; passed through unmodified.
    Bypass,
    /// Entity is `ContextOptional`; passed through unmodified.
    Unscoped,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Scoped => "scoped",
            AccessMode::Bypass => "bypass",
            AccessMode::Unscoped => "unscoped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    Succeeded,
    /// Refused before reaching the driver.
    Rejected,
    /// The driver returned an error.
    Failed,
}

impl AccessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessOutcome::Succeeded => "succeeded",
            AccessOutcome::Rejected => "rejected",
            AccessOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessAuditEvent {
    pub operation: OperationKind,
    pub entity: String,
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<String>,
    pub mode: AccessMode,
    pub outcome: AccessOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for access-audit events.
pub trait AccessAuditSink: Send + Sync {
    fn record(&self, event: AccessAuditEvent);
}
