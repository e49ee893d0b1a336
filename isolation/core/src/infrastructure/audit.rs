// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Access-audit sinks.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::audit::{AccessAuditEvent, AccessAuditSink, AccessMode, AccessOutcome};

/// Writes each event as a structured `tracing` record.
#[derive(Default)]
pub struct TracingAccessAuditSink;

impl AccessAuditSink for TracingAccessAuditSink {
    fn record(&self, event: AccessAuditEvent) {
        let tenant_id = event.tenant_id.as_ref().map(|t| t.as_str()).unwrap_or("-");
        let user_id = event.user_id.as_deref().unwrap_or("-");
        let error = event.error.as_deref().unwrap_or("");

        match (event.outcome, event.mode) {
            (AccessOutcome::Succeeded, AccessMode::Bypass) => info!(
                target: "tenantry::audit",
                operation = %event.operation,
                entity = %event.entity,
                tenant_id,
                user_id,
                mode = event.mode.as_str(),
                "Tenant scoping bypassed"
            ),
            (AccessOutcome::Succeeded, _) => debug!(
                target: "tenantry::audit",
                operation = %event.operation,
                entity = %event.entity,
                tenant_id,
                user_id,
                mode = event.mode.as_str(),
                "Data access"
            ),
            (outcome, _) => warn!(
                target: "tenantry::audit",
                operation = %event.operation,
                entity = %event.entity,
                tenant_id,
                user_id,
                mode = event.mode.as_str(),
                outcome = outcome.as_str(),
                error,
                "Data access not completed"
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct InMemoryAccessAuditSink {
    events: Mutex<Vec<AccessAuditEvent>>,
}

impl InMemoryAccessAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AccessAuditEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AccessAuditSink for InMemoryAccessAuditSink {
    fn record(&self, event: AccessAuditEvent) {
        self.events.lock().push(event);
    }
}
