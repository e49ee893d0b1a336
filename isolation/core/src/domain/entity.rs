// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Entity Classification
//!
//! Static policy table consulted by the Access Interceptor and by the
//! Connection-Level Enforcer. Each persisted entity type is either
//! `TenantScoped` (carries a tenant foreign key, never visible cross-tenant)
//! or `ContextOptional` (global/shared data such as the tenant registry).
//!
//! | Entity | Table | Classification |
//! |--------|-------|----------------|
//! | `User` | `users` | TenantScoped |
//! | `JobPosting` | `job_postings` | TenantScoped |
//! | `Candidate` | `candidates` | TenantScoped |
//! | `Application` | `applications` | TenantScoped |
//! | `Tenant` | `tenants` | ContextOptional |
//! | `Account` | `accounts` | ContextOptional |
//! | `Session` | `sessions` | ContextOptional |
//! | `VerificationToken` | `verification_tokens` | ContextOptional |

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::errors::IsolationError;

/// Column holding the tenant foreign key on scoped tables.
pub const DEFAULT_TENANT_COLUMN: &str = "tenant_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClassification {
    TenantScoped,
    ContextOptional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPolicy {
    pub entity: String,
    pub table: String,
    pub classification: EntityClassification,
    pub tenant_column: String,
}

impl EntityPolicy {
    pub fn tenant_scoped(entity: &str, table: &str) -> Self {
        Self {
            entity: entity.to_string(),
            table: table.to_string(),
            classification: EntityClassification::TenantScoped,
            tenant_column: DEFAULT_TENANT_COLUMN.to_string(),
        }
    }

    pub fn context_optional(entity: &str, table: &str) -> Self {
        Self {
            entity: entity.to_string(),
            table: table.to_string(),
            classification: EntityClassification::ContextOptional,
            tenant_column: DEFAULT_TENANT_COLUMN.to_string(),
        }
    }

    pub fn is_tenant_scoped(&self) -> bool {
        self.classification == EntityClassification::TenantScoped
    }
}

/// Fixed entity → policy mapping.
#[derive(Debug, Clone)]
pub struct EntityPolicyTable {
    policies: HashMap<String, EntityPolicy>,
}

impl EntityPolicyTable {
    pub fn new(policies: impl IntoIterator<Item = EntityPolicy>) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|p| (p.entity.clone(), p))
                .collect(),
        }
    }

    /// Unknown entities are rejected rather than treated as unscoped.
    pub fn resolve(&self, entity: &str) -> Result<&EntityPolicy, IsolationError> {
        self.policies
            .get(entity)
            .ok_or_else(|| IsolationError::UnknownEntity(entity.to_string()))
    }

    /// Tenant-scoped policies, ordered by table name.
    pub fn tenant_scoped(&self) -> Vec<&EntityPolicy> {
        let mut scoped: Vec<&EntityPolicy> = self
            .policies
            .values()
            .filter(|p| p.is_tenant_scoped())
            .collect();
        scoped.sort_by(|a, b| a.table.cmp(&b.table));
        scoped
    }
}

impl Default for EntityPolicyTable {
    fn default() -> Self {
        Self::new([
            EntityPolicy::tenant_scoped("User", "users"),
            EntityPolicy::tenant_scoped("JobPosting", "job_postings"),
            EntityPolicy::tenant_scoped("Candidate", "candidates"),
            EntityPolicy::tenant_scoped("Application", "applications"),
            EntityPolicy::context_optional("Tenant", "tenants"),
            EntityPolicy::context_optional("Account", "accounts"),
            EntityPolicy::context_optional("Session", "sessions"),
            EntityPolicy::context_optional("VerificationToken", "verification_tokens"),
        ])
    }
}
