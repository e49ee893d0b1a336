// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identity Tuple
//!
//! The `(tenant, user, role)` triple bound to one logical request. It is
//! produced by the Boundary Guard from a verified identity and read by every
//! downstream isolation layer through [`crate::domain::tenant_context`].
//!
//! `SYSTEM_ADMIN` is the single bypass marker: no other role value ever skips
//! tenant scoping.

use serde::{Deserialize, Serialize};

/// The only role permitted to bypass tenant filtering.
pub const SYSTEM_ADMIN_ROLE: &str = "SYSTEM_ADMIN";

/// Tenant id declared on database sessions that run without a tenant.
///
/// No tenant row ever carries this id, so a row-filtering policy comparing
/// against it matches nothing.
pub const NO_TENANT_SENTINEL: &str = "00000000-0000-0000-0000-000000000000";

/// Unique identifier for a tenant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity tuple bound to a request's execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Identity {
    pub fn new(
        tenant_id: impl Into<TenantId>,
        user_id: Option<&str>,
        role: Option<&str>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.map(str::to_string),
            role: role.map(str::to_string),
        }
    }

    /// Tenant id, or `None` when the tuple carries the empty marker.
    pub fn tenant(&self) -> Option<&TenantId> {
        if self.tenant_id.is_empty() {
            None
        } else {
            Some(&self.tenant_id)
        }
    }

    pub fn is_system_admin(&self) -> bool {
        self.role.as_deref() == Some(SYSTEM_ADMIN_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_system_admin_role_bypasses() {
        assert!(Identity::new("t1", Some("u1"), Some("SYSTEM_ADMIN")).is_system_admin());
        assert!(!Identity::new("t1", Some("u1"), Some("system_admin")).is_system_admin());
        assert!(!Identity::new("t1", Some("u1"), Some("admin")).is_system_admin());
        assert!(!Identity::new("t1", None, None).is_system_admin());
    }

    #[test]
    fn test_empty_tenant_id_is_treated_as_no_tenant() {
        let identity = Identity::new("", Some("u1"), None);
        assert!(identity.tenant().is_none());
        assert_eq!(Identity::new("t1", None, None).tenant(), Some(&TenantId::from("t1")));
    }
}
