// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identity verification seam used by the Boundary Guard.
//!
//! Token issuance is not handled here; a verifier only turns a presented
//! credential into the identity tuple the isolation core needs.

use serde::{Deserialize, Serialize};

use crate::domain::identity::{Identity, TenantId, SYSTEM_ADMIN_ROLE};

/// Identity proven by a verifier. The tenant may be absent for users that
/// are not yet attached to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub role: Option<String>,
}

impl VerifiedIdentity {
    pub fn is_system_admin(&self) -> bool {
        self.role.as_deref() == Some(SYSTEM_ADMIN_ROLE)
    }

    /// Resolve the tenant to bind. A requested tenant override is honoured
    /// only for the bypass role; for everyone else it is ignored.
    pub fn effective_tenant(&self, requested_override: Option<&str>) -> Option<TenantId> {
        let override_tenant = requested_override
            .map(str::trim)
            .filter(|t| !t.is_empty() && self.is_system_admin());

        override_tenant
            .or(self.tenant_id.as_deref())
            .filter(|t| !t.is_empty())
            .map(TenantId::from)
    }

    pub fn into_identity(self, tenant: TenantId) -> Identity {
        Identity {
            tenant_id: tenant,
            user_id: Some(self.user_id),
            role: self.role,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No credentials presented")]
    MissingCredentials,

    #[error("Invalid credentials: {0}")]
    InvalidToken(String),

    #[error("Credentials expired")]
    Expired,
}

/// Verifies a bearer credential.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified(tenant: Option<&str>, role: Option<&str>) -> VerifiedIdentity {
        VerifiedIdentity {
            user_id: "u1".to_string(),
            tenant_id: tenant.map(str::to_string),
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn test_override_ignored_for_regular_role() {
        let identity = verified(Some("t1"), Some("recruiter"));
        assert_eq!(identity.effective_tenant(Some("t2")), Some(TenantId::from("t1")));
    }

    #[test]
    fn test_override_honoured_for_system_admin() {
        let identity = verified(Some("t1"), Some(SYSTEM_ADMIN_ROLE));
        assert_eq!(identity.effective_tenant(Some("t2")), Some(TenantId::from("t2")));
        assert_eq!(identity.effective_tenant(Some("  ")), Some(TenantId::from("t1")));
        assert_eq!(identity.effective_tenant(None), Some(TenantId::from("t1")));
    }

    #[test]
    fn test_missing_tenant() {
        assert_eq!(verified(None, Some("recruiter")).effective_tenant(None), None);
        assert_eq!(verified(Some(""), None).effective_tenant(None), None);
    }
}
