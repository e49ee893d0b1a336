// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Register User Use Case
//!
//! Self-service sign-up into the default tenant. Exercises every isolation
//! layer: the tenant is looked up through a `ContextOptional` entity, and the
//! user row is checked for and created under that tenant's context, so the
//! Access Interceptor stamps the tenant id on the new row.
//!
//! # Flow
//!
//! 1. Validate presence of email, password and name
//! 2. Validate email format and password complexity
//! 3. Resolve the default tenant by slug
//! 4. Under the tenant's context: reject a duplicate email, hash the
//!    password, create the user
//! 5. Return the public user view

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::application::access_interceptor::TenantScopedStore;
use crate::domain::credentials::{self, CredentialError, CredentialHasher};
use crate::domain::errors::IsolationError;
use crate::domain::query::{Filter, Record};
use crate::domain::tenant_context;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Public view of a registered user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub tenant_id: String,
    pub role: String,
    pub created_at: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Email, password, and name are required")]
    MissingFields,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("{0}")]
    InvalidPassword(String),

    #[error("User with this email already exists")]
    UserExists,

    #[error("Default tenant '{0}' not found")]
    TenantNotFound(String),

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error("Credential hashing failed: {0}")]
    Credential(#[from] CredentialError),
}

#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub default_tenant_slug: String,
    pub default_role: String,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            default_tenant_slug: "default".to_string(),
            default_role: "recruiter".to_string(),
        }
    }
}

#[async_trait]
pub trait RegisterUserUseCase: Send + Sync {
    async fn register(&self, request: RegisterUserRequest) -> Result<RegisteredUser, RegistrationError>;
}

pub struct StandardRegisterUserUseCase {
    store: TenantScopedStore,
    hasher: Arc<dyn CredentialHasher>,
    settings: RegistrationSettings,
}

impl StandardRegisterUserUseCase {
    pub fn new(store: TenantScopedStore, hasher: Arc<dyn CredentialHasher>, settings: RegistrationSettings) -> Self {
        Self {
            store,
            hasher,
            settings,
        }
    }

    async fn resolve_tenant(&self) -> Result<String, RegistrationError> {
        let slug = &self.settings.default_tenant_slug;
        let tenant = self
            .store
            .entity("Tenant")
            .find_first(Some(Filter::eq("slug", slug.as_str())))
            .await?;

        tenant
            .as_ref()
            .and_then(|t| string_field(t, "id"))
            .ok_or_else(|| {
                warn!(slug = %slug, "Default tenant missing, cannot register users");
                RegistrationError::TenantNotFound(slug.clone())
            })
    }

    async fn hash_password(&self, password: String) -> Result<String, RegistrationError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| CredentialError(e.to_string()))?
            .map_err(RegistrationError::from)
    }

    async fn create_user(
        &self,
        email: String,
        name: String,
        password: String,
    ) -> Result<RegisteredUser, RegistrationError> {
        let users = self.store.entity("User");

        if users.find_first(Some(Filter::eq("email", email.as_str()))).await?.is_some() {
            return Err(RegistrationError::UserExists);
        }

        let password_hash = self.hash_password(password).await?;

        let mut data = Record::new();
        data.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        data.insert("email".to_string(), Value::String(email));
        data.insert("name".to_string(), Value::String(name));
        data.insert("password_hash".to_string(), Value::String(password_hash));
        data.insert("role".to_string(), Value::String(self.settings.default_role.clone()));

        let created = users.create(data).await?;
        Ok(RegisteredUser::from_record(&created))
    }
}

#[async_trait]
impl RegisterUserUseCase for StandardRegisterUserUseCase {
    async fn register(&self, request: RegisterUserRequest) -> Result<RegisteredUser, RegistrationError> {
        let (email, password, name) = match (
            non_empty(request.email),
            request.password.filter(|p| !p.is_empty()),
            non_empty(request.name),
        ) {
            (Some(email), Some(password), Some(name)) => (email.to_lowercase(), password, name),
            _ => return Err(RegistrationError::MissingFields),
        };

        if !credentials::is_valid_email(&email) {
            return Err(RegistrationError::InvalidEmail);
        }
        if let Some(message) = credentials::password_error_message(&password) {
            return Err(RegistrationError::InvalidPassword(message));
        }

        let tenant_id = self.resolve_tenant().await?;

        let user = tenant_context::with_tenant(tenant_id.as_str(), || self.create_user(email, name, password)).await??;

        info!(user_id = %user.id, tenant_id = %user.tenant_id, "User registered");
        Ok(user)
    }
}

impl RegisteredUser {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: string_field(record, "id").unwrap_or_default(),
            email: string_field(record, "email").unwrap_or_default(),
            name: string_field(record, "name").unwrap_or_default(),
            tenant_id: string_field(record, "tenant_id").unwrap_or_default(),
            role: string_field(record, "role").unwrap_or_default(),
            created_at: record.get("created_at").cloned().unwrap_or(Value::Null),
        }
    }
}

fn string_field(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityPolicyTable;
    use crate::infrastructure::audit::InMemoryAccessAuditSink;
    use crate::infrastructure::repositories::InMemoryDataStore;
    use serde_json::json;

    struct PlainHasher;

    impl CredentialHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String, CredentialError> {
            Ok(format!("plain:{password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool, CredentialError> {
            Ok(hash == format!("plain:{password}"))
        }
    }

    async fn setup(with_tenant: bool) -> (StandardRegisterUserUseCase, Arc<InMemoryDataStore>) {
        let driver = Arc::new(InMemoryDataStore::new());
        let store = TenantScopedStore::new(
            driver.clone(),
            Arc::new(EntityPolicyTable::default()),
            Arc::new(InMemoryAccessAuditSink::new()),
        );
        if with_tenant {
            let tenant = json!({"id": "tenant-a", "slug": "default", "name": "Default"});
            store
                .entity("Tenant")
                .create(tenant.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        let use_case = StandardRegisterUserUseCase::new(store, Arc::new(PlainHasher), RegistrationSettings::default());
        (use_case, driver)
    }

    fn request(email: &str, password: &str, name: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            name: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_creates_user_in_default_tenant() {
        let (use_case, driver) = setup(true).await;

        let user = tenant_context::scope(use_case.register(request("Ada@Example.com", "Passw0rd!", "Ada")))
            .await
            .unwrap();

        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.tenant_id, "tenant-a");
        assert_eq!(user.role, "recruiter");

        let rows = driver.rows("users");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["password_hash"], json!("plain:Passw0rd!"));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let (use_case, _) = setup(true).await;
        tenant_context::scope(use_case.register(request("a@x.com", "Passw0rd!", "A")))
            .await
            .unwrap();

        let second = tenant_context::scope(use_case.register(request("A@X.com", "Passw0rd!", "B"))).await;
        assert!(matches!(second, Err(RegistrationError::UserExists)));
    }

    #[tokio::test]
    async fn test_validation_failures() {
        let (use_case, _) = setup(true).await;

        let missing = use_case.register(request("a@x.com", "", "A")).await;
        assert!(matches!(missing, Err(RegistrationError::MissingFields)));

        let email = use_case.register(request("not-an-email", "Passw0rd!", "A")).await;
        assert!(matches!(email, Err(RegistrationError::InvalidEmail)));

        match use_case.register(request("a@x.com", "short", "A")).await {
            Err(RegistrationError::InvalidPassword(message)) => {
                assert!(message.contains("at least 8 characters"));
                assert!(message.contains("uppercase"));
            }
            other => panic!("expected InvalidPassword, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_default_tenant() {
        let (use_case, _) = setup(false).await;
        let result = tenant_context::scope(use_case.register(request("a@x.com", "Passw0rd!", "A"))).await;
        assert!(matches!(result, Err(RegistrationError::TenantNotFound(slug)) if slug == "default"));
    }
}
