// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interface
//!
//! Persistence contract for every data-store driver. Drivers know nothing
//! about tenants: they execute exactly the [`DataOperation`] they are handed.
//! All scoping happens one layer up, in
//! [`crate::application::access_interceptor::TenantScopedStore`], which is
//! the only component allowed to call a driver.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | `InMemoryDataStore` | process-local maps (development, tests) |
//! | `PostgresDataStore` | PostgreSQL through the tenant-aware connection pool |

use async_trait::async_trait;

use crate::domain::entity::EntityPolicy;
use crate::domain::query::{DataOperation, OperationOutcome};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// True for `[A-Za-z_][A-Za-z0-9_]*`, the only names drivers will quote into SQL.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Underlying data-store driver.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Execute `operation` against the table described by `target`.
    async fn execute(
        &self,
        target: &EntityPolicy,
        operation: DataOperation,
    ) -> Result<OperationOutcome, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Session sync failed: {0}")]
    SessionSync(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Unexpected outcome for {0}")]
    UnexpectedOutcome(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepositoryError::Pool(err.to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
