// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Picks the concrete [`DataStore`] driver for the configured storage backend.
//! The domain layer only sees the trait.

use std::sync::Arc;

use crate::domain::repository::{DataStore, RepositoryError, StorageBackend};
use crate::infrastructure::db::TenantPool;
use crate::infrastructure::repositories::{InMemoryDataStore, PostgresDataStore};

/// Creates the data-store driver for `backend`.
///
/// The PostgreSQL backend requires a pool; every statement it runs passes the
/// Connection-Level Enforcer.
pub fn create_data_store(
    backend: &StorageBackend,
    pool: Option<TenantPool>,
) -> Result<Arc<dyn DataStore>, RepositoryError> {
    match backend {
        StorageBackend::InMemory => Ok(Arc::new(InMemoryDataStore::new())),
        StorageBackend::PostgreSQL(_) => {
            let pool = pool.ok_or_else(|| {
                RepositoryError::Pool("PostgreSQL backend selected but no pool was provided".to_string())
            })?;
            Ok(Arc::new(PostgresDataStore::new(pool)))
        }
    }
}
