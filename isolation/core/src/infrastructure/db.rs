// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant-Aware PostgreSQL Connection Pool
//!
//! `sqlx::PgPool` does not expose a stable per-physical-connection slot, and
//! the Connection-Level Enforcer needs exactly that: each connection carries
//! its own [`ConnectionSessionState`]. This pool owns `PgConnection`s
//! directly:
//!
//! - size bounded by a semaphore, acquisition bounded by a timeout
//! - new connections are prepared once (restricted role) before first use
//! - idle connections are reused LIFO together with their session cache
//! - a connection whose session sync failed is poisoned and never reused
//!
//! Every query must go through [`TenantConnection::synced`], which re-reads the
//! task's identity and resyncs the session variables first.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::config::DatabaseConfig;
use crate::domain::entity::EntityPolicyTable;
use crate::domain::repository::RepositoryError;
use crate::domain::tenant_context;
use crate::infrastructure::session_enforcer::{ConnectionSessionState, DeclaredSession, SessionEnforcer};

struct PooledConnection {
    conn: PgConnection,
    state: ConnectionSessionState,
}

struct PoolInner {
    options: PgConnectOptions,
    enforcer: SessionEnforcer,
    idle: Mutex<Vec<PooledConnection>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct TenantPool {
    inner: Arc<PoolInner>,
}

impl TenantPool {
    /// Build the pool without opening any connection.
    pub fn new(
        options: PgConnectOptions,
        enforcer: SessionEnforcer,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                options,
                enforcer,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(max_connections.max(1) as usize)),
                acquire_timeout,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Build the pool from configuration and run the role/policy bootstrap.
    ///
    /// Bootstrap failure is fatal only when `bootstrap_required` is set.
    pub async fn connect(config: &DatabaseConfig, policies: &EntityPolicyTable) -> anyhow::Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)?;
        let enforcer = SessionEnforcer::new(
            options.clone(),
            &config.enforced_role,
            policies,
            config.bootstrap_required,
        )?;
        let pool = Self::new(
            options,
            enforcer,
            config.max_connections,
            Duration::from_secs(config.acquire_timeout_secs),
        );

        match pool.inner.enforcer.ensure_bootstrapped().await {
            Ok(()) => info!(role = %config.enforced_role, "Row-level security enforcement ready"),
            Err(e) if config.bootstrap_required => return Err(e.into()),
            Err(e) => warn!("Starting with application-level tenant scoping only: {}", e),
        }

        Ok(pool)
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Check out one physical connection.
    pub async fn acquire(&self) -> Result<TenantConnection, RepositoryError> {
        if self.is_closed() {
            return Err(RepositoryError::Pool("pool is closed".to_string()));
        }

        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            RepositoryError::Pool(format!(
                "timed out after {:?} waiting for a connection",
                self.inner.acquire_timeout
            ))
        })?
        .map_err(|_| RepositoryError::Pool("pool is closed".to_string()))?;

        let reused = self.inner.idle.lock().pop();
        let pooled = match reused {
            Some(pooled) => pooled,
            None => self.open().await?,
        };

        Ok(TenantConnection {
            pooled: Some(pooled),
            pool: self.inner.clone(),
            poisoned: false,
            _permit: permit,
        })
    }

    async fn open(&self) -> Result<PooledConnection, RepositoryError> {
        let mut conn = PgConnection::connect_with(&self.inner.options).await?;
        let mut state = ConnectionSessionState::default();
        self.inner
            .enforcer
            .prepare(&mut conn, &mut state)
            .await
            .map_err(|e| RepositoryError::Pool(e.to_string()))?;
        debug!(restricted = state.restricted, "Opened database connection");
        Ok(PooledConnection { conn, state })
    }

    /// Refuse new checkouts and close every idle connection.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.permits.close();

        let idle: Vec<PooledConnection> = std::mem::take(&mut *self.inner.idle.lock());
        for pooled in idle {
            if let Err(e) = pooled.conn.close().await {
                debug!("Error closing pooled connection: {}", e);
            }
        }
        info!("Database pool closed");
    }
}

/// A checked-out connection. Returned to the pool on drop unless poisoned.
pub struct TenantConnection {
    pooled: Option<PooledConnection>,
    pool: Arc<PoolInner>,
    poisoned: bool,
    _permit: OwnedSemaphorePermit,
}

impl TenantConnection {
    /// Sync session variables with the current task's identity and hand out
    /// the connection for exactly one round of queries.
    pub async fn synced(&mut self) -> Result<&mut PgConnection, RepositoryError> {
        if self.poisoned {
            return Err(RepositoryError::SessionSync("connection is poisoned".to_string()));
        }
        let pooled = self
            .pooled
            .as_mut()
            .ok_or_else(|| RepositoryError::Pool("connection already released".to_string()))?;

        let declared = DeclaredSession::from_context(&tenant_context::get());
        if let Err(e) = self
            .pool
            .enforcer
            .sync(&mut pooled.conn, &mut pooled.state, &declared)
            .await
        {
            warn!("Session sync failed, discarding connection: {}", e);
            self.poisoned = true;
            return Err(e);
        }

        Ok(&mut pooled.conn)
    }
}

impl Drop for TenantConnection {
    fn drop(&mut self) {
        let Some(pooled) = self.pooled.take() else {
            return;
        };
        if self.poisoned || self.pool.closed.load(Ordering::Acquire) {
            // Dropping a PgConnection closes the socket without a goodbye.
            return;
        }
        self.pool.idle.lock().push(pooled);
    }
}
