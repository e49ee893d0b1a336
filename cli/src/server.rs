// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP server: builds the service graph from configuration and serves the
//! API until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use tenantry_core::application::access_interceptor::TenantScopedStore;
use tenantry_core::application::rate_limiter::RateLimiter;
use tenantry_core::application::registration::{RegistrationSettings, StandardRegisterUserUseCase};
use tenantry_core::application::repository_factory::create_data_store;
use tenantry_core::domain::config::{IsolationConfig, RateLimitConfig};
use tenantry_core::domain::entity::EntityPolicyTable;
use tenantry_core::domain::rate_limit::{RateLimitPolicy, RateLimitStore};
use tenantry_core::domain::repository::StorageBackend;
use tenantry_core::infrastructure::audit::TracingAccessAuditSink;
use tenantry_core::infrastructure::credentials::Argon2CredentialHasher;
use tenantry_core::infrastructure::db::TenantPool;
use tenantry_core::infrastructure::identity_verifier::JwtIdentityVerifier;
use tenantry_core::infrastructure::rate_limit_store::{InMemoryRateLimitStore, RedisRateLimitStore};
use tenantry_core::presentation::api::{app, AppState};

/// Shared store when configured, reachable or not; the in-memory table always.
pub async fn build_rate_limiter(config: &RateLimitConfig) -> RateLimiter {
    let fallback = Arc::new(InMemoryRateLimitStore::new());

    let shared: Option<Arc<dyn RateLimitStore>> = match (&config.redis_url, config.force_in_memory) {
        (_, true) => {
            info!("Rate limiter forced to in-memory counters");
            None
        }
        (None, false) => {
            info!("No shared rate-limit store configured, using in-memory counters");
            None
        }
        (Some(url), false) => {
            let timeout = Duration::from_millis(config.connect_timeout_ms);
            match RedisRateLimitStore::new(url, timeout) {
                Ok(store) => {
                    if let Err(e) = store.ensure_connected().await {
                        warn!(
                            "Shared rate-limit store unreachable, counting in memory until it recovers: {}",
                            e
                        );
                    }
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!("Invalid shared rate-limit store URL, using in-memory counters: {}", e);
                    None
                }
            }
        }
    };

    RateLimiter::new(shared, fallback, config.key_prefix.clone())
}

pub async fn serve(config: IsolationConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    if config.observability.metrics.enabled {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics.port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }

    let policies = Arc::new(EntityPolicyTable::default());
    let backend = config.database.storage_backend();
    let pool = match backend {
        StorageBackend::PostgreSQL(_) => Some(
            TenantPool::connect(&config.database, &policies)
                .await
                .context("Failed to initialize database pool")?,
        ),
        StorageBackend::InMemory => {
            warn!("Using in-memory storage; data is lost on shutdown");
            None
        }
    };

    let driver = create_data_store(&backend, pool.clone()).context("Failed to create data store")?;
    let store = TenantScopedStore::new(driver, policies, Arc::new(TracingAccessAuditSink));

    let registration = Arc::new(StandardRegisterUserUseCase::new(
        store.clone(),
        Arc::new(Argon2CredentialHasher::new()),
        RegistrationSettings {
            default_tenant_slug: config.registration.default_tenant_slug.clone(),
            default_role: config.registration.default_role.clone(),
        },
    ));

    let verifier = Arc::new(
        JwtIdentityVerifier::new(&config.auth.jwt_secret, config.auth.issuer.as_deref())
            .context("Failed to initialize identity verifier")?,
    );

    let rate_limiter = Arc::new(build_rate_limiter(&config.rate_limit).await);
    info!(
        shared_store = rate_limiter.shared_backend().unwrap_or("none"),
        "Rate limiter ready"
    );

    let state = Arc::new(AppState {
        store,
        registration,
        rate_limiter,
        registration_limit: RateLimitPolicy::new(
            "register",
            config.registration.limit,
            config.registration.window_seconds,
        ),
        started_at: Instant::now(),
    });

    let router = app(state, verifier);

    let addr = format!("{}:{}", config.network.bind_address, config.network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Tenantry listening on {}", addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    info!("Tenantry shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forced_in_memory_limiter_never_dials_redis() {
        let config = RateLimitConfig {
            redis_url: Some("redis://127.0.0.1:1".to_string()),
            force_in_memory: true,
            ..RateLimitConfig::default()
        };
        let limiter = build_rate_limiter(&config).await;
        assert_eq!(limiter.shared_backend(), None);
        let decision = limiter.check(&RateLimitPolicy::new("register", 1, 60), "c").await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_unreachable_redis_degrades_to_memory() {
        let config = RateLimitConfig {
            redis_url: Some("redis://127.0.0.1:1".to_string()),
            connect_timeout_ms: 300,
            ..RateLimitConfig::default()
        };
        let limiter = build_rate_limiter(&config).await;
        assert_eq!(limiter.shared_backend(), Some("redis"));

        let policy = RateLimitPolicy::new("register", 1, 60);
        assert!(limiter.check(&policy, "c").await.allowed);
        assert!(!limiter.check(&policy, "c").await.allowed);
    }
}
