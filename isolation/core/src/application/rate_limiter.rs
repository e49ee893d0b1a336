// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rate Limiter
//!
//! Fixed-window attempt counting per `(purpose, client identifier)`.
//!
//! The shared store (Redis) is tried first so limits hold across instances.
//! Any error from it is logged and the attempt is counted in the process-local
//! table instead. Should even the local table fail, the attempt is allowed:
//! the limiter never turns a backend problem into a failed request.

use std::sync::Arc;

use tracing::{error, warn};

use crate::domain::rate_limit::{counter_key, RateLimitDecision, RateLimitPolicy, RateLimitStore};
use crate::infrastructure::rate_limit_store::InMemoryRateLimitStore;

pub struct RateLimiter {
    shared: Option<Arc<dyn RateLimitStore>>,
    fallback: Arc<InMemoryRateLimitStore>,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(
        shared: Option<Arc<dyn RateLimitStore>>,
        fallback: Arc<InMemoryRateLimitStore>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            shared,
            fallback,
            key_prefix: key_prefix.into(),
        }
    }

    /// Limiter backed only by the process-local table.
    pub fn in_memory() -> Self {
        Self::new(None, Arc::new(InMemoryRateLimitStore::new()), "rate-limit")
    }

    /// Backend name of the shared store, if one is configured.
    pub fn shared_backend(&self) -> Option<&'static str> {
        self.shared.as_ref().map(|shared| shared.backend())
    }

    pub fn key_for(&self, purpose: &str, client_identifier: &str) -> String {
        counter_key(&self.key_prefix, purpose, client_identifier)
    }

    /// Record one attempt and decide whether it is allowed.
    pub async fn check(&self, policy: &RateLimitPolicy, client_identifier: &str) -> RateLimitDecision {
        let key = self.key_for(&policy.purpose, client_identifier);
        let window = policy.window();

        let mut backend = self.fallback.backend();
        let hit = match &self.shared {
            Some(shared) => match shared.hit(&key, window).await {
                Ok(hit) => {
                    backend = shared.backend();
                    Ok(hit)
                }
                Err(e) => {
                    warn!(
                        purpose = %policy.purpose,
                        backend = shared.backend(),
                        "Shared rate-limit store unavailable, falling back to in-memory store: {}",
                        e
                    );
                    self.fallback.hit(&key, window).await
                }
            },
            None => self.fallback.hit(&key, window).await,
        };

        let decision = match hit {
            Ok(hit) => RateLimitDecision::from_hit(policy.limit, hit),
            Err(e) => {
                error!(purpose = %policy.purpose, "Rate-limit fallback failed, allowing request: {}", e);
                backend = "none";
                RateLimitDecision {
                    allowed: true,
                    remaining: policy.limit,
                    retry_after_seconds: None,
                }
            }
        };

        metrics::counter!(
            "tenantry_rate_limit_checks_total",
            "purpose" => policy.purpose.clone(),
            "outcome" => if decision.allowed { "allowed" } else { "rejected" },
            "backend" => backend
        )
        .increment(1);

        if !decision.allowed {
            warn!(
                purpose = %policy.purpose,
                client = %client_identifier,
                retry_after = decision.retry_after_header(),
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Administrative reset of one `(purpose, client)` counter in every store.
    pub async fn reset(&self, purpose: &str, client_identifier: &str) {
        let key = self.key_for(purpose, client_identifier);
        if let Some(shared) = &self.shared {
            if let Err(e) = shared.reset(&key).await {
                warn!(key = %key, "Failed to reset shared rate-limit counter: {}", e);
            }
        }
        // The in-memory store never fails a reset.
        let _ = self.fallback.reset(&key).await;
    }

    /// Drop every process-local counter.
    pub fn reset_local(&self) {
        self.fallback.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rate_limit::{RateLimitStoreError, WindowHit};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct UnreachableStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateLimitStore for UnreachableStore {
        async fn hit(&self, _key: &str, _window: Duration) -> Result<WindowHit, RateLimitStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RateLimitStoreError::Unavailable("connection refused".to_string()))
        }

        async fn reset(&self, _key: &str) -> Result<(), RateLimitStoreError> {
            Err(RateLimitStoreError::Unavailable("connection refused".to_string()))
        }

        fn backend(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn test_unreachable_shared_store_falls_back() {
        let shared = Arc::new(UnreachableStore {
            calls: AtomicUsize::new(0),
        });
        let limiter = RateLimiter::new(
            Some(shared.clone()),
            Arc::new(InMemoryRateLimitStore::new()),
            "rate-limit",
        );
        let policy = RateLimitPolicy::new("register", 2, 60);

        assert!(limiter.check(&policy, "10.0.0.1").await.allowed);
        assert!(limiter.check(&policy, "10.0.0.1").await.allowed);
        let third = limiter.check(&policy, "10.0.0.1").await;
        assert!(!third.allowed);
        assert!(third.retry_after_seconds.unwrap() > 0);
        assert_eq!(shared.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reset_restores_allowance() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::new("login", 1, 60);

        assert!(limiter.check(&policy, "c").await.allowed);
        assert!(!limiter.check(&policy, "c").await.allowed);

        limiter.reset("login", "c").await;
        assert!(limiter.check(&policy, "c").await.allowed);
    }

    #[tokio::test]
    async fn test_purposes_and_clients_are_independent() {
        let limiter = RateLimiter::in_memory();
        let register = RateLimitPolicy::new("register", 1, 60);
        let login = RateLimitPolicy::new("login", 1, 60);

        assert!(limiter.check(&register, "a").await.allowed);
        assert!(limiter.check(&login, "a").await.allowed);
        assert!(limiter.check(&register, "b").await.allowed);
        assert!(!limiter.check(&register, "a").await.allowed);
    }
}
