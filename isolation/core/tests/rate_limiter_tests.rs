// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tenantry_core::application::rate_limiter::RateLimiter;
use tenantry_core::domain::rate_limit::{RateLimitPolicy, RateLimitStore, RateLimitStoreError, WindowHit};
use tenantry_core::infrastructure::rate_limit_store::InMemoryRateLimitStore;

#[tokio::test(start_paused = true)]
async fn test_fixed_window_allows_five_then_rejects_then_resets() {
    let limiter = RateLimiter::in_memory();
    let policy = RateLimitPolicy::new("register", 5, 3600);

    for attempt in 1..=5u32 {
        let decision = limiter.check(&policy, "203.0.113.9").await;
        assert!(decision.allowed, "attempt {attempt} should be allowed");
        assert_eq!(decision.remaining, 5 - attempt);
    }

    let sixth = limiter.check(&policy, "203.0.113.9").await;
    assert!(!sixth.allowed);
    assert_eq!(sixth.retry_after_seconds, Some(3600));

    tokio::time::advance(Duration::from_secs(1800)).await;
    let still_blocked = limiter.check(&policy, "203.0.113.9").await;
    assert!(!still_blocked.allowed);
    assert_eq!(still_blocked.retry_after_seconds, Some(1800));

    tokio::time::advance(Duration::from_secs(1800)).await;
    let fresh = limiter.check(&policy, "203.0.113.9").await;
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 4);
}

#[tokio::test(start_paused = true)]
async fn test_clients_and_purposes_have_separate_windows() {
    let limiter = RateLimiter::in_memory();
    let register = RateLimitPolicy::new("register", 1, 60);
    let login = RateLimitPolicy::new("login", 1, 60);

    assert!(limiter.check(&register, "a").await.allowed);
    assert!(!limiter.check(&register, "a").await.allowed);
    assert!(limiter.check(&register, "b").await.allowed);
    assert!(limiter.check(&login, "a").await.allowed);
}

#[tokio::test]
async fn test_reset_clears_a_single_counter() {
    let limiter = RateLimiter::in_memory();
    let policy = RateLimitPolicy::new("register", 1, 60);

    limiter.check(&policy, "a").await;
    limiter.check(&policy, "b").await;
    limiter.reset("register", "a").await;

    assert!(limiter.check(&policy, "a").await.allowed);
    assert!(!limiter.check(&policy, "b").await.allowed);
}

struct DownStore;

#[async_trait]
impl RateLimitStore for DownStore {
    async fn hit(&self, _key: &str, window: Duration) -> Result<WindowHit, RateLimitStoreError> {
        Err(RateLimitStoreError::Timeout(window))
    }

    async fn reset(&self, _key: &str) -> Result<(), RateLimitStoreError> {
        Err(RateLimitStoreError::Unavailable("down".to_string()))
    }

    fn backend(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn test_unreachable_shared_store_still_limits_via_fallback() {
    let limiter = RateLimiter::new(
        Some(Arc::new(DownStore)),
        Arc::new(InMemoryRateLimitStore::new()),
        "rate-limit",
    );
    let policy = RateLimitPolicy::new("register", 2, 60);

    assert!(limiter.check(&policy, "a").await.allowed);
    assert!(limiter.check(&policy, "a").await.allowed);
    let third = limiter.check(&policy, "a").await;
    assert!(!third.allowed);
    assert!(third.retry_after_seconds.unwrap() > 0);

    // A failing shared reset is logged, not raised.
    limiter.reset("register", "a").await;
    assert!(limiter.check(&policy, "a").await.allowed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_admit_exactly_the_limit() {
    let limiter = Arc::new(RateLimiter::in_memory());
    let policy = Arc::new(RateLimitPolicy::new("register", 5, 3600));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let limiter = limiter.clone();
            let policy = policy.clone();
            tokio::spawn(async move { limiter.check(&policy, "burst").await.allowed })
        })
        .collect();

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5);
}

/// Shared store that is down until `up` is set.
struct RecoveringStore {
    up: AtomicBool,
    counters: InMemoryRateLimitStore,
}

#[async_trait]
impl RateLimitStore for RecoveringStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitStoreError> {
        if !self.up.load(Ordering::SeqCst) {
            return Err(RateLimitStoreError::Unavailable("connection refused".to_string()));
        }
        self.counters.hit(key, window).await
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitStoreError> {
        self.counters.reset(key).await
    }

    fn backend(&self) -> &'static str {
        "recovering"
    }
}

#[tokio::test]
async fn test_shared_store_is_used_again_once_it_recovers() {
    let shared = Arc::new(RecoveringStore {
        up: AtomicBool::new(false),
        counters: InMemoryRateLimitStore::new(),
    });
    let fallback = Arc::new(InMemoryRateLimitStore::new());
    let limiter = RateLimiter::new(Some(shared.clone()), fallback.clone(), "rate-limit");
    let policy = RateLimitPolicy::new("register", 2, 60);

    // Outage: the attempt lands in the process-local table.
    assert!(limiter.check(&policy, "a").await.allowed);
    assert_eq!(fallback.hit_now("rate-limit:register:a", policy.window()).count, 2);

    shared.up.store(true, Ordering::SeqCst);
    assert!(limiter.check(&policy, "a").await.allowed);
    assert!(limiter.check(&policy, "a").await.allowed);
    assert!(!limiter.check(&policy, "a").await.allowed);
    assert_eq!(shared.counters.hit_now("rate-limit:register:a", policy.window()).count, 4);
}

#[tokio::test]
async fn test_reset_local_clears_every_in_memory_counter() {
    let limiter = RateLimiter::in_memory();
    let register = RateLimitPolicy::new("register", 1, 60);
    let login = RateLimitPolicy::new("login", 1, 60);

    limiter.check(&register, "a").await;
    limiter.check(&login, "b").await;
    assert!(!limiter.check(&register, "a").await.allowed);

    limiter.reset_local();
    assert!(limiter.check(&register, "a").await.allowed);
    assert!(limiter.check(&login, "b").await.allowed);
}
