// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Counter stores for the fixed-window rate limiter.
//!
//! - [`InMemoryRateLimitStore`]: process-local `DashMap`; increments on one key
//!   are serialized by the shard lock held through the entry guard.
//! - [`RedisRateLimitStore`]: shared across instances; `INCR` + `TTL` in one
//!   atomic pipeline, `EXPIRE` on the first hit of a window. Connects lazily
//!   and keeps retrying, so an outage at startup is not permanent.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::info;

use crate::domain::rate_limit::{RateLimitStore, RateLimitStoreError, WindowHit};

#[derive(Debug, Clone, Copy)]
struct RateCounterEntry {
    count: u64,
    window_expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryRateLimitStore {
    counters: DashMap<String, RateCounterEntry>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt. Never fails.
    pub fn hit_now(&self, key: &str, window: Duration) -> WindowHit {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(RateCounterEntry {
                count: 0,
                window_expires_at: now + window,
            });

        if now >= entry.window_expires_at {
            *entry = RateCounterEntry {
                count: 0,
                window_expires_at: now + window,
            };
        }
        entry.count += 1;

        WindowHit {
            count: entry.count,
            expires_in: entry.window_expires_at.saturating_duration_since(now),
        }
    }

    pub fn clear(&self) {
        self.counters.clear();
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitStoreError> {
        Ok(self.hit_now(key, window))
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitStoreError> {
        self.counters.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

fn unavailable(context: &str, err: redis::RedisError) -> RateLimitStoreError {
    RateLimitStoreError::Unavailable(format!("redis {context}: {err}"))
}

pub struct RedisRateLimitStore {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisRateLimitStore {
    /// Parse `url` without dialing. The connection is opened on first use and
    /// every later command retries it until one attempt succeeds. `timeout`
    /// bounds the connect and each command.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RateLimitStoreError> {
        let client = redis::Client::open(url).map_err(|e| unavailable("client", e))?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
            timeout,
        })
    }

    /// Open the connection now instead of on the first command.
    pub async fn ensure_connected(&self) -> Result<(), RateLimitStoreError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<ConnectionManager, RateLimitStoreError> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let manager = tokio::time::timeout(self.timeout, ConnectionManager::new(self.client.clone()))
                    .await
                    .map_err(|_| RateLimitStoreError::Timeout(self.timeout))?
                    .map_err(|e| unavailable("connect", e))?;
                info!("Connected to shared rate-limit store");
                Ok::<_, RateLimitStoreError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }

    async fn hit_inner(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitStoreError> {
        let mut conn = self.connection().await?;
        let window_secs = window.as_secs().max(1) as i64;

        let (count, ttl): (u64, i64) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .ttl(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("incr", e))?;

        // -1: key exists without expiry; -2: key vanished between commands.
        let ttl = if count == 1 || ttl < 0 {
            conn.expire::<_, ()>(key, window_secs)
                .await
                .map_err(|e| unavailable("expire", e))?;
            window_secs
        } else {
            ttl
        };

        Ok(WindowHit {
            count,
            expires_in: Duration::from_secs(ttl as u64),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitStoreError> {
        tokio::time::timeout(self.timeout, self.hit_inner(key, window))
            .await
            .map_err(|_| RateLimitStoreError::Timeout(self.timeout))?
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitStoreError> {
        let mut conn = self.connection().await?;
        tokio::time::timeout(self.timeout, conn.del::<_, ()>(key))
            .await
            .map_err(|_| RateLimitStoreError::Timeout(self.timeout))?
            .map_err(|e| unavailable("del", e))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry_starts_fresh_count() {
        let store = InMemoryRateLimitStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.hit_now("k", window).count, 1);
        assert_eq!(store.hit_now("k", window).count, 2);

        tokio::time::advance(Duration::from_secs(30)).await;
        let hit = store.hit_now("k", window);
        assert_eq!(hit.count, 3);
        assert_eq!(hit.expires_in, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        let hit = store.hit_now("k", window);
        assert_eq!(hit.count, 1);
        assert_eq!(hit.expires_in, window);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryRateLimitStore::new());
        let window = Duration::from_secs(3600);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        store.hit("shared", window).await.unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.hit_now("shared", window).count, 64 * 50 + 1);
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_retried_on_every_hit() {
        let store = RedisRateLimitStore::new("redis://127.0.0.1:1", Duration::from_millis(300)).unwrap();
        assert!(store.ensure_connected().await.is_err());
        assert!(store.hit("k", Duration::from_secs(60)).await.is_err());
        assert!(store.hit("k", Duration::from_secs(60)).await.is_err());
        assert!(!store.manager.initialized());
    }

    #[test]
    fn test_invalid_redis_url_is_rejected_up_front() {
        assert!(RedisRateLimitStore::new("not a url", Duration::from_millis(300)).is_err());
    }
}
