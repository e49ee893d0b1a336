// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fixed-Window Rate Limiting
//!
//! Counters are keyed by `(purpose, client identifier)`. A counter entry lives
//! for one window: while `now < window_expires_at` every attempt increments it,
//! and the first attempt after expiry starts a fresh window with count 1.
//!
//! Stores only count; turning a [`WindowHit`] into an allow/deny
//! [`RateLimitDecision`] is a pure function of the limit.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Bucket shared by every client that cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Retry hint used when a store cannot report the remaining window.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Limit applied to one guarded endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub purpose: String,
    pub limit: u32,
    pub window_seconds: u64,
}

impl RateLimitPolicy {
    pub fn new(purpose: &str, limit: u32, window_seconds: u64) -> Self {
        Self {
            purpose: purpose.to_string(),
            limit,
            window_seconds,
        }
    }

    /// Five registrations per client per hour.
    pub fn registration() -> Self {
        Self::new("register", 5, 60 * 60)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl RateLimitDecision {
    pub fn from_hit(limit: u32, hit: WindowHit) -> Self {
        if hit.count > u64::from(limit) {
            let remaining_ms = hit.expires_in.as_millis() as u64;
            let retry_after = remaining_ms.div_ceil(1000).max(1);
            return Self {
                allowed: false,
                remaining: 0,
                retry_after_seconds: Some(retry_after),
            };
        }

        Self {
            allowed: true,
            remaining: limit.saturating_sub(hit.count as u32),
            retry_after_seconds: None,
        }
    }

    /// Seconds to advertise in `Retry-After`.
    pub fn retry_after_header(&self) -> u64 {
        self.retry_after_seconds.unwrap_or(DEFAULT_RETRY_AFTER_SECS)
    }
}

/// Counter state after one attempt was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Attempts in the current window, including this one.
    pub count: u64,
    /// Time left until the current window expires.
    pub expires_in: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitStoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Counter store timed out after {0:?}")]
    Timeout(Duration),
}

/// Backing counter table.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically record one attempt for `key` inside a window of `window`.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, RateLimitStoreError>;

    /// Administrative reset of a single key.
    async fn reset(&self, key: &str) -> Result<(), RateLimitStoreError>;

    /// Backend label used in logs and metrics.
    fn backend(&self) -> &'static str;
}

/// Counter key for a `(purpose, client)` pair.
pub fn counter_key(prefix: &str, purpose: &str, client_identifier: &str) -> String {
    format!("{}:{}:{}", prefix, purpose, client_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(count: u64, secs: u64) -> WindowHit {
        WindowHit {
            count,
            expires_in: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_first_hit_leaves_limit_minus_one() {
        let decision = RateLimitDecision::from_hit(5, hit(1, 3600));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.retry_after_seconds, None);
    }

    #[test]
    fn test_hit_at_limit_is_still_allowed() {
        let decision = RateLimitDecision::from_hit(5, hit(5, 10));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_hit_over_limit_is_rejected_with_retry_hint() {
        let decision = RateLimitDecision::from_hit(5, hit(6, 1800));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after_seconds, Some(1800));
    }

    #[test]
    fn test_retry_hint_is_at_least_one_second() {
        let decision = RateLimitDecision::from_hit(
            1,
            WindowHit {
                count: 2,
                expires_in: Duration::from_millis(0),
            },
        );
        assert_eq!(decision.retry_after_seconds, Some(1));

        let decision = RateLimitDecision::from_hit(
            1,
            WindowHit {
                count: 2,
                expires_in: Duration::from_millis(1200),
            },
        );
        assert_eq!(decision.retry_after_seconds, Some(2));
    }

    #[test]
    fn test_counter_key_format() {
        assert_eq!(counter_key("rate-limit", "register", "10.0.0.1"), "rate-limit:register:10.0.0.1");
    }
}
