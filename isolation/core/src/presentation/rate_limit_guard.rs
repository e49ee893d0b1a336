// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Rate-limit guard for individual endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::application::rate_limiter::RateLimiter;
use crate::domain::rate_limit::{RateLimitDecision, RateLimitPolicy, UNKNOWN_CLIENT};
use crate::presentation::error::ApiError;

/// Who an attempt is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentifier(pub String);

/// Connection address, then the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the shared `"unknown"` bucket.
pub fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(addr) = peer {
        return addr.ip().to_string();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    header("x-real-ip")
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIdentifier {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_identifier(&parts.headers, peer)))
    }
}

/// Count one attempt; `Err` is the ready-made 429 response.
pub async fn guard(
    limiter: &RateLimiter,
    policy: &RateLimitPolicy,
    client: &ClientIdentifier,
) -> Result<RateLimitDecision, ApiError> {
    let decision = limiter.check(policy, &client.0).await;
    if decision.allowed {
        Ok(decision)
    } else {
        Err(ApiError::rate_limited(decision.retry_after_header()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_peer_address_wins() {
        let peer: SocketAddr = "10.0.0.7:5123".parse().unwrap();
        let map = headers(&[("x-forwarded-for", "1.2.3.4")]);
        assert_eq!(client_identifier(&map, Some(peer)), "10.0.0.7");
    }

    #[test]
    fn test_forwarded_for_first_entry_then_real_ip() {
        let map = headers(&[("x-forwarded-for", " 1.2.3.4 , 5.6.7.8"), ("x-real-ip", "9.9.9.9")]);
        assert_eq!(client_identifier(&map, None), "1.2.3.4");

        let map = headers(&[("x-real-ip", "9.9.9.9")]);
        assert_eq!(client_identifier(&map, None), "9.9.9.9");
    }

    #[test]
    fn test_unidentifiable_clients_share_a_bucket() {
        assert_eq!(client_identifier(&HeaderMap::new(), None), UNKNOWN_CLIENT);
        let map = headers(&[("x-forwarded-for", "")]);
        assert_eq!(client_identifier(&map, None), UNKNOWN_CLIENT);
    }

    #[tokio::test]
    async fn test_guard_rejects_over_limit() {
        let limiter = RateLimiter::in_memory();
        let policy = RateLimitPolicy::new("login", 1, 60);
        let client = ClientIdentifier("1.2.3.4".to_string());

        assert!(guard(&limiter, &policy, &client).await.is_ok());
        let rejected = guard(&limiter, &policy, &client).await.unwrap_err();
        assert_eq!(rejected.code, "RATE_LIMITED");
        assert!(rejected.retry_after_seconds.unwrap() > 0);
    }
}
