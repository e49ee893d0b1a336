// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Boundary Guard
//!
//! Axum middleware that binds the verified identity of every request to its
//! task tree before any handler runs.
//!
//! - public paths run in an empty context scope
//! - protected `/api/*` paths: 401 without a verified identity, 403 without a
//!   tenant, otherwise the handler runs under [`tenant_context::run_with`]
//! - protected pages redirect to the login page instead
//!
//! The tenant comes from the verified identity only. An `X-Tenant-ID` request
//! header is honoured solely for `SYSTEM_ADMIN`.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::info;
use url::form_urlencoded;

use crate::domain::auth::{AuthError, IdentityVerifier, VerifiedIdentity};
use crate::domain::identity::Identity;
use crate::domain::tenant_context;
use crate::presentation::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";

const PROTECTED_PAGE_PREFIXES: [&str; 2] = ["/recruiter", "/candidate"];

#[derive(Clone)]
pub struct BoundaryGuardState {
    pub verifier: Arc<dyn IdentityVerifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    ProtectedApi,
    ProtectedPage,
    /// Neither listed as public nor protected.
    Open,
}

pub fn classify(path: &str) -> RouteClass {
    let under = |prefix: &str| path == prefix || path.starts_with(&format!("{prefix}/"));

    if path == "/" || path.starts_with("/login") || under("/api/auth") || under("/api/health") {
        RouteClass::Public
    } else if under("/api") {
        RouteClass::ProtectedApi
    } else if PROTECTED_PAGE_PREFIXES.iter().any(|p| under(p)) {
        RouteClass::ProtectedPage
    } else {
        RouteClass::Open
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn verify(verifier: &dyn IdentityVerifier, headers: &HeaderMap) -> Result<VerifiedIdentity, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
    verifier.verify(token)
}

fn login_redirect(path: &str, tenant_missing: bool) -> Response {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("callbackUrl", path);
    if tenant_missing {
        query.append_pair("error", "tenant_context_missing");
    }
    Redirect::temporary(&format!("/login?{}", query.finish())).into_response()
}

fn log_access(path: &str, tenant_id: Option<&str>, user_id: Option<&str>, error: Option<&str>) {
    info!(
        target: "tenantry::access",
        path,
        tenant_id = tenant_id.unwrap_or("-"),
        user_id = user_id.unwrap_or("-"),
        success = error.is_none(),
        error = error.unwrap_or(""),
        "Tenant access"
    );
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: Option<&str>) {
    if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

pub async fn boundary_guard(
    State(state): State<BoundaryGuardState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let class = classify(&path);

    if matches!(class, RouteClass::Public | RouteClass::Open) {
        return tenant_context::scope(next.run(req)).await;
    }

    let verified = match verify(state.verifier.as_ref(), req.headers()) {
        Ok(verified) => verified,
        Err(e) => {
            log_access(&path, None, None, Some(&e.to_string()));
            return match class {
                RouteClass::ProtectedPage => login_redirect(&path, false),
                _ => ApiError::unauthorized().into_response(),
            };
        }
    };

    let requested_tenant = req.headers().get(TENANT_HEADER).and_then(|v| v.to_str().ok());
    let Some(tenant) = verified.effective_tenant(requested_tenant) else {
        log_access(&path, None, Some(&verified.user_id), Some("tenant context missing"));
        return match class {
            RouteClass::ProtectedPage => login_redirect(&path, true),
            _ => ApiError::tenant_context_missing().into_response(),
        };
    };

    let identity: Identity = verified.into_identity(tenant);
    log_access(&path, Some(identity.tenant_id.as_str()), identity.user_id.as_deref(), None);

    let tenant_id = identity.tenant_id.as_str().to_string();
    let user_id = identity.user_id.clone();
    let role = identity.role.clone();

    let mut response = tenant_context::run_with(identity, next.run(req)).await;

    let headers = response.headers_mut();
    set_header(headers, TENANT_HEADER, Some(&tenant_id));
    set_header(headers, USER_HEADER, user_id.as_deref());
    set_header(headers, ROLE_HEADER, role.as_deref());
    response
}
