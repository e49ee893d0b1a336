// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::application::access_interceptor::TenantScopedStore;
use crate::application::rate_limiter::RateLimiter;
use crate::application::registration::{RegisterUserRequest, RegisterUserUseCase};
use crate::domain::auth::IdentityVerifier;
use crate::domain::query::{Filter, Record};
use crate::domain::rate_limit::RateLimitPolicy;
use crate::domain::tenant_context;
use crate::presentation::boundary_guard::{boundary_guard, BoundaryGuardState};
use crate::presentation::error::ApiError;
use crate::presentation::rate_limit_guard::{self, ClientIdentifier};

/// Columns never returned to clients.
const HIDDEN_USER_FIELDS: [&str; 1] = ["password_hash"];

pub struct AppState {
    pub store: TenantScopedStore,
    pub registration: Arc<dyn RegisterUserUseCase>,
    pub rate_limiter: Arc<RateLimiter>,
    pub registration_limit: RateLimitPolicy,
    pub started_at: Instant,
}

pub fn app(state: Arc<AppState>, verifier: Arc<dyn IdentityVerifier>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(register))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", get(get_user))
        .route("/api/session/tenant", get(session_tenant))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            BoundaryGuardState { verifier },
            boundary_guard,
        ))
}

/// Routed so the Boundary Guard also covers unknown paths.
async fn fallback() -> ApiError {
    ApiError::not_found("Route")
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientIdentifier,
    Json(request): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    rate_limit_guard::guard(&state.rate_limiter, &state.registration_limit, &client).await?;

    let user = state.registration.register(request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": { "user": user } }))))
}

fn public_user(mut record: Record) -> Value {
    for field in HIDDEN_USER_FIELDS {
        record.remove(field);
    }
    Value::Object(record)
}

async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let users = state.store.entity("User").find_many(None).await?;
    let users: Vec<Value> = users.into_iter().map(public_user).collect();
    Ok(Json(json!({ "data": { "users": users } })))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .store
        .entity("User")
        .find_unique(Filter::eq("id", id))
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(json!({ "data": { "user": public_user(user) } })))
}

async fn session_tenant() -> Result<Json<Value>, ApiError> {
    let context = tenant_context::get();
    let identity = context.identity().ok_or_else(ApiError::tenant_context_missing)?;
    Ok(Json(json!({
        "data": {
            "tenant_id": identity.tenant_id,
            "user_id": identity.user_id,
            "role": identity.role,
        }
    })))
}
