// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP error translation. Every failure leaves as `{error: {code, message}}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::application::registration::RegistrationError;
use crate::domain::errors::IsolationError;

pub const RATE_LIMITED_MESSAGE: &str = "Too many attempts. Please wait before trying again.";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retry_after_seconds: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_after_seconds: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Authentication required")
    }

    pub fn tenant_context_missing() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "TENANT_CONTEXT_MISSING",
            "Tenant context is required but not set",
        )
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self {
            retry_after_seconds: Some(retry_after_seconds),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", RATE_LIMITED_MESSAGE)
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
    }

    /// Generic 500. The detail is logged, never returned.
    pub fn server_error(detail: &dyn std::fmt::Display) -> Self {
        error!("Request failed: {}", detail);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "SERVER_ERROR",
            "An unexpected error occurred",
        )
    }
}

impl From<IsolationError> for ApiError {
    fn from(err: IsolationError) -> Self {
        match err {
            IsolationError::TenantContextMissing | IsolationError::TenantContextRequired { .. } => {
                Self::tenant_context_missing()
            }
            IsolationError::InvalidScopedQuery { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_SCOPED_QUERY", err.to_string())
            }
            other => Self::server_error(&other),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::MissingFields => {
                Self::new(StatusCode::BAD_REQUEST, "MISSING_FIELDS", err.to_string())
            }
            RegistrationError::InvalidEmail => Self::new(StatusCode::BAD_REQUEST, "INVALID_EMAIL", err.to_string()),
            RegistrationError::InvalidPassword(message) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_PASSWORD", message)
            }
            RegistrationError::UserExists => Self::new(StatusCode::BAD_REQUEST, "USER_EXISTS", err.to_string()),
            RegistrationError::TenantNotFound(_) => {
                error!("{}", err);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TENANT_NOT_FOUND",
                    "Default tenant not found. Please contact support.",
                )
            }
            RegistrationError::Isolation(inner) => inner.into(),
            RegistrationError::Credential(inner) => Self::server_error(&inner),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after_seconds {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
