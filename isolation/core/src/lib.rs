// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenantry Core
//!
//! Multi-tenant isolation for a shared-schema PostgreSQL deployment.
//!
//! Four layers keep one tenant's rows out of another tenant's requests:
//!
//! 1. [`domain::tenant_context`] binds the `(tenant, user, role)` tuple to
//!    each request's task tree
//! 2. [`application::access_interceptor`] injects the tenant into every data
//!    operation on tenant-scoped entities
//! 3. [`infrastructure::session_enforcer`] declares the tenant on each pooled
//!    connection so row-level security filters rows even if step 2 is skipped
//! 4. [`presentation::boundary_guard`] installs the context from a verified
//!    identity only
//!
//! [`application::rate_limiter`] adds fixed-window throttling for abuse-prone
//! endpoints.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
