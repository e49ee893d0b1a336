// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface. Handlers delegate to `crate::application`; tenant binding
//! happens once, in the Boundary Guard, before any handler runs.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Axum router and handlers |
//! | [`boundary_guard`] | Identity verification and context binding middleware |
//! | [`rate_limit_guard`] | Client identification and 429 responses |
//! | [`error`] | `{error: {code, message}}` translation |

pub mod api;
pub mod boundary_guard;
pub mod error;
pub mod rate_limit_guard;
