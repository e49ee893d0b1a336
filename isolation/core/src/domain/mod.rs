// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: identity tuple, task-scoped context, entity policy table,
//! driver-neutral operations and the seams the outer layers implement.

pub mod audit;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod entity;
pub mod errors;
pub mod identity;
pub mod query;
pub mod rate_limit;
pub mod repository;
pub mod tenant_context;
