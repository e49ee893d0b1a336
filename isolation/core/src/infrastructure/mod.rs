// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit;
pub mod credentials;
pub mod db;
pub mod identity_verifier;
pub mod rate_limit_store;
pub mod repositories;
pub mod session_enforcer;
