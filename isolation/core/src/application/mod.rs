// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod access_interceptor;
pub mod rate_limiter;
pub mod registration;
pub mod repository_factory;

pub use access_interceptor::{scope_operation, EntityHandle, TenantScopedStore};
pub use rate_limiter::RateLimiter;
pub use registration::{
    RegisterUserRequest, RegisterUserUseCase, RegisteredUser, RegistrationError, RegistrationSettings,
    StandardRegisterUserUseCase,
};
