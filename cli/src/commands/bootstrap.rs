// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `tenantry bootstrap`: create the restricted role and row-level security
//! policies once, failing the process if that is not possible. Run it after
//! migrations to gate a deployment on enforcement being in place.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use tenantry_core::domain::config::StorageKind;
use tenantry_core::domain::entity::EntityPolicyTable;
use tenantry_core::infrastructure::db::TenantPool;

pub async fn handle_command(config_path: Option<PathBuf>) -> Result<()> {
    let mut config = super::config::load(config_path)?;
    if config.database.backend != StorageKind::Postgres {
        bail!("bootstrap requires database.backend = postgres");
    }
    config.database.bootstrap_required = true;

    let policies = EntityPolicyTable::default();
    let pool = TenantPool::connect(&config.database, &policies)
        .await
        .context("Row-level security bootstrap failed")?;
    pool.close().await;

    info!(tables = policies.tenant_scoped().len(), "Bootstrap complete");
    println!(
        "{}",
        format!(
            "✓ Role '{}' and policies on {} tables are in place",
            config.database.enforced_role,
            policies.tenant_scoped().len()
        )
        .green()
    );
    Ok(())
}
