// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Connection-Level Enforcer
//!
//! Row-level security as a second line of defence behind the Access
//! Interceptor. Two phases:
//!
//! **Bootstrap** (once per process, shared by every connection opened while it
//! is in flight): create the restricted role with grants and default
//! privileges, then enable and force RLS on each tenant-scoped table with the
//! policy
//!
//! ```sql
//! current_setting('app.bypass_rls', true) = 'true'
//!   OR "<tenant_column>"::text = current_setting('app.tenant_id', true)
//! ```
//!
//! Each new physical connection then switches to the role with
//! `SET SESSION AUTHORIZATION`. Failure leaves that connection unrestricted
//! (logged) unless `bootstrap_required` is set.
//!
//! **Sync** (before every query): the declared `(tenant, bypass)` pair derived
//! from the task's identity is compared with the pair cached on the connection
//! and only differing fields are written with `set_config(.., false)`. A failed
//! write invalidates the cache and must abort the caller's query.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor};
use tracing::{debug, error, info, warn};

use crate::domain::entity::EntityPolicyTable;
use crate::domain::errors::IsolationError;
use crate::domain::identity::NO_TENANT_SENTINEL;
use crate::domain::repository::{is_valid_identifier, RepositoryError};
use crate::domain::tenant_context::ContextState;

const UNDEFINED_TABLE: &str = "42P01";

/// Session values a connection must carry for the current task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSession {
    pub tenant_id: String,
    pub bypass: bool,
}

impl DeclaredSession {
    pub fn from_context(context: &ContextState) -> Self {
        Self {
            tenant_id: context
                .tenant_id()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| NO_TENANT_SENTINEL.to_string()),
            bypass: context.is_system_admin(),
        }
    }

    fn bypass_flag(&self) -> &'static str {
        if self.bypass {
            "true"
        } else {
            "false"
        }
    }
}

/// Statements a sync must issue; `None` fields are already current.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncPlan {
    pub tenant_id: Option<String>,
    pub bypass: Option<bool>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.tenant_id.is_none() && self.bypass.is_none()
    }
}

/// Per-physical-connection cache. Must always equal what was last written to
/// the connection's session variables; `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSessionState {
    pub bootstrapped: bool,
    /// Running as the restricted role.
    pub restricted: bool,
    pub last_tenant_id: Option<String>,
    pub last_bypass: Option<bool>,
}

impl ConnectionSessionState {
    pub fn plan(&self, declared: &DeclaredSession) -> SyncPlan {
        SyncPlan {
            tenant_id: (self.last_tenant_id.as_deref() != Some(declared.tenant_id.as_str()))
                .then(|| declared.tenant_id.clone()),
            bypass: (self.last_bypass != Some(declared.bypass)).then_some(declared.bypass),
        }
    }

    pub fn invalidate(&mut self) {
        self.last_tenant_id = None;
        self.last_bypass = None;
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
struct BootstrapError(String);

type SharedBootstrap = Shared<BoxFuture<'static, Result<(), BootstrapError>>>;

pub struct SessionEnforcer {
    connect_options: PgConnectOptions,
    role: String,
    /// `(table, tenant_column)` pairs, sorted by table.
    tables: Vec<(String, String)>,
    bootstrap_required: bool,
    in_flight: Mutex<Option<SharedBootstrap>>,
}

impl SessionEnforcer {
    pub fn new(
        connect_options: PgConnectOptions,
        role: &str,
        policies: &EntityPolicyTable,
        bootstrap_required: bool,
    ) -> Result<Self, RepositoryError> {
        if !is_valid_identifier(role) {
            return Err(RepositoryError::InvalidIdentifier(role.to_string()));
        }

        let mut tables = Vec::new();
        for policy in policies.tenant_scoped() {
            for name in [&policy.table, &policy.tenant_column] {
                if !is_valid_identifier(name) {
                    return Err(RepositoryError::InvalidIdentifier(name.clone()));
                }
            }
            tables.push((policy.table.clone(), policy.tenant_column.clone()));
        }

        Ok(Self {
            connect_options,
            role: role.to_string(),
            tables,
            bootstrap_required,
            in_flight: Mutex::new(None),
        })
    }

    pub fn role_statement(&self) -> String {
        let role = &self.role;
        format!(
            r#"DO $role$
BEGIN
  IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = '{role}') THEN
    CREATE ROLE "{role}" NOLOGIN;
  END IF;

  GRANT USAGE ON SCHEMA public TO "{role}";
  GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO "{role}";
  GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA public TO "{role}";

  ALTER DEFAULT PRIVILEGES IN SCHEMA public
    GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO "{role}";
  ALTER DEFAULT PRIVILEGES IN SCHEMA public
    GRANT USAGE, SELECT ON SEQUENCES TO "{role}";
END
$role$"#
        )
    }

    pub fn policy_statements(&self) -> Vec<String> {
        self.tables
            .iter()
            .flat_map(|(table, column)| {
                let policy = format!("{table}_tenant_isolation");
                [
                    format!(r#"ALTER TABLE "{table}" ENABLE ROW LEVEL SECURITY"#),
                    format!(r#"ALTER TABLE "{table}" FORCE ROW LEVEL SECURITY"#),
                    format!(r#"DROP POLICY IF EXISTS "{policy}" ON "{table}""#),
                    format!(
                        r#"CREATE POLICY "{policy}" ON "{table}" FOR ALL USING (current_setting('app.bypass_rls', true) = 'true' OR "{column}"::text = current_setting('app.tenant_id', true))"#
                    ),
                ]
            })
            .collect()
    }

    /// Run the role/policy bootstrap, or join the one already in flight.
    ///
    /// The outcome is cached for the life of the process: every caller, now
    /// or later, observes the same success or failure.
    pub async fn ensure_bootstrapped(&self) -> Result<(), IsolationError> {
        let shared = {
            let mut slot = self.in_flight.lock();
            slot.get_or_insert_with(|| {
                run_bootstrap(
                    self.connect_options.clone(),
                    self.role_statement(),
                    self.policy_statements(),
                )
                .boxed()
                .shared()
            })
            .clone()
        };

        shared
            .await
            .map_err(|e| IsolationError::ConnectionBootstrapFailed(e.0))
    }

    /// First-use preparation of a freshly opened connection.
    pub async fn prepare(
        &self,
        conn: &mut PgConnection,
        state: &mut ConnectionSessionState,
    ) -> Result<(), IsolationError> {
        let result = match self.ensure_bootstrapped().await {
            Ok(()) => {
                let statement = format!(r#"SET SESSION AUTHORIZATION "{}""#, self.role);
                (&mut *conn)
                    .execute(sqlx::raw_sql(&statement))
                    .await
                    .map(|_| ())
                    .map_err(|e| IsolationError::ConnectionBootstrapFailed(e.to_string()))
            }
            Err(e) => Err(e),
        };

        state.bootstrapped = true;
        match result {
            Ok(()) => {
                state.restricted = true;
                debug!(role = %self.role, "Connection switched to restricted role");
                Ok(())
            }
            Err(e) if self.bootstrap_required => {
                error!("Connection bootstrap failed and is required: {}", e);
                Err(e)
            }
            Err(e) => {
                state.restricted = false;
                warn!(
                    "Connection bootstrap failed, continuing with application-level scoping only: {}",
                    e
                );
                Ok(())
            }
        }
    }

    /// Bring the connection's session variables in line with `declared`.
    pub async fn sync(
        &self,
        conn: &mut PgConnection,
        state: &mut ConnectionSessionState,
        declared: &DeclaredSession,
    ) -> Result<(), RepositoryError> {
        let plan = state.plan(declared);
        if plan.is_empty() {
            return Ok(());
        }

        if let Some(tenant_id) = plan.tenant_id {
            // Unknown until confirmed, so a cancelled sync forces a rewrite.
            state.last_tenant_id = None;
            if let Err(e) = sqlx::query("select set_config('app.tenant_id', $1, false)")
                .bind(&tenant_id)
                .execute(&mut *conn)
                .await
            {
                state.invalidate();
                return Err(RepositoryError::SessionSync(format!("app.tenant_id: {e}")));
            }
            metrics::counter!("tenantry_session_sync_total", "field" => "tenant_id").increment(1);
            state.last_tenant_id = Some(tenant_id);
        }

        if let Some(bypass) = plan.bypass {
            state.last_bypass = None;
            if let Err(e) = sqlx::query("select set_config('app.bypass_rls', $1, false)")
                .bind(declared.bypass_flag())
                .execute(&mut *conn)
                .await
            {
                state.invalidate();
                return Err(RepositoryError::SessionSync(format!("app.bypass_rls: {e}")));
            }
            metrics::counter!("tenantry_session_sync_total", "field" => "bypass_rls").increment(1);
            state.last_bypass = Some(bypass);
        }

        Ok(())
    }
}

async fn run_bootstrap(
    options: PgConnectOptions,
    role_statement: String,
    policy_statements: Vec<String>,
) -> Result<(), BootstrapError> {
    info!("Bootstrapping row-level security role and policies");
    let mut conn = PgConnection::connect_with(&options)
        .await
        .map_err(|e| BootstrapError(format!("connect: {e}")))?;

    (&mut conn)
        .execute(sqlx::raw_sql(&role_statement))
        .await
        .map_err(|e| BootstrapError(format!("role: {e}")))?;

    for statement in &policy_statements {
        match (&mut conn).execute(sqlx::raw_sql(statement)).await {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
                debug!("Skipping policy statement for missing table: {}", db.message());
            }
            Err(e) => {
                return Err(BootstrapError(format!("policy: {e}")));
            }
        }
    }

    if let Err(e) = conn.close().await {
        debug!("Closing bootstrap connection failed: {}", e);
    }
    info!("Row-level security bootstrap complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Identity, SYSTEM_ADMIN_ROLE};
    use std::sync::Arc;

    fn enforcer() -> SessionEnforcer {
        SessionEnforcer::new(
            PgConnectOptions::new(),
            "rls_enforced",
            &EntityPolicyTable::default(),
            false,
        )
        .unwrap()
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_bootstrap_and_prepare_futures_are_send() {
        let enforcer = enforcer();
        assert_send(&enforcer.ensure_bootstrapped());
        assert_send(&run_bootstrap(
            PgConnectOptions::new(),
            enforcer.role_statement(),
            enforcer.policy_statements(),
        ));

        fn prepare_is_send(enforcer: &SessionEnforcer, conn: &mut PgConnection, state: &mut ConnectionSessionState) {
            assert_send(&enforcer.prepare(conn, state));
        }
        let _ = prepare_is_send;
    }

    #[test]
    fn test_declared_session_from_context() {
        let none = DeclaredSession::from_context(&ContextState::Absent);
        assert_eq!(none.tenant_id, NO_TENANT_SENTINEL);
        assert!(!none.bypass);

        let cleared = DeclaredSession::from_context(&ContextState::Cleared);
        assert_eq!(cleared.tenant_id, NO_TENANT_SENTINEL);

        let admin = DeclaredSession::from_context(&ContextState::Active(Identity::new(
            "t1",
            None,
            Some(SYSTEM_ADMIN_ROLE),
        )));
        assert_eq!(admin.tenant_id, "t1");
        assert!(admin.bypass);
    }

    #[test]
    fn test_plan_only_issues_changed_fields() {
        let mut state = ConnectionSessionState::default();
        let t1 = DeclaredSession {
            tenant_id: "t1".to_string(),
            bypass: false,
        };

        let plan = state.plan(&t1);
        assert_eq!(plan.tenant_id.as_deref(), Some("t1"));
        assert_eq!(plan.bypass, Some(false));

        state.last_tenant_id = Some("t1".to_string());
        state.last_bypass = Some(false);
        assert!(state.plan(&t1).is_empty());

        let t2 = DeclaredSession {
            tenant_id: "t2".to_string(),
            bypass: false,
        };
        assert_eq!(
            state.plan(&t2),
            SyncPlan {
                tenant_id: Some("t2".to_string()),
                bypass: None,
            }
        );

        state.invalidate();
        assert!(!state.plan(&t1).is_empty());
    }

    #[test]
    fn test_policy_statements_cover_every_scoped_table() {
        let statements = enforcer().policy_statements();
        assert_eq!(statements.len(), 16);
        assert_eq!(statements[0], r#"ALTER TABLE "applications" ENABLE ROW LEVEL SECURITY"#);
        assert!(statements[3].starts_with(r#"CREATE POLICY "applications_tenant_isolation" ON "applications" FOR ALL"#));
        assert!(statements[3].contains(r#""tenant_id"::text = current_setting('app.tenant_id', true)"#));
        assert!(statements
            .iter()
            .any(|s| s == r#"DROP POLICY IF EXISTS "users_tenant_isolation" ON "users""#));
    }

    #[test]
    fn test_role_statement_is_idempotent_block() {
        let sql = enforcer().role_statement();
        assert!(sql.starts_with("DO $role$"));
        assert!(sql.contains("WHERE rolname = 'rls_enforced'"));
        assert!(sql.contains(r#"CREATE ROLE "rls_enforced" NOLOGIN"#));
        assert!(sql.contains("ALTER DEFAULT PRIVILEGES"));
    }

    #[test]
    fn test_invalid_role_is_rejected() {
        let result = SessionEnforcer::new(
            PgConnectOptions::new(),
            "rls'; drop role postgres; --",
            &EntityPolicyTable::default(),
            false,
        );
        assert!(matches!(result, Err(RepositoryError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_shared_by_all_waiters() {
        let options = PgConnectOptions::new().host("127.0.0.1").port(1);
        let enforcer = Arc::new(
            SessionEnforcer::new(options, "rls_enforced", &EntityPolicyTable::default(), false).unwrap(),
        );

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let enforcer = enforcer.clone();
                tokio::spawn(async move { enforcer.ensure_bootstrapped().await })
            })
            .collect();

        for waiter in waiters {
            let result = waiter.await.unwrap();
            assert!(matches!(result, Err(IsolationError::ConnectionBootstrapFailed(_))));
        }
        assert!(enforcer.ensure_bootstrapped().await.is_err());
    }
}
