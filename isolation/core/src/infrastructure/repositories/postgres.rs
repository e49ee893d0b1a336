// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PostgreSQL data-store driver.
//!
//! Operations are rendered with `sqlx::QueryBuilder`: identifiers are
//! validated and quoted, every value is a bind parameter. Rows come back as
//! `to_jsonb(t)` so the driver needs no per-table mapping; payloads go in via
//! `jsonb_populate_record`, which casts each field to its column type.
//!
//! Equality is evaluated on the text form of the column (`"col"::text = $n`),
//! matching how the row-level policy compares the tenant column.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{Connection, Postgres, QueryBuilder};

use crate::domain::entity::EntityPolicy;
use crate::domain::query::{DataOperation, Filter, OperationOutcome, Record};
use crate::domain::repository::{is_valid_identifier, DataStore, RepositoryError};
use crate::infrastructure::db::TenantPool;

const TARGET: &str = "t";
const INNER: &str = "s";
const PAYLOAD: &str = "r";

pub struct PostgresDataStore {
    pool: TenantPool,
}

impl PostgresDataStore {
    pub fn new(pool: TenantPool) -> Self {
        Self { pool }
    }
}

fn ident(name: &str) -> Result<String, RepositoryError> {
    if is_valid_identifier(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(RepositoryError::InvalidIdentifier(name.to_string()))
    }
}

fn column(alias: &str, field: &str) -> Result<String, RepositoryError> {
    Ok(format!("{alias}.{}", ident(field)?))
}

/// Text form used for comparisons against `"col"::text`.
fn text_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_filter(
    builder: &mut QueryBuilder<'static, Postgres>,
    filter: &Filter,
    alias: &str,
) -> Result<(), RepositoryError> {
    match filter {
        Filter::Eq { field, value } => {
            let column = column(alias, field)?;
            if value.is_null() {
                builder.push(column).push(" IS NULL");
            } else {
                builder.push(column).push("::text = ").push_bind(text_value(value));
            }
        }
        Filter::In { field, values } => {
            let column = column(alias, field)?;
            let has_null = values.iter().any(Value::is_null);
            let texts: Vec<String> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(text_value)
                .collect();

            if texts.is_empty() {
                if has_null {
                    builder.push(column).push(" IS NULL");
                } else {
                    builder.push("FALSE");
                }
            } else {
                builder
                    .push("(")
                    .push(&column)
                    .push("::text = ANY(")
                    .push_bind(texts)
                    .push(")");
                if has_null {
                    builder.push(" OR ").push(&column).push(" IS NULL");
                }
                builder.push(")");
            }
        }
        Filter::And { filters } => push_joined(builder, filters, " AND ", "TRUE", alias)?,
        Filter::Or { filters } => push_joined(builder, filters, " OR ", "FALSE", alias)?,
        Filter::Not { filter } => {
            builder.push("NOT (");
            push_filter(builder, filter, alias)?;
            builder.push(")");
        }
    }
    Ok(())
}

fn push_joined(
    builder: &mut QueryBuilder<'static, Postgres>,
    filters: &[Filter],
    separator: &str,
    empty: &str,
    alias: &str,
) -> Result<(), RepositoryError> {
    if filters.is_empty() {
        builder.push(empty);
        return Ok(());
    }
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        push_filter(builder, filter, alias)?;
    }
    builder.push(")");
    Ok(())
}

fn push_where(
    builder: &mut QueryBuilder<'static, Postgres>,
    filter: Option<&Filter>,
    alias: &str,
) -> Result<(), RepositoryError> {
    if let Some(filter) = filter {
        builder.push(" WHERE ");
        push_filter(builder, filter, alias)?;
    }
    Ok(())
}

/// `t.ctid = (SELECT s.ctid FROM "table" AS s WHERE .. LIMIT 1)`
fn push_single_row_target(
    builder: &mut QueryBuilder<'static, Postgres>,
    table: &str,
    filter: Option<&Filter>,
) -> Result<(), RepositoryError> {
    builder.push(format!(" WHERE {TARGET}.ctid = (SELECT {INNER}.ctid FROM {table} AS {INNER}"));
    push_where(builder, filter, INNER)?;
    builder.push(" LIMIT 1)");
    Ok(())
}

fn payload_columns(data: &Record) -> Result<Vec<String>, RepositoryError> {
    data.keys().map(|k| ident(k)).collect()
}

pub(crate) fn render_select(
    target: &EntityPolicy,
    filter: Option<&Filter>,
    single: bool,
) -> Result<QueryBuilder<'static, Postgres>, RepositoryError> {
    let table = ident(&target.table)?;
    let mut builder = QueryBuilder::new(format!(
        "SELECT to_jsonb({TARGET}) AS record FROM {table} AS {TARGET}"
    ));
    push_where(&mut builder, filter, TARGET)?;
    if single {
        builder.push(" LIMIT 1");
    }
    Ok(builder)
}

pub(crate) fn render_insert(
    target: &EntityPolicy,
    data: Record,
) -> Result<QueryBuilder<'static, Postgres>, RepositoryError> {
    let table = ident(&target.table)?;
    let columns = payload_columns(&data)?;

    if columns.is_empty() {
        return Ok(QueryBuilder::new(format!(
            "INSERT INTO {table} AS {TARGET} DEFAULT VALUES RETURNING to_jsonb({TARGET}) AS record"
        )));
    }

    let selected: Vec<String> = columns.iter().map(|c| format!("{PAYLOAD}.{c}")).collect();
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {table} AS {TARGET} ({}) SELECT {} FROM jsonb_populate_record(NULL::{table}, ",
        columns.join(", "),
        selected.join(", ")
    ));
    builder.push_bind(Json(Value::Object(data)));
    builder.push(format!(") AS {PAYLOAD} RETURNING to_jsonb({TARGET}) AS record"));
    Ok(builder)
}

/// `None` when `data` is empty: there is nothing to write.
pub(crate) fn render_update(
    target: &EntityPolicy,
    filter: Option<&Filter>,
    data: Record,
    single: bool,
) -> Result<Option<QueryBuilder<'static, Postgres>>, RepositoryError> {
    let table = ident(&target.table)?;
    let columns = payload_columns(&data)?;
    if columns.is_empty() {
        return Ok(None);
    }

    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = {PAYLOAD}.{c}")).collect();
    let mut builder = QueryBuilder::new(format!(
        "UPDATE {table} AS {TARGET} SET {} FROM jsonb_populate_record(NULL::{table}, ",
        assignments.join(", ")
    ));
    builder.push_bind(Json(Value::Object(data)));
    builder.push(format!(") AS {PAYLOAD}"));

    if single {
        push_single_row_target(&mut builder, &table, filter)?;
        builder.push(format!(" RETURNING to_jsonb({TARGET}) AS record"));
    } else {
        push_where(&mut builder, filter, TARGET)?;
    }
    Ok(Some(builder))
}

pub(crate) fn render_delete(
    target: &EntityPolicy,
    filter: Option<&Filter>,
    single: bool,
) -> Result<QueryBuilder<'static, Postgres>, RepositoryError> {
    let table = ident(&target.table)?;
    let mut builder = QueryBuilder::new(format!("DELETE FROM {table} AS {TARGET}"));
    if single {
        push_single_row_target(&mut builder, &table, filter)?;
        builder.push(format!(" RETURNING to_jsonb({TARGET}) AS record"));
    } else {
        push_where(&mut builder, filter, TARGET)?;
    }
    Ok(builder)
}

fn render_count(target: &EntityPolicy, filter: Option<&Filter>) -> Result<QueryBuilder<'static, Postgres>, RepositoryError> {
    let table = ident(&target.table)?;
    let mut builder = QueryBuilder::new(format!("SELECT count(*) FROM {table} AS {TARGET}"));
    push_where(&mut builder, filter, TARGET)?;
    Ok(builder)
}

async fn fetch_one_record(
    conn: &mut sqlx::PgConnection,
    mut builder: QueryBuilder<'static, Postgres>,
) -> Result<Option<Record>, RepositoryError> {
    let row = builder
        .build_query_scalar::<Json<Record>>()
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|Json(record)| record))
}

#[async_trait]
impl DataStore for PostgresDataStore {
    async fn execute(
        &self,
        target: &EntityPolicy,
        operation: DataOperation,
    ) -> Result<OperationOutcome, RepositoryError> {
        let mut checkout = self.pool.acquire().await?;
        let conn = checkout.synced().await?;

        let outcome = match operation {
            DataOperation::FindUnique { filter } | DataOperation::FindFirst { filter } => {
                let builder = render_select(target, filter.as_ref(), true)?;
                OperationOutcome::Record(fetch_one_record(conn, builder).await?)
            }
            DataOperation::FindMany { filter } => {
                let mut builder = render_select(target, filter.as_ref(), false)?;
                let rows = builder
                    .build_query_scalar::<Json<Record>>()
                    .fetch_all(&mut *conn)
                    .await?;
                OperationOutcome::Records(rows.into_iter().map(|Json(r)| r).collect())
            }
            DataOperation::Create { data } => {
                let builder = render_insert(target, data)?;
                OperationOutcome::Record(fetch_one_record(conn, builder).await?)
            }
            DataOperation::Update { filter, data } => {
                let record = match render_update(target, filter.as_ref(), data, true)? {
                    Some(builder) => fetch_one_record(conn, builder).await?,
                    None => fetch_one_record(conn, render_select(target, filter.as_ref(), true)?).await?,
                };
                OperationOutcome::Record(record)
            }
            DataOperation::UpdateMany { filter, data } => {
                let affected = match render_update(target, filter.as_ref(), data, false)? {
                    Some(mut builder) => builder.build().execute(&mut *conn).await?.rows_affected(),
                    None => {
                        let count: i64 = render_count(target, filter.as_ref())?
                            .build_query_scalar()
                            .fetch_one(&mut *conn)
                            .await?;
                        count as u64
                    }
                };
                OperationOutcome::Count(affected)
            }
            DataOperation::Delete { filter } => {
                let builder = render_delete(target, filter.as_ref(), true)?;
                OperationOutcome::Record(fetch_one_record(conn, builder).await?)
            }
            DataOperation::DeleteMany { filter } => {
                let mut builder = render_delete(target, filter.as_ref(), false)?;
                OperationOutcome::Count(builder.build().execute(&mut *conn).await?.rows_affected())
            }
            DataOperation::Upsert {
                filter,
                create,
                update,
            } => {
                let mut tx = conn.begin().await?;
                let updated = match render_update(target, filter.as_ref(), update, true)? {
                    Some(builder) => fetch_one_record(&mut *tx, builder).await?,
                    None => fetch_one_record(&mut *tx, render_select(target, filter.as_ref(), true)?).await?,
                };
                let record = match updated {
                    Some(record) => record,
                    None => fetch_one_record(&mut *tx, render_insert(target, create)?)
                        .await?
                        .ok_or_else(|| RepositoryError::UnexpectedOutcome("upsert insert".to_string()))?,
                };
                tx.commit().await?;
                OperationOutcome::Record(Some(record))
            }
        };

        Ok(outcome)
    }
}
