// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Data-Store Drivers
//!
//! Infrastructure implementations of [`DataStore`]. Drivers execute exactly
//! the operation they receive; tenant scoping is applied before they are
//! called, by the Access Interceptor.
//!
//! - **PostgresDataStore** - renders operations to parameterized SQL and runs
//!   them on the tenant-aware pool, so every statement passes the
//!   Connection-Level Enforcer
//! - **InMemoryDataStore** - table name → rows, for tests and local runs

pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::entity::EntityPolicy;
use crate::domain::query::{DataOperation, Filter, OperationOutcome, Record};
use crate::domain::repository::{DataStore, RepositoryError};

pub use postgres::PostgresDataStore;

#[derive(Default)]
pub struct InMemoryDataStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw table contents, bypassing every scoping layer.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }
}

fn matches(filter: Option<&Filter>, record: &Record) -> bool {
    filter.map_or(true, |f| f.matches(record))
}

fn merge(target: &mut Record, data: Record) {
    for (key, value) in data {
        target.insert(key, value);
    }
    target.insert("updated_at".to_string(), Value::String(Utc::now().to_rfc3339()));
}

/// Fill the columns the database would default.
fn with_defaults(mut data: Record) -> Record {
    if !data.get("id").is_some_and(|v| !v.is_null()) {
        data.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    let now = Value::String(Utc::now().to_rfc3339());
    data.entry("created_at").or_insert_with(|| now.clone());
    data.entry("updated_at").or_insert(now);
    data
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn execute(
        &self,
        target: &EntityPolicy,
        operation: DataOperation,
    ) -> Result<OperationOutcome, RepositoryError> {
        let mut tables = self.tables.write();
        let rows = tables.entry(target.table.clone()).or_default();

        let outcome = match operation {
            DataOperation::FindUnique { filter } | DataOperation::FindFirst { filter } => {
                OperationOutcome::Record(rows.iter().find(|r| matches(filter.as_ref(), r)).cloned())
            }
            DataOperation::FindMany { filter } => OperationOutcome::Records(
                rows.iter()
                    .filter(|r| matches(filter.as_ref(), r))
                    .cloned()
                    .collect(),
            ),
            DataOperation::Create { data } => {
                let record = with_defaults(data);
                rows.push(record.clone());
                OperationOutcome::Record(Some(record))
            }
            DataOperation::Update { filter, data } => {
                let updated = rows.iter_mut().find(|r| matches(filter.as_ref(), r)).map(|row| {
                    merge(row, data);
                    row.clone()
                });
                OperationOutcome::Record(updated)
            }
            DataOperation::UpdateMany { filter, data } => {
                let mut count = 0;
                for row in rows.iter_mut().filter(|r| matches(filter.as_ref(), r)) {
                    merge(row, data.clone());
                    count += 1;
                }
                OperationOutcome::Count(count)
            }
            DataOperation::Delete { filter } => {
                let removed = rows
                    .iter()
                    .position(|r| matches(filter.as_ref(), r))
                    .map(|index| rows.remove(index));
                OperationOutcome::Record(removed)
            }
            DataOperation::DeleteMany { filter } => {
                let before = rows.len();
                rows.retain(|r| !matches(filter.as_ref(), r));
                OperationOutcome::Count((before - rows.len()) as u64)
            }
            DataOperation::Upsert {
                filter,
                create,
                update,
            } => match rows.iter_mut().find(|r| matches(filter.as_ref(), r)) {
                Some(row) => {
                    merge(row, update);
                    OperationOutcome::Record(Some(row.clone()))
                }
                None => {
                    let record = with_defaults(create);
                    rows.push(record.clone());
                    OperationOutcome::Record(Some(record))
                }
            },
        };

        Ok(outcome)
    }
}
