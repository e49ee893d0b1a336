// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Data-Access Operations
//!
//! Driver-neutral description of every operation that reaches the data store.
//! The Access Interceptor rewrites these values before a driver renders them,
//! so the shapes here are the single place where tenant scoping is expressed.
//!
//! Records are loose JSON objects keyed by column name; filters are a small
//! typed tree so scoping can always be *added* (`And`) without overwriting a
//! caller-supplied constraint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted row, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    FindUnique,
    FindFirst,
    FindMany,
    Create,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
    Upsert,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::FindUnique => "findUnique",
            OperationKind::FindFirst => "findFirst",
            OperationKind::FindMany => "findMany",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::Delete => "delete",
            OperationKind::DeleteMany => "deleteMany",
            OperationKind::Upsert => "upsert",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn is_in(field: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Filter::In {
            field: field.to_string(),
            values: values.into_iter().collect(),
        }
    }

    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And {
            filters: filters.into_iter().collect(),
        }
    }

    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or {
            filters: filters.into_iter().collect(),
        }
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Logical AND of `self` and `other`; nested `And` lists are flattened.
    pub fn and(self, other: Filter) -> Self {
        let mut filters = match self {
            Filter::And { filters } => filters,
            single => vec![single],
        };
        match other {
            Filter::And { filters: rest } => filters.extend(rest),
            single => filters.push(single),
        }
        Filter::And { filters }
    }

    /// Evaluate against an in-memory record. Missing columns compare as `null`.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq { field, value } => record.get(field).unwrap_or(&Value::Null) == value,
            Filter::In { field, values } => {
                let actual = record.get(field).unwrap_or(&Value::Null);
                values.iter().any(|v| v == actual)
            }
            Filter::And { filters } => filters.iter().all(|f| f.matches(record)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(record)),
            Filter::Not { filter } => !filter.matches(record),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DataOperation {
    FindUnique { filter: Option<Filter> },
    FindFirst { filter: Option<Filter> },
    FindMany { filter: Option<Filter> },
    Create { data: Record },
    Update { filter: Option<Filter>, data: Record },
    UpdateMany { filter: Option<Filter>, data: Record },
    Delete { filter: Option<Filter> },
    DeleteMany { filter: Option<Filter> },
    Upsert {
        filter: Option<Filter>,
        create: Record,
        update: Record,
    },
}

impl DataOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            DataOperation::FindUnique { .. } => OperationKind::FindUnique,
            DataOperation::FindFirst { .. } => OperationKind::FindFirst,
            DataOperation::FindMany { .. } => OperationKind::FindMany,
            DataOperation::Create { .. } => OperationKind::Create,
            DataOperation::Update { .. } => OperationKind::Update,
            DataOperation::UpdateMany { .. } => OperationKind::UpdateMany,
            DataOperation::Delete { .. } => OperationKind::Delete,
            DataOperation::DeleteMany { .. } => OperationKind::DeleteMany,
            DataOperation::Upsert { .. } => OperationKind::Upsert,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            DataOperation::FindUnique { filter }
            | DataOperation::FindFirst { filter }
            | DataOperation::FindMany { filter }
            | DataOperation::Update { filter, .. }
            | DataOperation::UpdateMany { filter, .. }
            | DataOperation::Delete { filter }
            | DataOperation::DeleteMany { filter }
            | DataOperation::Upsert { filter, .. } => filter.as_ref(),
            DataOperation::Create { .. } => None,
        }
    }
}

/// What a driver hands back for an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// Single-row operations; `None` when nothing matched.
    Record(Option<Record>),
    Records(Vec<Record>),
    /// Bulk mutations report the affected row count.
    Count(u64),
}
