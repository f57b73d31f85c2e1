//! Composable query filters.
//!
//! A [`Filter`] is a predicate fragment plus the named parameters it binds.
//! [`build`] appends filters to a base query that already ends in a `WHERE`
//! clause, joining them with `AND` in the order given, and merges their
//! bindings into one list. Composition is pure text work; nothing here
//! touches the database.

use chrono::{DateTime, Utc};
use restarter_types::ResourceId;
use rusqlite::types::Value;
use thiserror::Error;

use crate::schema::to_micros;

/// Errors raised while composing a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Two filters in one composition bind the same parameter name.
    #[error("parameter :{name} is bound by both `{first}` and `{second}`")]
    DuplicateParameterName {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}

/// A named predicate fragment with its parameter bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: &'static str,
    predicate: String,
    params: Vec<(String, Value)>,
}

impl Filter {
    /// Creates a filter from raw parts.
    ///
    /// Parameter names are given without the leading `:`.
    pub fn new(
        name: &'static str,
        predicate: impl Into<String>,
        params: Vec<(String, Value)>,
    ) -> Self {
        Self {
            name,
            predicate: predicate.into(),
            params,
        }
    }

    /// Matches exactly the resource with the given identity.
    pub fn by_id(id: ResourceId) -> Self {
        Self::new(
            "by_id",
            "resourceone_id = :resourceone_id",
            vec![("resourceone_id".into(), Value::Integer(id))],
        )
    }

    /// Matches resources modified strictly after `threshold`.
    pub fn updated_after(threshold: DateTime<Utc>) -> Self {
        Self::new(
            "updated_after",
            "time_updated > :updated_after",
            vec![(
                "updated_after".into(),
                Value::Integer(to_micros(threshold)),
            )],
        )
    }

    /// Matches resources whose label equals `label`.
    pub fn label_is(label: impl Into<String>) -> Self {
        Self::new(
            "label_is",
            "label = :label",
            vec![("label".into(), Value::Text(label.into()))],
        )
    }

    /// Returns the filter's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the predicate text.
    pub fn predicate(&self) -> &str {
        &self.predicate
    }
}

/// A composed query ready to be prepared.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    /// Final SQL text.
    pub sql: String,
    /// Merged bindings, keyed by `:name`.
    pub params: Vec<(String, Value)>,
}

impl BuiltQuery {
    /// Borrows the bindings in the shape `rusqlite` expects for named params.
    pub fn named_params(&self) -> Vec<(&str, &dyn rusqlite::ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn rusqlite::ToSql))
            .collect()
    }
}

/// Appends `filters` to `base_query` and merges their bindings.
///
/// `base_query` must end inside a `WHERE` clause that accepts further
/// `AND` terms (for example `... WHERE 1 = 1`).
pub fn build(base_query: &str, filters: &[Filter]) -> Result<BuiltQuery, FilterError> {
    let mut sql = String::from(base_query);
    let mut params: Vec<(String, Value)> = Vec::new();
    let mut owners: Vec<(&str, &'static str)> = Vec::new();

    for filter in filters {
        sql.push_str(" AND ");
        sql.push_str(&filter.predicate);

        for (name, value) in &filter.params {
            if let Some(&(_, first)) = owners.iter().find(|(bound, _)| *bound == name.as_str()) {
                return Err(FilterError::DuplicateParameterName {
                    name: name.clone(),
                    first,
                    second: filter.name,
                });
            }
            owners.push((name.as_str(), filter.name));
            params.push((format!(":{name}"), value.clone()));
        }
    }

    Ok(BuiltQuery { sql, params })
}
