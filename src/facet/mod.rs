//! The four facet strategies and the per-request context they share.
//!
//! Every strategy does two things against the base query:
//! * `suggest` probes the result set (or the foreign-key graph) for good facet
//!   candidates that are not configured yet;
//! * `facet_results` runs one aggregation per configured facet, all of them
//!   concurrently and each under its own time budget, and shapes the rows into
//!   toggle-aware entries.
//!
//! A facet whose query fails never takes the others down with it; it is listed
//! as timed out (or failed) instead.

pub mod config;
pub mod selection;

mod array;
mod column;
mod date;
mod m2m;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rusqlite::types::Value;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::executor::{self, QueryError, QueryExecutor, Rows, value_to_count, value_to_json, value_to_string};
use crate::filter::FilterState;
use crate::labels::{LabelExpander, LabelMap};
use crate::schema::{ForeignKeyGraph, SchemaIntrospector};
use crate::settings::{FacetErrorMode, FacetSettings};

use config::{FacetConfig, FacetConfigSet};
use selection::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FacetType {
    #[serde(rename = "column")]
    Column,
    #[serde(rename = "array")]
    Array,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "m2m")]
    ManyToMany,
}

impl FacetType {
    pub fn name(self) -> &'static str {
        match self {
            FacetType::Column => "column",
            FacetType::Array => "array",
            FacetType::Date => "date",
            FacetType::ManyToMany => "m2m",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "column" => Some(FacetType::Column),
            "array" => Some(FacetType::Array),
            "date" => Some(FacetType::Date),
            "m2m" => Some(FacetType::ManyToMany),
            _ => None,
        }
    }

    /// The filter key that switches a facet of this type on.
    pub fn request_key(self) -> String {
        match self {
            FacetType::Column => config::FACET_KEY.to_string(),
            other => format!("{}_{}", config::FACET_KEY, other.name()),
        }
    }

    /// Strategies available to an engine; array facets need JSON support.
    pub fn registered(json1: bool) -> Vec<FacetType> {
        let mut types = vec![FacetType::Column, FacetType::Date, FacetType::ManyToMany];
        if json1 {
            types.push(FacetType::Array);
        }
        types
    }

    pub async fn suggest(self, facet: &FacetContext<'_>) -> Result<Vec<SuggestedFacet>> {
        match self {
            FacetType::Column => column::suggest(facet).await,
            FacetType::Array => array::suggest(facet).await,
            FacetType::Date => date::suggest(facet).await,
            FacetType::ManyToMany => m2m::suggest(facet).await,
        }
    }

    pub async fn facet_results(self, facet: &FacetContext<'_>) -> Result<FacetResults> {
        match self {
            FacetType::Column => column::facet_results(facet).await,
            FacetType::Array => array::facet_results(facet).await,
            FacetType::Date => date::facet_results(facet).await,
            FacetType::ManyToMany => m2m::facet_results(facet).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetResultEntry {
    pub value: serde_json::Value,
    pub label: String,
    pub count: u64,
    pub toggle_url: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetResult {
    pub name: String,
    #[serde(rename = "type")]
    pub facet_type: FacetType,
    pub hideable: bool,
    /// Url with this facet switched off.
    pub toggle_url: String,
    pub truncated: bool,
    pub results: Vec<FacetResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedFacet {
    pub name: String,
    #[serde(rename = "type")]
    pub facet_type: FacetType,
    pub toggle_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetFailure {
    pub name: String,
    pub error: String,
}

/// Facet results in configuration order plus the facets that did not make it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FacetResults {
    pub results: Vec<FacetResult>,
    pub timed_out: Vec<String>,
    pub failed: Vec<FacetFailure>,
}

impl FacetResults {
    /// A later result for the same facet replaces the earlier one in place.
    pub fn insert(&mut self, result: FacetResult) {
        match self
            .results
            .iter_mut()
            .find(|r| r.name == result.name && r.facet_type == result.facet_type)
        {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FacetResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn get_typed(&self, facet_type: FacetType, name: &str) -> Option<&FacetResult> {
        self.results
            .iter()
            .find(|r| r.facet_type == facet_type && r.name == name)
    }

    pub fn record_failure(&mut self, name: &str, error: QueryError, mode: FacetErrorMode) {
        match (error, mode) {
            (QueryError::Interrupted, _) | (QueryError::Other(_), FacetErrorMode::Timeout) => {
                warn!(facet = name, "facet query timed out");
                self.timed_out.push(name.to_string());
            }
            (QueryError::Other(message), FacetErrorMode::Distinct) => {
                warn!(facet = name, error = %message, "facet query failed");
                self.failed.push(FacetFailure { name: name.to_string(), error: message });
            }
        }
    }

    pub fn merge(&mut self, other: FacetResults) {
        for result in other.results {
            self.insert(result);
        }
        self.timed_out.extend(other.timed_out);
        self.failed.extend(other.failed);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// The base query being faceted.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseQuery {
    pub database: String,
    /// Set for table-backed queries; raw SQL has no table.
    pub table: Option<String>,
    pub sql: String,
    pub params: Vec<Value>,
    pub row_count: Option<u64>,
}

impl BaseQuery {
    pub fn table(database: &str, table: &str) -> Self {
        Self {
            database: database.to_string(),
            table: Some(table.to_string()),
            sql: crate::sql::select_all_from(table),
            params: Vec::new(),
            row_count: None,
        }
    }

    pub fn sql(database: &str, sql: &str, params: Vec<Value>) -> Self {
        Self {
            database: database.to_string(),
            table: None,
            sql: sql.to_string(),
            params,
            row_count: None,
        }
    }

    /// Reuses a row count the caller already knows.
    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }
}

/// Collaborators shared by every request.
#[derive(Clone)]
pub struct Services {
    pub executor: Arc<dyn QueryExecutor>,
    pub schema: Arc<dyn SchemaIntrospector>,
    pub labels: Arc<dyn LabelExpander>,
}

/// Everything one strategy needs for one request.
pub struct FacetContext<'a> {
    pub services: &'a Services,
    pub settings: FacetSettings,
    pub query: &'a BaseQuery,
    pub filter: &'a dyn FilterState,
    pub configs: &'a FacetConfigSet,
}

impl<'a> FacetContext<'a> {
    pub fn configs(&self, facet_type: FacetType) -> &'a [FacetConfig] {
        self.configs.get(facet_type.name())
    }

    pub fn enabled(&self, facet_type: FacetType) -> Vec<&'a str> {
        self.configs.columns(facet_type.name())
    }

    /// Runs every query on its own blocking task and waits for all of them.
    /// Outcomes come back in the order of `queries`.
    pub async fn run_all(&self, queries: Vec<String>, budget: Duration) -> Vec<std::result::Result<Rows, QueryError>> {
        let tasks = queries.into_iter().map(|sql| {
            let executor = Arc::clone(&self.services.executor);
            let database = self.query.database.clone();
            let params = self.query.params.clone();
            tokio::task::spawn_blocking(move || executor.execute(&database, &sql, &params, Some(budget)))
        });
        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(QueryError::Other(e.to_string()))))
            .collect()
    }

    /// Column names of the base query, bounded by the facet time limit.
    pub async fn columns(&self) -> Result<Vec<String>> {
        let executor = Arc::clone(&self.services.executor);
        let (database, sql, params) = self.owned_query();
        let budget = self.settings.time_limit;
        let columns = tokio::task::spawn_blocking(move || {
            executor::columns_of(executor.as_ref(), &database, &sql, &params, Some(budget))
        })
        .await??;
        Ok(columns)
    }

    /// The caller's row count when known, otherwise counted under the facet
    /// time limit.
    pub async fn row_count(&self) -> Result<u64> {
        if let Some(count) = self.query.row_count {
            return Ok(count);
        }
        let executor = Arc::clone(&self.services.executor);
        let (database, sql, params) = self.owned_query();
        let budget = self.settings.time_limit;
        let count = tokio::task::spawn_blocking(move || {
            executor::row_count(executor.as_ref(), &database, &sql, &params, Some(budget))
        })
        .await??;
        Ok(count)
    }

    pub async fn foreign_keys(&self) -> Result<ForeignKeyGraph> {
        let schema = Arc::clone(&self.services.schema);
        let database = self.query.database.clone();
        tokio::task::spawn_blocking(move || schema.foreign_keys(&database)).await?
    }

    /// Labels for `values` of `table.column`. Labels are cosmetic, so a failed
    /// lookup leaves the raw values in place.
    pub async fn expand_labels(&self, table: &str, column: &str, values: Vec<Value>) -> LabelMap {
        let labels = Arc::clone(&self.services.labels);
        let database = self.query.database.clone();
        let (table, column) = (table.to_string(), column.to_string());
        let expanded = tokio::task::spawn_blocking(move || {
            labels.expand_labels(&database, &table, &column, &values)
        })
        .await;
        match expanded {
            Ok(Ok(map)) => map,
            Ok(Err(e)) => {
                warn!(error = %e, "label expansion failed");
                LabelMap::default()
            }
            Err(e) => {
                warn!(error = %e, "label expansion task failed");
                LabelMap::default()
            }
        }
    }

    pub fn suggestion(&self, facet_type: FacetType, name: &str) -> SuggestedFacet {
        SuggestedFacet {
            name: name.to_string(),
            facet_type,
            toggle_url: self.filter.with_added(&facet_type.request_key(), name),
        }
    }

    /// Keeps the first `size` rows, labels them and works out their selection
    /// state. `truncated` is set when the query returned more than `size` rows.
    pub fn shape(
        &self,
        facet_type: FacetType,
        config: &FacetConfig,
        name: &str,
        rows: &Rows,
        labels: (&LabelMap, &str),
        select: impl Fn(&Value) -> Selection,
    ) -> FacetResult {
        let size = self.settings.size;
        let (label_map, label_column) = labels;
        let value_index = rows.column_index("value").unwrap_or(0);
        let count_index = rows.column_index("count").unwrap_or(1);
        let results = rows
            .rows
            .iter()
            .take(size)
            .map(|row| {
                let value = row.get(value_index).cloned().unwrap_or(Value::Null);
                let text = value_to_string(&value);
                let selection = select(&value);
                FacetResultEntry {
                    value: value_to_json(&value),
                    label: label_map
                        .get(&(label_column.to_string(), text.clone()))
                        .cloned()
                        .unwrap_or(text),
                    count: row.get(count_index).map_or(0, value_to_count),
                    toggle_url: selection.toggle_url(self.filter),
                    selected: selection.is_selected(self.filter),
                }
            })
            .collect();
        FacetResult {
            name: name.to_string(),
            facet_type,
            hideable: config.hideable(),
            toggle_url: self
                .filter
                .with_removed(&facet_type.request_key(), config.raw_value()),
            truncated: rows.len() > size,
            results,
        }
    }

    fn owned_query(&self) -> (String, String, Vec<Value>) {
        (self.query.database.clone(), self.query.sql.clone(), self.query.params.clone())
    }
}

/// The `value` column of the first `size` rows, for label lookups.
pub(crate) fn leading_values(rows: &Rows, size: usize) -> Vec<Value> {
    let index = rows.column_index("value").unwrap_or(0);
    rows.rows
        .iter()
        .take(size)
        .filter_map(|row| row.get(index).cloned())
        .collect()
}
