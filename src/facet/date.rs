//! Facets over the calendar date of a timestamp-ish column.
//!
//! Known limitation: a base query that itself produces columns named `value`
//! or `count` makes the generated aggregation ambiguous.

use tracing::debug;

use crate::error::Result;
use crate::executor::value_to_string;
use crate::labels::LabelMap;
use crate::sql::escape_sqlite;

use super::selection::Selection;
use super::{FacetContext, FacetResults, FacetType, SuggestedFacet};

const SAMPLE_ROWS: usize = 100;

pub(super) fn date_sample_sql(sql: &str, column: &str) -> String {
    format!(
        "select date({col}) from ({sql}) where {col} glob '????-??-*' limit {SAMPLE_ROWS}",
        col = escape_sqlite(column),
    )
}

pub(super) fn facet_sql(sql: &str, column: &str, limit: usize) -> String {
    format!(
        "select date({col}) as value, count(*) as count from ({sql}) \
         where date({col}) is not null \
         group by date({col}) order by count desc, value limit {limit}",
        col = escape_sqlite(column),
    )
}

/// Suggests any column where one of the first sampled `YYYY-MM-*` looking
/// values casts to a date. A heuristic, not a type check.
pub(super) async fn suggest(facet: &FacetContext<'_>) -> Result<Vec<SuggestedFacet>> {
    let enabled = facet.enabled(FacetType::Date);
    let candidates: Vec<String> = facet
        .columns()
        .await?
        .into_iter()
        .filter(|c| !enabled.contains(&c.as_str()))
        .collect();
    let probes = candidates
        .iter()
        .map(|c| date_sample_sql(&facet.query.sql, c))
        .collect();
    let outcomes = facet.run_all(probes, facet.settings.suggest_time_limit).await;
    let mut suggested = Vec::new();
    for (column, outcome) in candidates.iter().zip(outcomes) {
        match outcome {
            Ok(rows) => {
                let any_date = rows
                    .rows
                    .iter()
                    .any(|r| r.first().is_some_and(|v| !matches!(v, rusqlite::types::Value::Null)));
                if any_date {
                    suggested.push(facet.suggestion(FacetType::Date, column));
                }
            }
            Err(e) => debug!(column = %column, error = %e, "date facet probe skipped"),
        }
    }
    Ok(suggested)
}

pub(super) async fn facet_results(facet: &FacetContext<'_>) -> Result<FacetResults> {
    let configs = facet.configs(FacetType::Date);
    let size = facet.settings.size;
    let queries = configs
        .iter()
        .map(|c| facet_sql(&facet.query.sql, c.column(), size + 1))
        .collect();
    let outcomes = facet.run_all(queries, facet.settings.time_limit).await;
    let mut results = FacetResults::default();
    let no_labels = LabelMap::default();
    for (config, outcome) in configs.iter().zip(outcomes) {
        let column = config.column();
        match outcome {
            Ok(rows) => results.insert(facet.shape(
                FacetType::Date,
                config,
                column,
                &rows,
                (&no_labels, column),
                |value| Selection::DateEquals { column: column.to_string(), value: value_to_string(value) },
            )),
            Err(e) => results.record_failure(column, e, facet.settings.error_mode),
        }
    }
    Ok(results)
}
