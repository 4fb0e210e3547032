//! Facets over columns holding JSON arrays: one entry per array element,
//! counting the rows whose array contains it.

use rusqlite::types::Value;
use tracing::debug;

use crate::error::Result;
use crate::executor::value_to_string;
use crate::labels::LabelMap;
use crate::sql::escape_sqlite;

use super::selection::Selection;
use super::{FacetContext, FacetResults, FacetType, SuggestedFacet};

pub(super) fn json_types_sql(sql: &str, column: &str) -> String {
    format!("select distinct json_type({col}) from ({sql})", col = escape_sqlite(column))
}

// Every base row gets its own number first, so identical rows still count
// separately while an element repeated inside one row counts that row once.
pub(super) fn facet_sql(sql: &str, column: &str, limit: usize) -> String {
    format!(
        "with facet_base as (select row_number() over () as facet_row, * from ({sql})) \
         select j.value as value, count(distinct facet_base.facet_row) as count \
         from facet_base join json_each(facet_base.{col}) j \
         group by j.value order by count desc, j.value limit {limit}",
        col = escape_sqlite(column),
    )
}

/// Only `array` and SQL `null` were observed, and at least one array.
fn only_arrays(kinds: &[Value]) -> bool {
    let mut saw_array = false;
    for kind in kinds {
        match kind {
            Value::Text(t) if t == "array" => saw_array = true,
            Value::Null => {}
            _ => return false,
        }
    }
    saw_array
}

pub(super) async fn suggest(facet: &FacetContext<'_>) -> Result<Vec<SuggestedFacet>> {
    let enabled = facet.enabled(FacetType::Array);
    let candidates: Vec<String> = facet
        .columns()
        .await?
        .into_iter()
        .filter(|c| !enabled.contains(&c.as_str()))
        .collect();
    let probes = candidates
        .iter()
        .map(|c| json_types_sql(&facet.query.sql, c))
        .collect();
    let outcomes = facet.run_all(probes, facet.settings.suggest_time_limit).await;
    let mut suggested = Vec::new();
    for (column, outcome) in candidates.iter().zip(outcomes) {
        match outcome {
            Ok(rows) => {
                let kinds: Vec<Value> = rows.rows.iter().filter_map(|r| r.first().cloned()).collect();
                if only_arrays(&kinds) {
                    suggested.push(facet.suggestion(FacetType::Array, column));
                }
            }
            // not JSON at all lands here too
            Err(e) => debug!(column = %column, error = %e, "array facet probe skipped"),
        }
    }
    Ok(suggested)
}

pub(super) async fn facet_results(facet: &FacetContext<'_>) -> Result<FacetResults> {
    let configs = facet.configs(FacetType::Array);
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
                FacetType::Array,
                config,
                column,
                &rows,
                (&no_labels, column),
                |value| Selection::Contains { column: column.to_string(), value: value_to_string(value) },
            )),
            Err(e) => results.record_failure(column, e, facet.settings.error_mode),
        }
    }
    Ok(results)
}
