use tracing::debug;

use crate::error::Result;
use crate::executor::value_to_string;
use crate::labels::LabelMap;
use crate::sql::escape_sqlite;

use super::selection::Selection;
use super::{FacetContext, FacetResults, FacetType, SuggestedFacet, leading_values};

pub(super) fn distinct_values_sql(sql: &str, column: &str, limit: usize) -> String {
    format!(
        "select distinct {col} from ({sql}) where {col} is not null limit {limit}",
        col = escape_sqlite(column),
    )
}

pub(super) fn facet_sql(sql: &str, column: &str, limit: usize) -> String {
    format!(
        "select {col} as value, count(*) as count from ({sql}) where {col} is not null \
         group by {col} order by count desc, value limit {limit}",
        col = escape_sqlite(column),
    )
}

/// Columns with more than one but at most `size` distinct values, and fewer
/// distinct values than there are rows.
pub(super) async fn suggest(facet: &FacetContext<'_>) -> Result<Vec<SuggestedFacet>> {
    let row_count = match facet.row_count().await {
        Ok(count) => count,
        Err(e) => {
            debug!(error = %e, "row count unavailable, no column suggestions");
            return Ok(Vec::new());
        }
    };
    let enabled = facet.enabled(FacetType::Column);
    let candidates: Vec<String> = facet
        .columns()
        .await?
        .into_iter()
        .filter(|c| !enabled.contains(&c.as_str()))
        .collect();
    let size = facet.settings.size;
    let probes = candidates
        .iter()
        .map(|c| distinct_values_sql(&facet.query.sql, c, size + 1))
        .collect();
    let outcomes = facet.run_all(probes, facet.settings.suggest_time_limit).await;
    let mut suggested = Vec::new();
    for (column, outcome) in candidates.iter().zip(outcomes) {
        match outcome {
            Ok(rows) => {
                let distinct = rows.len();
                if distinct > 1 && distinct <= size && (distinct as u64) < row_count {
                    suggested.push(facet.suggestion(FacetType::Column, column));
                }
            }
            Err(e) => debug!(column = %column, error = %e, "column facet probe skipped"),
        }
    }
    Ok(suggested)
}

pub(super) async fn facet_results(facet: &FacetContext<'_>) -> Result<FacetResults> {
    let configs = facet.configs(FacetType::Column);
    let size = facet.settings.size;
    let queries = configs
        .iter()
        .map(|c| facet_sql(&facet.query.sql, c.column(), size + 1))
        .collect();
    let outcomes = facet.run_all(queries, facet.settings.time_limit).await;
    let mut results = FacetResults::default();
    for (config, outcome) in configs.iter().zip(outcomes) {
        let column = config.column();
        let rows = match outcome {
            Ok(rows) => rows,
            Err(e) => {
                results.record_failure(column, e, facet.settings.error_mode);
                continue;
            }
        };
        let labels = match &facet.query.table {
            Some(table) => facet.expand_labels(table, column, leading_values(&rows, size)).await,
            None => LabelMap::default(),
        };
        results.insert(facet.shape(
            FacetType::Column,
            config,
            column,
            &rows,
            (&labels, column),
            |value| Selection::Equality { column: column.to_string(), value: value_to_string(value) },
        ));
    }
    Ok(results)
}
