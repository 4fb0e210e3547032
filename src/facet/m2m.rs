//! Many-to-many facets: counts of base rows related to each row of a
//! destination table through a two-key junction table. Table-backed queries
//! only, since the relationship comes from the foreign-key graph.

use tracing::debug;

use crate::error::Result;
use crate::executor::value_to_string;
use crate::schema::{Junction, find_junction, junction_destinations};
use crate::sql::escape_sqlite;

use super::selection::{Selection, ThroughToken};
use super::{FacetContext, FacetResults, FacetType, SuggestedFacet, leading_values};

pub(super) fn facet_sql(sql: &str, junction: &Junction, limit: usize) -> String {
    format!(
        "select {jt}.{to_dest} as value, count(distinct {jt}.{to_base}) as count \
         from {jt} where {jt}.{to_base} in (select {pk} from ({sql})) \
         group by {jt}.{to_dest} order by count desc, value limit {limit}",
        jt = escape_sqlite(&junction.table),
        to_dest = escape_sqlite(&junction.column_to_destination),
        to_base = escape_sqlite(&junction.column_to_base),
        pk = escape_sqlite(&junction.base_primary_key),
    )
}

pub(super) async fn suggest(facet: &FacetContext<'_>) -> Result<Vec<SuggestedFacet>> {
    let Some(table) = &facet.query.table else {
        return Ok(Vec::new());
    };
    let graph = facet.foreign_keys().await?;
    let enabled = facet.enabled(FacetType::ManyToMany);
    let key = FacetType::ManyToMany.request_key();
    Ok(junction_destinations(&graph, table)
        .into_iter()
        .filter(|d| !enabled.contains(&d.as_str()) && !facet.filter.contains(&key, d))
        .map(|d| facet.suggestion(FacetType::ManyToMany, &d))
        .collect())
}

pub(super) async fn facet_results(facet: &FacetContext<'_>) -> Result<FacetResults> {
    let configs = facet.configs(FacetType::ManyToMany);
    let Some(table) = &facet.query.table else {
        return Ok(FacetResults::default());
    };
    if configs.is_empty() {
        return Ok(FacetResults::default());
    }
    let graph = facet.foreign_keys().await?;
    if graph.get(table).is_none() {
        return Ok(FacetResults::default());
    }
    let mut junctions = Vec::with_capacity(configs.len());
    for config in configs {
        match find_junction(&graph, table, config.column()) {
            Some(junction) => junctions.push(junction),
            None => {
                // no data for any many-to-many facet of this request
                debug!(table = %table, destination = config.column(), "no junction table");
                return Ok(FacetResults::default());
            }
        }
    }
    let size = facet.settings.size;
    let queries = junctions
        .iter()
        .map(|j| facet_sql(&facet.query.sql, j, size + 1))
        .collect();
    let outcomes = facet.run_all(queries, facet.settings.time_limit).await;
    let mut results = FacetResults::default();
    for ((config, junction), outcome) in configs.iter().zip(&junctions).zip(outcomes) {
        let destination = config.column();
        let rows = match outcome {
            Ok(rows) => rows,
            Err(e) => {
                results.record_failure(destination, e, facet.settings.error_mode);
                continue;
            }
        };
        let labels = facet
            .expand_labels(&junction.table, &junction.column_to_destination, leading_values(&rows, size))
            .await;
        results.insert(facet.shape(
            FacetType::ManyToMany,
            config,
            destination,
            &rows,
            (&labels, &junction.column_to_destination),
            |value| {
                Selection::Through(ThroughToken::new(
                    &junction.table,
                    &junction.column_to_destination,
                    &value_to_string(value),
                ))
            },
        ));
    }
    Ok(results)
}
