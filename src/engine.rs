use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FacetError, Result};
use crate::executor::{QueryExecutor, detect_json1};
use crate::facet::config::{FacetConfigSet, facet_type_for_key};
use crate::facet::{BaseQuery, FacetContext, FacetResults, FacetType, Services, SuggestedFacet};
use crate::filter::FilterState;
use crate::labels::{LabelExpander, SqliteLabels};
use crate::metadata::Metadata;
use crate::schema::{SchemaIntrospector, SqliteSchema};
use crate::settings::FacetSettings;

/// Suggestions and results for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FacetPage {
    #[serde(flatten)]
    pub facets: FacetResults,
    pub suggested: Vec<SuggestedFacet>,
}

/// Resolves facet configuration and runs the registered strategies.
pub struct FacetEngine {
    services: Services,
    metadata: Arc<Metadata>,
    settings: FacetSettings,
    facet_types: Vec<FacetType>,
}

impl FacetEngine {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        schema: Arc<dyn SchemaIntrospector>,
        labels: Arc<dyn LabelExpander>,
        metadata: Arc<Metadata>,
        settings: FacetSettings,
        json1: bool,
    ) -> Self {
        Self {
            services: Services { executor, schema, labels },
            metadata,
            settings,
            facet_types: FacetType::registered(json1),
        }
    }

    /// Wires the SQLite schema introspector and label expander on top of
    /// `executor`, and probes for JSON support.
    pub fn sqlite(executor: Arc<dyn QueryExecutor>, metadata: Arc<Metadata>, settings: FacetSettings) -> Self {
        let schema: Arc<dyn SchemaIntrospector> = Arc::new(SqliteSchema::new(Arc::clone(&executor)));
        let labels = Arc::new(SqliteLabels::new(
            Arc::clone(&executor),
            Arc::clone(&schema),
            Arc::clone(&metadata),
        ));
        Self::new(executor, schema, labels, metadata, settings, detect_json1())
    }

    pub fn facet_types(&self) -> &[FacetType] {
        &self.facet_types
    }

    pub fn settings(&self) -> &FacetSettings {
        &self.settings
    }

    pub fn resolve_configs(&self, query: &BaseQuery, filter: &dyn FilterState) -> Result<FacetConfigSet> {
        if !self.settings.allow_facet && filter.pairs().iter().any(|(k, _)| facet_type_for_key(k).is_some()) {
            return Err(FacetError::FacetNotAllowed);
        }
        let table_metadata = query
            .table
            .as_deref()
            .and_then(|t| self.metadata.table(&query.database, t));
        FacetConfigSet::resolve(table_metadata, filter.pairs())
    }

    fn context<'a>(&'a self, query: &'a BaseQuery, filter: &'a dyn FilterState, configs: &'a FacetConfigSet) -> FacetContext<'a> {
        FacetContext { services: &self.services, settings: self.settings, query, filter, configs }
    }

    /// Suggestions from every registered strategy. A strategy that cannot
    /// inspect the base query at all contributes nothing.
    pub async fn suggest_facets(
        &self,
        query: &BaseQuery,
        filter: &dyn FilterState,
        configs: &FacetConfigSet,
    ) -> Vec<SuggestedFacet> {
        if !self.settings.suggest_facets {
            return Vec::new();
        }
        let context = self.context(query, filter, configs);
        let outcomes = join_all(self.facet_types.iter().map(|t| t.suggest(&context))).await;
        let mut suggested = Vec::new();
        for (facet_type, outcome) in self.facet_types.iter().zip(outcomes) {
            match outcome {
                Ok(mut found) => suggested.append(&mut found),
                Err(e) => warn!(facet_type = facet_type.name(), error = %e, "facet suggestion failed"),
            }
        }
        suggested
    }

    /// Results for every configured facet. Facets that time out or fail are
    /// listed in the returned [`FacetResults`] rather than failing the call.
    pub async fn compute_facets(
        &self,
        query: &BaseQuery,
        filter: &dyn FilterState,
        configs: &FacetConfigSet,
    ) -> FacetResults {
        let started = Instant::now();
        let context = self.context(query, filter, configs);
        let outcomes = join_all(self.facet_types.iter().map(|t| t.facet_results(&context))).await;
        let mut results = FacetResults::default();
        for (facet_type, outcome) in self.facet_types.iter().zip(outcomes) {
            match outcome {
                Ok(found) => results.merge(found),
                Err(e) => {
                    warn!(facet_type = facet_type.name(), error = %e, "facet computation failed");
                    for config in configs.get(facet_type.name()) {
                        results.record_failure(
                            config.column(),
                            crate::executor::QueryError::Other(e.to_string()),
                            self.settings.error_mode,
                        );
                    }
                }
            }
        }
        info!(
            database = %query.database,
            table = query.table.as_deref().unwrap_or("-"),
            facets = results.len(),
            timed_out = results.timed_out.len(),
            failed = results.failed.len(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "facets computed"
        );
        results
    }

    /// Resolves configuration once, then computes results and (optionally)
    /// suggestions concurrently.
    pub async fn facets(&self, query: &BaseQuery, filter: &dyn FilterState, suggest: bool) -> Result<FacetPage> {
        let configs = self.resolve_configs(query, filter)?;
        let (facets, suggested) = if suggest {
            futures_util::join!(
                self.compute_facets(query, filter, &configs),
                self.suggest_facets(query, filter, &configs)
            )
        } else {
            (self.compute_facets(query, filter, &configs).await, Vec::new())
        };
        Ok(FacetPage { facets, suggested })
    }
}
