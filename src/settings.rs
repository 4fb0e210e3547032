use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// What to do with compute queries that fail for reasons other than a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetErrorMode {
    /// Report them in their own `failed` list.
    #[default]
    Distinct,
    /// Fold them into the timed-out list.
    Timeout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub default_facet_size: usize,
    pub facet_time_limit_ms: u64,
    pub facet_suggest_time_limit_ms: u64,
    pub suggest_facets: bool,
    pub allow_facet: bool,
    pub facet_error_mode: FacetErrorMode,
    #[serde(default)]
    pub databases: Vec<PathBuf>,
    #[serde(default)]
    pub metadata: Option<PathBuf>,
    pub bind: String,
    pub log: String,
}

impl Settings {
    /// Defaults, then the optional file at `path`, then `SQLFACET_*` variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("default_facet_size", 30)?
            .set_default("facet_time_limit_ms", 200)?
            .set_default("facet_suggest_time_limit_ms", 50)?
            .set_default("suggest_facets", true)?
            .set_default("allow_facet", true)?
            .set_default("facet_error_mode", "distinct")?
            .set_default("bind", "127.0.0.1:8001")?
            .set_default("log", "info")?;
        builder = match path {
            Some(p) => builder.add_source(File::with_name(p)),
            None => builder.add_source(File::with_name("sqlfacet").required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("SQLFACET"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn facet_settings(&self) -> FacetSettings {
        FacetSettings {
            size: self.default_facet_size,
            time_limit: Duration::from_millis(self.facet_time_limit_ms),
            suggest_time_limit: Duration::from_millis(self.facet_suggest_time_limit_ms),
            suggest_facets: self.suggest_facets,
            allow_facet: self.allow_facet,
            error_mode: self.facet_error_mode,
        }
    }
}

/// The part of the settings the facet engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetSettings {
    pub size: usize,
    pub time_limit: Duration,
    pub suggest_time_limit: Duration,
    pub suggest_facets: bool,
    pub allow_facet: bool,
    pub error_mode: FacetErrorMode,
}

impl Default for FacetSettings {
    fn default() -> Self {
        Self {
            size: 30,
            time_limit: Duration::from_millis(200),
            suggest_time_limit: Duration::from_millis(50),
            suggest_facets: true,
            allow_facet: true,
            error_mode: FacetErrorMode::Distinct,
        }
    }
}
