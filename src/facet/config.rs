//! Facet configuration, merged from table metadata and the request's filter
//! state. Metadata entries come first, then request entries in query-string
//! order. Repeated request keys are all kept.

use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::{FacetError, Result};
use crate::metadata::TableMetadata;

pub const FACET_KEY: &str = "_facet";
const FACET_KEY_PREFIX: &str = "_facet_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Metadata,
    Request,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FacetSpec {
    Simple(String),
    Structured { column: String, extra: Map<String, Json> },
}

impl FacetSpec {
    pub fn column(&self) -> &str {
        match self {
            FacetSpec::Simple(column) => column,
            FacetSpec::Structured { column, .. } => column,
        }
    }

    /// A bare string, or an object carrying a string `column`.
    pub fn from_json(value: &Json) -> Result<Self> {
        match value {
            Json::String(column) => Ok(FacetSpec::Simple(column.clone())),
            Json::Object(object) => {
                let mut extra = object.clone();
                match extra.remove("column") {
                    Some(Json::String(column)) => Ok(FacetSpec::Structured { column, extra }),
                    _ => Err(FacetError::InvalidConfiguration(format!(
                        "structured facet config needs a string \"column\": {value}"
                    ))),
                }
            }
            other => Err(FacetError::InvalidConfiguration(format!(
                "facet config must be a column name or an object: {other}"
            ))),
        }
    }

    /// Request values starting with `{` are JSON, anything else is a column.
    pub fn from_request(value: &str) -> Result<Self> {
        if value.starts_with('{') {
            let parsed: Json = serde_json::from_str(value)
                .map_err(|e| FacetError::InvalidConfiguration(format!("{value}: {e}")))?;
            Self::from_json(&parsed)
        } else {
            Ok(FacetSpec::Simple(value.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetConfig {
    pub origin: Origin,
    pub spec: FacetSpec,
    /// The filter-state value this config was read from, if any.
    pub raw: Option<String>,
}

impl FacetConfig {
    pub fn column(&self) -> &str {
        self.spec.column()
    }

    /// Metadata facets are always on.
    pub fn hideable(&self) -> bool {
        self.origin != Origin::Metadata
    }

    pub fn raw_value(&self) -> &str {
        self.raw.as_deref().unwrap_or_else(|| self.column())
    }
}

/// The facet type a filter key configures, if it configures one.
pub fn facet_type_for_key(key: &str) -> Option<&str> {
    if key == FACET_KEY {
        Some("column")
    } else {
        key.strip_prefix(FACET_KEY_PREFIX).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetConfigSet {
    // facet type name to its configs, types in order of first appearance
    by_type: Vec<(String, Vec<FacetConfig>)>,
}

impl FacetConfigSet {
    pub fn resolve(metadata: Option<&TableMetadata>, pairs: &[(String, String)]) -> Result<Self> {
        let mut set = Self::default();
        for declaration in metadata.map(|m| m.facets.as_slice()).unwrap_or_default() {
            let (facet_type, spec) = match declaration {
                Json::String(column) => ("column".to_string(), FacetSpec::Simple(column.clone())),
                Json::Object(object) => {
                    let mut entries = object.iter();
                    match (entries.next(), entries.next()) {
                        (Some((facet_type, config)), None) => (facet_type.clone(), FacetSpec::from_json(config)?),
                        _ => {
                            return Err(FacetError::InvalidConfiguration(format!(
                                "metadata facet must be {{type: config}}: {declaration}"
                            )));
                        }
                    }
                }
                other => {
                    return Err(FacetError::InvalidConfiguration(format!(
                        "metadata facet must be a column name or {{type: config}}: {other}"
                    )));
                }
            };
            set.push(&facet_type, FacetConfig { origin: Origin::Metadata, spec, raw: None });
        }
        for (key, value) in pairs {
            if let Some(facet_type) = facet_type_for_key(key) {
                let spec = FacetSpec::from_request(value)?;
                set.push(
                    facet_type,
                    FacetConfig { origin: Origin::Request, spec, raw: Some(value.clone()) },
                );
            }
        }
        Ok(set)
    }

    pub fn push(&mut self, facet_type: &str, config: FacetConfig) {
        match self.by_type.iter_mut().find(|(t, _)| t == facet_type) {
            Some((_, configs)) => configs.push(config),
            None => self.by_type.push((facet_type.to_string(), vec![config])),
        }
    }

    pub fn get(&self, facet_type: &str) -> &[FacetConfig] {
        self.by_type
            .iter()
            .find(|(t, _)| t == facet_type)
            .map(|(_, configs)| configs.as_slice())
            .unwrap_or_default()
    }

    /// Columns (or destination tables) already faceted for `facet_type`.
    pub fn columns(&self, facet_type: &str) -> Vec<&str> {
        self.get(facet_type).iter().map(FacetConfig::column).collect()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.by_type.iter().map(|(t, _)| t.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
