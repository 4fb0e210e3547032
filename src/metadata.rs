//! Static per-table metadata, read from a JSON document shaped like
//! `{"databases": {"db": {"tables": {"books": {"facets": ["genre"]}}}}}`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{FacetError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub databases: HashMap<String, DatabaseMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseMetadata {
    #[serde(default)]
    pub tables: HashMap<String, TableMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableMetadata {
    /// Facet declarations: bare column names or single-entry `{type: config}`
    /// objects. Their shape is checked when the facet configs are resolved.
    #[serde(default)]
    pub facets: Vec<serde_json::Value>,
    #[serde(default)]
    pub label_column: Option<String>,
}

impl Metadata {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FacetError::Metadata(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn table(&self, database: &str, table: &str) -> Option<&TableMetadata> {
        self.databases.get(database)?.tables.get(table)
    }
}
