//! Foreign-key label expansion: turning `author_id = 3` into "Ursula K. Le Guin".

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::types::Value;
use tracing::debug;

use crate::error::Result;
use crate::executor::{QueryError, QueryExecutor, columns_of, value_to_string};
use crate::metadata::Metadata;
use crate::schema::SchemaIntrospector;
use crate::sql::{FastHasher, escape_sqlite, select_all_from};

/// `(column, value)` to human readable label.
pub type LabelMap = HashMap<(String, String), String, FastHasher>;

pub trait LabelExpander: Send + Sync {
    fn expand_labels(&self, database: &str, table: &str, column: &str, values: &[Value]) -> Result<LabelMap>;
}

pub struct SqliteLabels {
    executor: Arc<dyn QueryExecutor>,
    schema: Arc<dyn SchemaIntrospector>,
    metadata: Arc<Metadata>,
}

impl SqliteLabels {
    pub fn new(executor: Arc<dyn QueryExecutor>, schema: Arc<dyn SchemaIntrospector>, metadata: Arc<Metadata>) -> Self {
        Self { executor, schema, metadata }
    }

    /// The column that best describes a row of `table`, if there is one.
    pub fn label_column(&self, database: &str, table: &str) -> Result<Option<String>> {
        if let Some(explicit) = self
            .metadata
            .table(database, table)
            .and_then(|t| t.label_column.clone())
        {
            return Ok(Some(explicit));
        }
        let columns = columns_of(self.executor.as_ref(), database, &select_all_from(table), &[], None)?;
        if let Some(named) = columns.iter().find(|c| *c == "name" || *c == "title") {
            return Ok(Some(named.clone()));
        }
        if columns.len() == 2 && columns.iter().any(|c| c == "id" || c == "pk") {
            return Ok(columns.into_iter().find(|c| c != "id" && c != "pk"));
        }
        Ok(None)
    }
}

impl LabelExpander for SqliteLabels {
    fn expand_labels(&self, database: &str, table: &str, column: &str, values: &[Value]) -> Result<LabelMap> {
        let mut labels = LabelMap::default();
        let graph = self.schema.foreign_keys(database)?;
        let Some(fk) = graph
            .get(table)
            .and_then(|keys| keys.outgoing.iter().find(|fk| fk.source_column == column))
        else {
            return Ok(labels);
        };
        let Some(label_column) = self.label_column(database, &fk.target_table)? else {
            for value in values {
                let text = value_to_string(value);
                labels.insert((column.to_string(), text.clone()), text);
            }
            return Ok(labels);
        };
        let mut distinct: Vec<Value> = Vec::new();
        for value in values {
            if !distinct.contains(value) {
                distinct.push(value.clone());
            }
        }
        if distinct.is_empty() {
            return Ok(labels);
        }
        let placeholders = vec!["?"; distinct.len()].join(", ");
        let sql = format!(
            "select {key}, {label} from {target} where {key} in ({placeholders})",
            key = escape_sqlite(&fk.target_column),
            label = escape_sqlite(&label_column),
            target = escape_sqlite(&fk.target_table),
        );
        match self.executor.execute(database, &sql, &distinct, None) {
            Ok(rows) => {
                for row in &rows.rows {
                    labels.insert(
                        (column.to_string(), value_to_string(&row[0])),
                        value_to_string(&row[1]),
                    );
                }
            }
            Err(QueryError::Interrupted) => {
                debug!(table, column, "label expansion interrupted");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(labels)
    }
}
