//! The foreign-key graph of a database, and the junction-table discovery the
//! many-to-many facet is built on.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::types::Value;
use serde::Serialize;

use crate::error::Result;
use crate::executor::{QueryExecutor, value_to_string};
use crate::sql::FastHasher;

/// `source_table.source_column` references `target_table.target_column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ForeignKeyEdge {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
}

impl ForeignKeyEdge {
    pub fn new(source_table: &str, source_column: &str, target_table: &str, target_column: &str) -> Self {
        Self {
            source_table: source_table.to_string(),
            source_column: source_column.to_string(),
            target_table: target_table.to_string(),
            target_column: target_column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableKeys {
    /// Edges from other tables pointing at this one.
    pub incoming: Vec<ForeignKeyEdge>,
    /// Edges from this table pointing elsewhere.
    pub outgoing: Vec<ForeignKeyEdge>,
}

#[derive(Debug, Clone, Default)]
pub struct ForeignKeyGraph {
    tables: HashMap<String, TableKeys, FastHasher>,
}

impl ForeignKeyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    /// Records an edge on both of its ends. Edges whose target table is not
    /// part of the graph are dropped and `false` is returned.
    pub fn add_edge(&mut self, edge: ForeignKeyEdge) -> bool {
        let Some(target) = self.tables.get_mut(&edge.target_table) else {
            return false;
        };
        target.incoming.push(edge.clone());
        self.tables
            .entry(edge.source_table.clone())
            .or_default()
            .outgoing
            .push(edge);
        true
    }

    /// `None` for anything that is not a table, views included.
    pub fn get(&self, table: &str) -> Option<&TableKeys> {
        self.tables.get(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A table with exactly two foreign keys linking `base` to a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub table: String,
    pub column_to_base: String,
    pub base_primary_key: String,
    pub column_to_destination: String,
}

// the other end of a two-key junction table, seen from `base`
fn junction_edges<'g>(keys: &'g TableKeys, base: &str, destination: &str) -> Option<(&'g ForeignKeyEdge, &'g ForeignKeyEdge)> {
    let [first, second] = keys.outgoing.as_slice() else {
        return None;
    };
    if first.target_table == base && second.target_table == destination {
        Some((first, second))
    } else if second.target_table == base && first.target_table == destination {
        Some((second, first))
    } else {
        None
    }
}

/// Finds the first table referencing `base` whose two outgoing keys target
/// exactly `base` and `destination`.
pub fn find_junction(graph: &ForeignKeyGraph, base: &str, destination: &str) -> Option<Junction> {
    let keys = graph.get(base)?;
    keys.incoming.iter().find_map(|fk| {
        let candidate = graph.get(&fk.source_table)?;
        let (to_base, to_destination) = junction_edges(candidate, base, destination)?;
        Some(Junction {
            table: fk.source_table.clone(),
            column_to_base: to_base.source_column.clone(),
            base_primary_key: to_base.target_column.clone(),
            column_to_destination: to_destination.source_column.clone(),
        })
    })
}

/// Destination tables reachable from `base` through two-key junction tables,
/// in the order their junctions reference `base`.
pub fn junction_destinations(graph: &ForeignKeyGraph, base: &str) -> Vec<String> {
    let Some(keys) = graph.get(base) else {
        return Vec::new();
    };
    let mut destinations: Vec<String> = Vec::new();
    for fk in &keys.incoming {
        let Some(candidate) = graph.get(&fk.source_table) else {
            continue;
        };
        if candidate.outgoing.len() != 2 || !candidate.outgoing.iter().any(|o| o.target_table == base) {
            continue;
        }
        // a junction pointing at `base` twice relates the table to itself
        let destination = candidate
            .outgoing
            .iter()
            .find(|o| o.target_table != base)
            .map_or_else(|| base.to_string(), |o| o.target_table.clone());
        if !destinations.contains(&destination) {
            destinations.push(destination);
        }
    }
    destinations
}

pub trait SchemaIntrospector: Send + Sync {
    fn foreign_keys(&self, database: &str) -> Result<ForeignKeyGraph>;
}

/// Reads the graph from `sqlite_master` and `pragma_foreign_key_list`.
pub struct SqliteSchema {
    executor: Arc<dyn QueryExecutor>,
}

impl SqliteSchema {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    fn primary_key(&self, database: &str, table: &str) -> Result<String> {
        let rows = self.executor.execute(
            database,
            "select name from pragma_table_info(?) where pk > 0 order by pk",
            &[Value::Text(table.to_string())],
            None,
        )?;
        Ok(rows
            .rows
            .first()
            .and_then(|r| r.first())
            .map_or_else(|| "rowid".to_string(), value_to_string))
    }
}

impl SchemaIntrospector for SqliteSchema {
    fn foreign_keys(&self, database: &str) -> Result<ForeignKeyGraph> {
        let tables: Vec<String> = self
            .executor
            .execute(database, "select name from sqlite_master where type = 'table'", &[], None)?
            .rows
            .iter()
            .filter_map(|r| r.first().map(value_to_string))
            .collect();
        let mut graph = ForeignKeyGraph::new();
        for table in &tables {
            graph.add_table(table);
        }
        for table in &tables {
            let keys = self.executor.execute(
                database,
                r#"select "table", "from", "to" from pragma_foreign_key_list(?)"#,
                &[Value::Text(table.clone())],
                None,
            )?;
            for row in &keys.rows {
                let target_table = value_to_string(&row[0]);
                let source_column = value_to_string(&row[1]);
                let target_column = match &row[2] {
                    Value::Null => self.primary_key(database, &target_table)?,
                    other => value_to_string(other),
                };
                graph.add_edge(ForeignKeyEdge {
                    source_table: table.clone(),
                    source_column,
                    target_table,
                    target_column,
                });
            }
        }
        Ok(graph)
    }
}
