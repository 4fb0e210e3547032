//! Read-only SQL execution with per-query time budgets.
//!
//! Everything the facet strategies learn about the data goes through the
//! [`QueryExecutor`] trait. The shipped [`SqliteExecutor`] opens a fresh
//! connection per query, so facet queries issued from different blocking tasks
//! never contend for one connection.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OpenFlags, params_from_iter};
use thiserror::Error;
use tracing::debug;

use crate::error::{FacetError, Result};
use crate::sql::FastHasher;

// number of virtual machine instructions between deadline checks
const PROGRESS_STEPS: i32 = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("query interrupted")]
    Interrupted,
    #[error("{0}")]
    Other(String),
}

impl From<QueryError> for FacetError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Interrupted => FacetError::Interrupted,
            QueryError::Other(message) => FacetError::Query(message),
        }
    }
}

/// Column names plus the materialized rows of one query.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }
}

pub trait QueryExecutor: Send + Sync {
    /// Runs a parameterized read query. When `budget` is given and expires the
    /// statement is aborted and [`QueryError::Interrupted`] is returned.
    fn execute(
        &self,
        database: &str,
        sql: &str,
        params: &[Value],
        budget: Option<Duration>,
    ) -> std::result::Result<Rows, QueryError>;
}

/// Where a named database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// A named shared-cache memory database; it lives as long as the executor.
    InMemory(String),
}

impl DatabaseLocation {
    fn uri(&self) -> String {
        match self {
            DatabaseLocation::File(path) => path.to_string_lossy().into_owned(),
            DatabaseLocation::InMemory(name) => format!("file:{name}?mode=memory&cache=shared"),
        }
    }
}

struct HostedDatabase {
    location: DatabaseLocation,
    // keeps a memory database alive and serves writes from `execute_batch`
    anchor: Option<Mutex<Connection>>,
}

pub struct SqliteExecutor {
    databases: HashMap<String, HostedDatabase, FastHasher>,
}

impl fmt::Debug for SqliteExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteExecutor")
            .field("databases", &self.names())
            .finish()
    }
}

impl Default for SqliteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteExecutor {
    pub fn new() -> Self {
        Self { databases: HashMap::default() }
    }

    /// Registers a database under `name`. File databases are opened once to
    /// verify they are readable.
    pub fn attach(&mut self, name: &str, location: DatabaseLocation) -> Result<()> {
        let anchor = match &location {
            DatabaseLocation::InMemory(_) => Some(Mutex::new(Connection::open(location.uri())?)),
            DatabaseLocation::File(path) => {
                Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
                None
            }
        };
        debug!(database = name, location = ?location, "attached database");
        self.databases
            .insert(name.to_string(), HostedDatabase { location, anchor });
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.databases.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn contains(&self, database: &str) -> bool {
        self.databases.contains_key(database)
    }

    /// Runs a batch of statements with write access. Meant for seeding.
    pub fn execute_batch(&self, database: &str, sql: &str) -> Result<()> {
        let hosted = self
            .databases
            .get(database)
            .ok_or_else(|| FacetError::UnknownDatabase(database.to_string()))?;
        match &hosted.anchor {
            Some(anchor) => {
                let conn = anchor
                    .lock()
                    .map_err(|e| FacetError::Query(format!("lock poisoned: {e}")))?;
                conn.execute_batch(sql)?;
            }
            None => {
                Connection::open(hosted.location.uri())?.execute_batch(sql)?;
            }
        }
        Ok(())
    }

    fn connect(&self, database: &str) -> std::result::Result<Connection, QueryError> {
        let hosted = self
            .databases
            .get(database)
            .ok_or_else(|| QueryError::Other(format!("unknown database: {database}")))?;
        let conn = match &hosted.location {
            DatabaseLocation::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
            DatabaseLocation::InMemory(_) => Connection::open(hosted.location.uri()),
        }
        .map_err(classify)?;
        conn.execute_batch("pragma query_only = 1").map_err(classify)?;
        Ok(conn)
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(
        &self,
        database: &str,
        sql: &str,
        params: &[Value],
        budget: Option<Duration>,
    ) -> std::result::Result<Rows, QueryError> {
        let conn = self.connect(database)?;
        if let Some(budget) = budget {
            let deadline = Instant::now() + budget;
            conn.progress_handler(PROGRESS_STEPS, Some(move || Instant::now() >= deadline));
        }
        let mut stmt = conn.prepare(sql).map_err(classify)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        {
            let mut cursor = stmt.query(params_from_iter(params.iter())).map_err(classify)?;
            while let Some(row) = cursor.next().map_err(classify)? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(row.get::<_, Value>(i).map_err(classify)?);
                }
                rows.push(values);
            }
        }
        Ok(Rows { columns, rows })
    }
}

fn classify(e: rusqlite::Error) -> QueryError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::OperationInterrupted => {
            QueryError::Interrupted
        }
        _ => QueryError::Other(e.to_string()),
    }
}

/// Whether the bundled SQLite understands the JSON functions.
pub fn detect_json1() -> bool {
    Connection::open_in_memory()
        .and_then(|conn| conn.query_row("select json('{}')", [], |_| Ok(())))
        .is_ok()
}

/// Column names of `sql`, found with the `limit 0` trick.
pub fn columns_of(
    executor: &dyn QueryExecutor,
    database: &str,
    sql: &str,
    params: &[Value],
    budget: Option<Duration>,
) -> std::result::Result<Vec<String>, QueryError> {
    let probe = format!("select * from ({sql}) limit 0");
    Ok(executor.execute(database, &probe, params, budget)?.columns)
}

pub fn row_count(
    executor: &dyn QueryExecutor,
    database: &str,
    sql: &str,
    params: &[Value],
    budget: Option<Duration>,
) -> std::result::Result<u64, QueryError> {
    let counting = format!("select count(*) from ({sql})");
    let rows = executor.execute(database, &counting, params, budget)?;
    match rows.rows.first().and_then(|r| r.first()) {
        Some(Value::Integer(n)) => Ok((*n).max(0) as u64),
        _ => Err(QueryError::Other("count(*) returned no rows".to_string())),
    }
}

/// Text form of a value, as used in filter pairs and selection tokens.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 => format!("{f:.1}"),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

pub fn value_to_count(value: &Value) -> u64 {
    match value {
        Value::Integer(i) => (*i).max(0) as u64,
        Value::Real(f) => f.max(0.0) as u64,
        _ => 0,
    }
}

/// Turns a JSON parameter into a bindable SQL value.
pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}
