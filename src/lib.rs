//! sqlfacet – faceted aggregation over arbitrary SQLite query results.
//!
//! Given a base query (a table or any `select`), sqlfacet computes for a set of
//! *facets* the distinct values present, how often each occurs, and whether it
//! is selected in the caller's filter state. Without explicit configuration it
//! can also *suggest* facets by probing the result set and the database's
//! foreign-key graph.
//!
//! ## Facet types
//! * `column` – group by a plain column.
//! * `array` – unnest a JSON array column and count rows per element (only when
//!   SQLite has the JSON functions).
//! * `date` – group by the calendar date of a timestamp column.
//! * `m2m` – count rows related to each destination row through a junction
//!   table with exactly two foreign keys.
//!
//! ## Modules
//! * [`facet`] – the strategies, their shared per-request context and result types.
//! * [`facet::config`] – merging metadata and request facet configuration.
//! * [`engine`] – the [`engine::FacetEngine`] orchestrating the strategies.
//! * [`executor`] – read-only SQL execution with per-query time budgets.
//! * [`schema`] – the foreign-key graph and junction-table discovery.
//! * [`labels`] – foreign-key label expansion.
//! * [`filter`] – filter state and toggle urls.
//! * [`server`] – an axum surface over the engine.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use sqlfacet::engine::FacetEngine;
//! use sqlfacet::executor::{DatabaseLocation, SqliteExecutor};
//! use sqlfacet::facet::BaseQuery;
//! use sqlfacet::filter::QueryString;
//! use sqlfacet::metadata::Metadata;
//! use sqlfacet::settings::FacetSettings;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mut executor = SqliteExecutor::new();
//! executor.attach("library", DatabaseLocation::InMemory("quickstart".into())).unwrap();
//! executor.execute_batch("library", "create table books (id integer primary key, genre text);
//!     insert into books (genre) values ('fiction'), ('fiction'), ('bio');").unwrap();
//! let engine = FacetEngine::sqlite(Arc::new(executor), Arc::new(Metadata::default()), FacetSettings::default());
//! let filter = QueryString::parse("/library/books", "_facet=genre");
//! let page = engine.facets(&BaseQuery::table("library", "books"), &filter, false).await.unwrap();
//! assert_eq!(page.facets.get("genre").unwrap().results[0].count, 2);
//! # });
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod facet;
pub mod filter;
pub mod labels;
pub mod metadata;
pub mod schema;
pub mod server;
pub mod settings;
pub mod sql;

pub use error::{FacetError, Result};
