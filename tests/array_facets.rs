use std::sync::Arc;

use sqlfacet::engine::FacetEngine;
use sqlfacet::executor::{DatabaseLocation, SqliteExecutor};
use sqlfacet::facet::{BaseQuery, FacetType};
use sqlfacet::filter::QueryString;
use sqlfacet::metadata::Metadata;
use sqlfacet::settings::FacetSettings;

fn setup(name: &str) -> FacetEngine {
    let mut executor = SqliteExecutor::new();
    executor.attach("blog", DatabaseLocation::InMemory(name.to_string())).expect("attach");
    executor
        .execute_batch(
            "blog",
            r#"
            create table posts (id integer primary key, title text, tags text);
            insert into posts (title, tags) values
                ('one', '["rust", "sql"]'),
                ('two', '["rust"]'),
                ('three', '["sql", "sql"]'),
                ('four', null),
                ('five', '["web", "rust"]');
            "#,
        )
        .expect("seed");
    FacetEngine::sqlite(Arc::new(executor), Arc::new(Metadata::default()), FacetSettings::default())
}

fn posts() -> BaseQuery {
    BaseQuery::table("blog", "posts")
}

#[tokio::test]
async fn array_strategy_is_registered_with_json_support() {
    let engine = setup("array_registered");
    assert!(engine.facet_types().contains(&FacetType::Array));
}

#[tokio::test]
async fn suggests_json_array_columns_only() {
    let engine = setup("array_suggest");
    let filter = QueryString::parse("/blog/posts", "");
    let page = engine.facets(&posts(), &filter, true).await.expect("facets ok");
    let arrays: Vec<&str> = page
        .suggested
        .iter()
        .filter(|s| s.facet_type == FacetType::Array)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(arrays, vec!["tags"]);
    let tags = page.suggested.iter().find(|s| s.facet_type == FacetType::Array).unwrap();
    assert_eq!(tags.toggle_url, "/blog/posts?_facet_array=tags");
}

#[tokio::test]
async fn counts_rows_containing_each_element() {
    let engine = setup("array_counts");
    let filter = QueryString::parse("/blog/posts", "_facet_array=tags");
    let page = engine.facets(&posts(), &filter, false).await.expect("facets ok");
    let tags = page.facets.get_typed(FacetType::Array, "tags").expect("tags facet");
    let counts: Vec<(&str, u64)> = tags
        .results
        .iter()
        .map(|e| (e.value.as_str().unwrap(), e.count))
        .collect();
    // "sql" appears twice in one row but that row counts once
    assert_eq!(counts, vec![("rust", 3), ("sql", 2), ("web", 1)]);
    assert_eq!(tags.toggle_url, "/blog/posts");
}

#[tokio::test]
async fn selection_uses_arraycontains_key() {
    let engine = setup("array_selected");
    let filter = QueryString::parse("/blog/posts", "_facet_array=tags&tags__arraycontains=sql");
    let page = engine.facets(&posts(), &filter, false).await.expect("facets ok");
    let tags = page.facets.get_typed(FacetType::Array, "tags").expect("tags facet");
    let sql = tags.results.iter().find(|e| e.value == "sql").unwrap();
    assert!(sql.selected);
    assert_eq!(sql.toggle_url, "/blog/posts?_facet_array=tags");
    let rust = tags.results.iter().find(|e| e.value == "rust").unwrap();
    assert!(!rust.selected);
    assert_eq!(
        rust.toggle_url,
        "/blog/posts?_facet_array=tags&tags__arraycontains=sql&tags__arraycontains=rust"
    );
}

#[tokio::test]
async fn identical_rows_each_count() {
    let mut executor = SqliteExecutor::new();
    executor.attach("blog", DatabaseLocation::InMemory("array_identical_rows".into())).expect("attach");
    executor
        .execute_batch(
            "blog",
            r#"
            create table notes (tags text);
            insert into notes (tags) values ('["a"]'), ('["a"]'), ('["a", "b", "a"]');
            "#,
        )
        .expect("seed");
    let engine = FacetEngine::sqlite(Arc::new(executor), Arc::new(Metadata::default()), FacetSettings::default());
    let filter = QueryString::parse("/blog/notes", "_facet_array=tags");
    let page = engine
        .facets(&BaseQuery::table("blog", "notes"), &filter, false)
        .await
        .expect("facets ok");
    let tags = page.facets.get_typed(FacetType::Array, "tags").expect("tags facet");
    let counts: Vec<(&str, u64)> = tags
        .results
        .iter()
        .map(|e| (e.value.as_str().unwrap(), e.count))
        .collect();
    assert_eq!(counts, vec![("a", 3), ("b", 1)]);
}
