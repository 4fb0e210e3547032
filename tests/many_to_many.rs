use std::sync::Arc;

use sqlfacet::engine::FacetEngine;
use sqlfacet::executor::{DatabaseLocation, SqliteExecutor};
use sqlfacet::facet::selection::{THROUGH_KEY, ThroughToken};
use sqlfacet::facet::{BaseQuery, FacetType};
use sqlfacet::filter::QueryString;
use sqlfacet::metadata::Metadata;
use sqlfacet::schema::{ForeignKeyEdge, ForeignKeyGraph, Junction, SchemaIntrospector, SqliteSchema, find_junction, junction_destinations};
use sqlfacet::settings::FacetSettings;

const SEED: &str = "
    create table books (id integer primary key, title text);
    create table tags (id integer primary key, name text);
    create table reviewers (id integer primary key, name text);
    create table book_tags (
        book_id integer references books(id),
        tag_id integer references tags(id)
    );
    create table reviews (
        id integer primary key,
        book_id integer references books(id),
        reviewer_id integer references reviewers(id),
        tag_id integer references tags(id)
    );
    create view short_titles as select * from books where length(title) < 5;
    insert into books (id, title) values (1, 'Dune'), (2, 'Emma'), (3, 'Ulysses');
    insert into tags (id, name) values (1, 'classic'), (2, 'scifi'), (3, 'romance');
    insert into book_tags (book_id, tag_id) values
        (1, 1), (1, 2), (2, 1), (2, 3), (3, 1), (3, 1);
";

fn executor(name: &str) -> Arc<SqliteExecutor> {
    let mut executor = SqliteExecutor::new();
    executor.attach("library", DatabaseLocation::InMemory(name.to_string())).expect("attach");
    executor.execute_batch("library", SEED).expect("seed");
    Arc::new(executor)
}

fn setup(name: &str) -> FacetEngine {
    FacetEngine::sqlite(executor(name), Arc::new(Metadata::default()), FacetSettings::default())
}

fn books() -> BaseQuery {
    BaseQuery::table("library", "books")
}

fn graph() -> ForeignKeyGraph {
    let mut graph = ForeignKeyGraph::new();
    for table in ["books", "tags", "book_tags", "authors"] {
        graph.add_table(table);
    }
    graph.add_edge(ForeignKeyEdge::new("book_tags", "book_id", "books", "id"));
    graph.add_edge(ForeignKeyEdge::new("book_tags", "tag_id", "tags", "pk"));
    graph
}

#[test]
fn junction_is_found_from_either_side() {
    let graph = graph();
    assert_eq!(
        find_junction(&graph, "books", "tags"),
        Some(Junction {
            table: "book_tags".into(),
            column_to_base: "book_id".into(),
            base_primary_key: "id".into(),
            column_to_destination: "tag_id".into(),
        })
    );
    let reverse = find_junction(&graph, "tags", "books").expect("junction");
    assert_eq!(reverse.column_to_base, "tag_id");
    assert_eq!(reverse.base_primary_key, "pk");
    assert_eq!(find_junction(&graph, "books", "authors"), None);
    assert_eq!(junction_destinations(&graph, "books"), vec!["tags".to_string()]);
    assert!(junction_destinations(&graph, "missing_view").is_empty());
}

#[test]
fn edges_to_missing_tables_are_dropped() {
    let mut graph = graph();
    assert!(!graph.add_edge(ForeignKeyEdge::new("book_tags", "ghost_id", "ghosts", "id")));
    assert_eq!(graph.get("book_tags").unwrap().outgoing.len(), 2);
}

#[test]
fn self_referencing_junction() {
    let mut graph = ForeignKeyGraph::new();
    graph.add_table("users");
    graph.add_table("follows");
    graph.add_edge(ForeignKeyEdge::new("follows", "follower_id", "users", "id"));
    graph.add_edge(ForeignKeyEdge::new("follows", "followed_id", "users", "id"));
    assert_eq!(junction_destinations(&graph, "users"), vec!["users".to_string()]);
    let junction = find_junction(&graph, "users", "users").expect("junction");
    assert_eq!(junction.column_to_base, "follower_id");
    assert_eq!(junction.column_to_destination, "followed_id");
}

#[test]
fn sqlite_graph_matches_declared_keys() {
    let schema = SqliteSchema::new(executor("m2m_graph"));
    let graph = schema.foreign_keys("library").expect("graph");
    assert_eq!(graph.get("books").unwrap().incoming.len(), 2);
    assert_eq!(graph.get("reviews").unwrap().outgoing.len(), 3);
    assert!(graph.get("short_titles").is_none());
    assert_eq!(junction_destinations(&graph, "books"), vec!["tags".to_string()]);
}

#[tokio::test]
async fn suggests_destination_through_junction() {
    let engine = setup("m2m_suggest");
    let filter = QueryString::parse("/library/books", "");
    let page = engine.facets(&books(), &filter, true).await.expect("facets ok");
    let m2m: Vec<&str> = page
        .suggested
        .iter()
        .filter(|s| s.facet_type == FacetType::ManyToMany)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(m2m, vec!["tags"]);

    let filter = QueryString::parse("/library/books", "_facet_m2m=tags");
    let page = engine.facets(&books(), &filter, true).await.expect("facets ok");
    assert!(!page.suggested.iter().any(|s| s.facet_type == FacetType::ManyToMany));
}

#[tokio::test]
async fn views_get_no_many_to_many_suggestions() {
    let engine = setup("m2m_view");
    let filter = QueryString::parse("/library/short_titles", "");
    let query = BaseQuery::table("library", "short_titles");
    let page = engine.facets(&query, &filter, true).await.expect("facets ok");
    assert!(!page.suggested.iter().any(|s| s.facet_type == FacetType::ManyToMany));
}

#[tokio::test]
async fn counts_distinct_base_rows_per_destination() {
    let engine = setup("m2m_counts");
    let filter = QueryString::parse("/library/books", "_facet_m2m=tags");
    let page = engine.facets(&books(), &filter, false).await.expect("facets ok");
    let tags = page.facets.get_typed(FacetType::ManyToMany, "tags").expect("tags facet");
    let counts: Vec<(i64, &str, u64)> = tags
        .results
        .iter()
        .map(|e| (e.value.as_i64().unwrap(), e.label.as_str(), e.count))
        .collect();
    // book 3 is tagged classic twice but counts once
    assert_eq!(counts, vec![(1, "classic", 3), (2, "scifi", 1), (3, "romance", 1)]);
    assert!(!tags.truncated);
    assert_eq!(tags.toggle_url, "/library/books");
}

#[tokio::test]
async fn counts_are_restricted_to_the_base_query() {
    let engine = setup("m2m_restricted");
    let query = BaseQuery {
        sql: "select * from books where id <= 2".into(),
        ..books()
    };
    let filter = QueryString::parse("/library/books", "_facet_m2m=tags");
    let page = engine.facets(&query, &filter, false).await.expect("facets ok");
    let tags = page.facets.get_typed(FacetType::ManyToMany, "tags").expect("tags facet");
    let classic = tags.results.iter().find(|e| e.label == "classic").unwrap();
    assert_eq!(classic.count, 2);
}

#[tokio::test]
async fn selection_uses_through_token() {
    let engine = setup("m2m_selected");
    let token = ThroughToken::new("book_tags", "tag_id", "2").to_token();
    assert_eq!(token, r#"{"column":"tag_id","table":"book_tags","value":"2"}"#);
    let filter = QueryString::new(
        "/library/books",
        vec![("_facet_m2m".into(), "tags".into()), (THROUGH_KEY.into(), token.clone())],
    );
    let page = engine.facets(&books(), &filter, false).await.expect("facets ok");
    let tags = page.facets.get_typed(FacetType::ManyToMany, "tags").expect("tags facet");
    for entry in &tags.results {
        assert_eq!(entry.selected, entry.label == "scifi");
    }
    let scifi = tags.results.iter().find(|e| e.label == "scifi").unwrap();
    assert_eq!(scifi.toggle_url, "/library/books?_facet_m2m=tags");
    let classic = tags.results.iter().find(|e| e.label == "classic").unwrap();
    let toggled = QueryString::parse("/library/books", classic.toggle_url.split_once('?').unwrap().1);
    let through: Vec<ThroughToken> = sqlfacet::filter::FilterState::pairs(&toggled)
        .iter()
        .filter(|(k, _)| k == THROUGH_KEY)
        .map(|(_, v)| ThroughToken::parse(v).expect("token"))
        .collect();
    assert_eq!(
        through,
        vec![ThroughToken::new("book_tags", "tag_id", "2"), ThroughToken::new("book_tags", "tag_id", "1")]
    );
}

#[tokio::test]
async fn missing_junction_yields_no_data() {
    let engine = setup("m2m_missing");
    let filter = QueryString::parse("/library/books", "_facet_m2m=tags&_facet_m2m=reviewers");
    let page = engine.facets(&books(), &filter, false).await.expect("facets ok");
    assert!(page.facets.get_typed(FacetType::ManyToMany, "tags").is_none());
    assert!(page.facets.get_typed(FacetType::ManyToMany, "reviewers").is_none());
    assert!(page.facets.timed_out.is_empty());
    assert!(page.facets.failed.is_empty());
}

#[tokio::test]
async fn raw_sql_has_no_many_to_many_facets() {
    let engine = setup("m2m_raw_sql");
    let query = BaseQuery::sql("library", "select * from books", vec![]);
    let filter = QueryString::parse("/library", "_facet_m2m=tags");
    let page = engine.facets(&query, &filter, true).await.expect("facets ok");
    assert!(page.facets.is_empty());
    assert!(!page.suggested.iter().any(|s| s.facet_type == FacetType::ManyToMany));
}
