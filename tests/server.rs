use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use sqlfacet::engine::FacetEngine;
use sqlfacet::executor::{DatabaseLocation, SqliteExecutor};
use sqlfacet::metadata::Metadata;
use sqlfacet::server::{AppState, router};
use sqlfacet::settings::FacetSettings;

fn setup(name: &str, settings: FacetSettings) -> axum::Router {
    let mut executor = SqliteExecutor::new();
    executor.attach("library", DatabaseLocation::InMemory(name.to_string())).expect("attach");
    executor
        .execute_batch(
            "library",
            "
            create table books (id integer primary key, genre text);
            insert into books (genre) values ('fiction'), ('fiction'), ('bio'), ('poetry');
            ",
        )
        .expect("seed");
    let engine = FacetEngine::sqlite(Arc::new(executor), Arc::new(Metadata::default()), settings);
    router(AppState { engine: Arc::new(engine), databases: Arc::new(vec!["library".to_string()]) })
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

fn post(body: Value) -> Request<Body> {
    Request::post("/v1/facets")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn table_facets_with_navigable_toggles() {
    let app = setup("server_table", FacetSettings::default());
    let (status, body) = send(app, get("/library/books?_facet=genre")).await;
    assert_eq!(status, StatusCode::OK);
    let genre = &body["results"][0];
    assert_eq!(genre["name"], "genre");
    assert_eq!(genre["type"], "column");
    assert_eq!(genre["toggle_url"], "/library/books");
    assert_eq!(genre["results"][0]["value"], "fiction");
    assert_eq!(genre["results"][0]["count"], 2);
    assert_eq!(genre["results"][0]["toggle_url"], "/library/books?_facet=genre&genre=fiction");
    assert_eq!(body["timed_out"], json!([]));
    assert!(body["suggested"].is_array());
}

#[tokio::test]
async fn raw_sql_facets() {
    let app = setup("server_sql", FacetSettings::default());
    let request = post(json!({
        "database": "library",
        "sql": "select * from books where genre != ?",
        "params": ["bio"],
        "query_string": "_facet=genre",
        "suggest": false
    }));
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["results"][0]["results"][0]["toggle_url"], "/library?_facet=genre&genre=fiction");
}

#[tokio::test]
async fn unknown_database_is_not_found() {
    let app = setup("server_unknown", FacetSettings::default());
    let (status, body) = send(app, get("/elsewhere/books")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn table_and_sql_together_are_rejected() {
    let app = setup("server_both", FacetSettings::default());
    let request = post(json!({"database": "library", "table": "books", "sql": "select 1"}));
    let (status, _) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let app = setup("server_neither", FacetSettings::default());
    let (status, _) = send(app, post(json!({"database": "library"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_facet_config_is_a_bad_request() {
    let app = setup("server_malformed", FacetSettings::default());
    let (status, body) = send(app, get("/library/books?_facet=%7Bnot+json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("Invalid facet configuration")));
}

#[tokio::test]
async fn disallowed_facets_are_a_bad_request() {
    let settings = FacetSettings { allow_facet: false, ..FacetSettings::default() };
    let app = setup("server_disallowed", settings);
    let (status, _) = send(app, get("/library/books?_facet=genre")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
