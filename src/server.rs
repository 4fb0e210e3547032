use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::engine::{FacetEngine, FacetPage};
use crate::error::FacetError;
use crate::executor::json_to_value;
use crate::facet::BaseQuery;
use crate::filter::QueryString;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FacetEngine>,
    pub databases: Arc<Vec<String>>,
}

#[derive(Deserialize)]
pub struct FacetRequest {
    pub database: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub params: Vec<serde_json::Value>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query_string: String,
    #[serde(default = "default_suggest")]
    pub suggest: bool,
}

fn default_suggest() -> bool {
    true
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub status: String,
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(e: FacetError) -> ApiError {
    let status = match e {
        FacetError::InvalidConfiguration(_) | FacetError::FacetNotAllowed => StatusCode::BAD_REQUEST,
        FacetError::UnknownDatabase(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let msg = format!("{e}");
    warn!(%msg, code = %status.as_u16(), "facet request error");
    (status, Json(ErrorBody { status: "error".into(), error: msg }))
}

impl AppState {
    fn check_database(&self, database: &str) -> Result<(), ApiError> {
        if self.databases.iter().any(|d| d == database) {
            Ok(())
        } else {
            Err(api_error(FacetError::UnknownDatabase(database.to_string())))
        }
    }
}

async fn table_facets(
    State(state): State<AppState>,
    Path((database, table)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Json<FacetPage>, ApiError> {
    state.check_database(&database)?;
    let filter = QueryString::parse(&format!("/{database}/{table}"), query.as_deref().unwrap_or(""));
    let base = BaseQuery::table(&database, &table);
    let page = state.engine.facets(&base, &filter, true).await.map_err(api_error)?;
    Ok(Json(page))
}

async fn query_facets(
    State(state): State<AppState>,
    Json(req): Json<FacetRequest>,
) -> Result<Json<FacetPage>, ApiError> {
    state.check_database(&req.database)?;
    let base = match (&req.table, &req.sql) {
        (Some(table), None) => BaseQuery::table(&req.database, table),
        (None, Some(sql)) => BaseQuery::sql(&req.database, sql, req.params.iter().map(json_to_value).collect()),
        _ => {
            return Err(api_error(FacetError::InvalidConfiguration(
                "provide exactly one of table or sql".into(),
            )));
        }
    };
    let path = req.path.clone().unwrap_or_else(|| format!("/{}", req.database));
    let filter = QueryString::parse(&path, &req.query_string);
    let page = state.engine.facets(&base, &filter, req.suggest).await.map_err(api_error)?;
    Ok(Json(page))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/v1/facets", post(query_facets))
        .route("/:database/:table", get(table_facets))
        .layer(cors)
        .with_state(state)
}
