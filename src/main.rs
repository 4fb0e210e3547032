use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sqlfacet::engine::FacetEngine;
use sqlfacet::executor::{DatabaseLocation, SqliteExecutor};
use sqlfacet::metadata::Metadata;
use sqlfacet::server::{AppState, router};
use sqlfacet::settings::Settings;

fn database_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

async fn run(settings: Settings) -> sqlfacet::Result<()> {
    let mut executor = SqliteExecutor::new();
    for path in &settings.databases {
        executor.attach(&database_name(path), DatabaseLocation::File(path.clone()))?;
    }
    let databases: Vec<String> = executor.names().into_iter().map(String::from).collect();
    let metadata = match &settings.metadata {
        Some(path) => Metadata::load(path)?,
        None => Metadata::default(),
    };
    let engine = FacetEngine::sqlite(Arc::new(executor), Arc::new(metadata), settings.facet_settings());
    info!(databases = ?databases, facet_types = ?engine.facet_types(), "engine ready");
    let state = AppState { engine: Arc::new(engine), databases: Arc::new(databases) };
    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .map_err(|e| sqlfacet::FacetError::Config(format!("cannot bind {}: {e}", settings.bind)))?;
    info!(bind = %settings.bind, "listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| sqlfacet::FacetError::Config(e.to_string()))
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1);
    let settings = match Settings::load(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if let Err(e) = run(settings).await {
        error!(error = %e, "sqlfacet stopped");
        std::process::exit(1);
    }
}
