use thiserror::Error;

#[derive(Error, Debug)]
pub enum FacetError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid facet configuration: {0}")]
    InvalidConfiguration(String),
    #[error("_facet= is not allowed")]
    FacetNotAllowed,
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Query interrupted")]
    Interrupted,
    #[error("Metadata error: {0}")]
    Metadata(String),
    #[error("Join error: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, FacetError>;

// Helper conversions
impl From<rusqlite::Error> for FacetError {
    fn from(e: rusqlite::Error) -> Self { Self::Query(e.to_string()) }
}
impl From<config::ConfigError> for FacetError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for FacetError {
    fn from(e: serde_json::Error) -> Self { Self::Metadata(e.to_string()) }
}
impl From<tokio::task::JoinError> for FacetError {
    fn from(e: tokio::task::JoinError) -> Self { Self::Join(e.to_string()) }
}
