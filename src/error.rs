//! Typed error hierarchy.
//!
//! Every fallible operation in the catalog, analyzer, and recommendation
//! layers returns one of these instead of a bare `anyhow::Error`, so call
//! sites can pattern-match on failure class without re-deriving context from
//! a string message. `main.rs` and the HTTP handlers are the only places
//! that collapse these into an exit code or a status code.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load config file {path}: {source}")]
    Layered {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("required config key missing: {0}")]
    MissingKey(&'static str),

    #[error("configured path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("no analyzed data backs any of the requested simalgo fallbacks (requested, bliss, musly, essentia)")]
    NoUsableSimalgo,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("catalog row not found for id {0}")]
    NotFound(i64),

    #[error("catalog row not found for path {0}")]
    PathNotFound(String),
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("failed to spawn analyzer child process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("analyzer child process exited with status {0}")]
    ChildFailed(i32),

    #[error("analyzer child process produced no output before exiting")]
    NoOutput,

    #[error("analyzer child process output could not be decoded: {0}")]
    BadOutput(String),

    #[error("tags missing or unreadable for {0}")]
    Tags(PathBuf),

    #[error("no enabled analyzer applies to {0}")]
    NoApplicableAnalyzer(PathBuf),
}

/// A file's terminal classification in the analysis pipeline (§4.3/§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Ok,
    Error(String),
    Filtered(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("similarity index has no rows")]
    Empty,

    #[error("jukebox serialization error: {0}")]
    Jukebox(String),
}

/// Errors surfaced to an HTTP client. The `Display` text is what a client
/// sees; detailed context is logged server-side before conversion, never
/// forwarded verbatim (§7 ambient error taxonomy).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("internal error")]
    Internal,
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            ApiError::MissingParam(_) | ApiError::InvalidParam { .. } => actix_web::http::StatusCode::BAD_REQUEST,
            ApiError::Internal => actix_web::http::StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
