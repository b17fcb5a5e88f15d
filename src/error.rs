use thiserror::Error;

use crate::model::{IdentifierKind, SourceSystem};

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{source_system} integration not configured: {reason}")]
    NotConfigured {
        source_system: SourceSystem,
        reason: String,
    },

    #[error("Invalid lookup key: {0}")]
    InvalidLookupKey(String),

    #[error("{lookup} not found in {source_system}")]
    NotFound {
        source_system: SourceSystem,
        lookup: String,
    },

    #[error("duplicate identifier {kind} {value}")]
    Duplicate {
        kind: IdentifierKind,
        value: String,
    },

    #[error("API error: {message}")]
    Api { message: String },
}

pub type Result<T> = std::result::Result<T, EnrichError>;
