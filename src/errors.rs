//! Error types for s3scope

use thiserror::Error;

/// Main error type for s3scope
#[derive(Error, Debug)]
pub enum S3ScopeError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Preview error: {0}")]
    Preview(String),

    #[error("Terminal error: {0}")]
    Terminal(String),
}

pub type Result<T> = std::result::Result<T, S3ScopeError>;
