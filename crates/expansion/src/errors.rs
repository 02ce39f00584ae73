//! Expansion engine error types

use refgraph_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpansionError {
    /// The document text as a whole cannot be parsed
    #[error("Parse validation failed: {0}")]
    ParseValidation(String),

    /// Acquisition query carries neither title nor author
    #[error("Invalid acquisition query: {0}")]
    InvalidQuery(String),

    #[error("Expansion run cancelled")]
    Cancelled,

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("Unsupported seed file {path}: {reason}")]
    UnsupportedSeed { path: String, reason: String },

    #[error("Invalid run parameters: {0}")]
    InvalidRequest(String),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Graph store error: {0}")]
    Store(#[from] AppError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExpansionError>;

impl From<ExpansionError> for AppError {
    fn from(e: ExpansionError) -> Self {
        match e {
            ExpansionError::ParseValidation(message) => AppError::ParseValidation { message },
            ExpansionError::InvalidQuery(message) | ExpansionError::InvalidRequest(message) => {
                AppError::Validation {
                    message,
                    field: None,
                }
            }
            ExpansionError::Cancelled => AppError::RunCancelled,
            ExpansionError::Pdf(message) => AppError::InvalidFormat { message },
            ExpansionError::UnsupportedSeed { path, reason } => AppError::InvalidFormat {
                message: format!("{}: {}", path, reason),
            },
            ExpansionError::HttpClient(inner) => AppError::HttpClient(inner),
            ExpansionError::Store(inner) => inner,
            ExpansionError::Io(inner) => inner.into(),
        }
    }
}
