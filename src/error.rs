//! Error types for iopsdash

use thiserror::Error;

/// Result type alias for iopsdash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for iopsdash
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP error fetching {location}: {status}")]
    HttpStatusError {
        location: String,
        status: reqwest::StatusCode,
    },

    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("No data available for chart {0}")]
    NoData(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("A load is already in progress")]
    Busy,

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    TemplateError(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Whether this error belongs to the load failure family (fetch, status or parse)
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Error::HttpError(_)
                | Error::HttpStatusError { .. }
                | Error::FileReadError { .. }
                | Error::JsonError(_)
                | Error::UrlError(_)
        )
    }
}
