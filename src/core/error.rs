//! Error type shared by every stage of the pipeline.

use thiserror::Error;

/// Errors raised by the library.
///
/// Per-posting variants (`Resolution`, `Dns`, `Verification`, `Dispatch`,
/// `Transport`, `Template`) are contained by the loop that processes that
/// posting. `Config` and `Initialization` are only produced before a run
/// starts.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Listing source unavailable: {0}")]
    Fetch(String),

    #[error("Contact resolution failed: {0}")]
    Resolution(String),

    #[error("DNS lookup failed: {0}")]
    Dns(String),

    #[error("Identity verification failed: {0}")]
    Verification(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Message transport error: {0}")]
    Transport(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, AppError>;
