use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("print spooler failed: {0}")]
    Spooler(String),

    #[error("store unavailable: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
