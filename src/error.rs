use thiserror::Error;

use crate::models::ReportPeriod;

pub type Result<T, E = StockError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Failed to parse filing: {0}")]
    Parse(String),

    #[error("Invalid report period: {0}")]
    InvalidPeriod(String),

    #[error("Stock not found: {0}")]
    StockNotFound(String),

    #[error("Missing income sheet for {symbol} {period}, needed to derive single-quarter figures")]
    MissingPriorSeason { symbol: String, period: ReportPeriod },

    #[error("Query template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MOPS request failed with status {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
