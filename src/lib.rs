//! Taiwan listed-company financial data: MOPS announcement ingestion,
//! statement and revenue storage, and rule-based stock screening.

pub mod announce;
pub mod database;
pub mod error;
pub mod importers;
pub mod logging;
pub mod models;
pub mod revenue;
pub mod screener;

pub use database::DatabaseManager;
pub use error::{Result, StockError};
