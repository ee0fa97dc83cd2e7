//! Quarterly/monthly stock screening.
//!
//! [`StockScreenerManager`] works out which season and month have complete
//! filings for a date, pulls candidates through a JSON SQL template and tags
//! each stock with the filter models it satisfies.

pub mod filter_models;
pub mod manager;
pub mod period;
pub mod template;
pub mod valuation;

pub use filter_models::{CandidateMetrics, FilterModel};
pub use manager::{ScreeningReport, StockScreenerManager};
pub use period::{reference_month, reference_season};
pub use template::QueryTemplates;
