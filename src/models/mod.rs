use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, StockError};

/// Core stock information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    pub id: Option<i64>,
    pub symbol: String,
    pub company_name: String,
    pub industry: Option<String>,
    pub market: Option<String>,
    pub status: StockStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Stock {
    pub fn new(symbol: &str, company_name: &str) -> Self {
        Self {
            id: None,
            symbol: symbol.to_string(),
            company_name: company_name.to_string(),
            industry: None,
            market: None,
            status: StockStatus::Active,
            last_updated: None,
        }
    }
}

/// Stock status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StockStatus {
    #[default]
    Active,
    Delisted,
    Suspended,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Active => "active",
            StockStatus::Delisted => "delisted",
            StockStatus::Suspended => "suspended",
        }
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("delisted") => StockStatus::Delisted,
            Some("suspended") => StockStatus::Suspended,
            _ => StockStatus::Active,
        }
    }
}

/// Fiscal quarter, always within 1..=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Season(u8);

impl Season {
    pub const Q1: Season = Season(1);
    pub const Q2: Season = Season(2);
    pub const Q3: Season = Season(3);
    pub const Q4: Season = Season(4);

    pub fn new(value: u8) -> Result<Self> {
        if (1..=4).contains(&value) {
            Ok(Season(value))
        } else {
            Err(StockError::InvalidPeriod(format!("season {} out of range", value)))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Season containing the given calendar month
    pub fn of_month(month: u32) -> Self {
        Season(((month.clamp(1, 12) - 1) / 3 + 1) as u8)
    }

    /// Seasons strictly before this one in the same year
    pub fn earlier(&self) -> impl Iterator<Item = Season> {
        (1..self.0).map(Season)
    }
}

impl TryFrom<u8> for Season {
    type Error = StockError;

    fn try_from(value: u8) -> Result<Self> {
        Season::new(value)
    }
}

impl From<Season> for u8 {
    fn from(season: Season) -> u8 {
        season.0
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// A (year, season) pair identifying one quarterly report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub year: i32,
    pub season: Season,
}

impl ReportPeriod {
    pub fn new(year: i32, season: Season) -> Self {
        Self { year, season }
    }

    /// Monotonic index used for ordering and window arithmetic
    pub fn ordinal(&self) -> i32 {
        self.year * 4 + (self.season.get() as i32 - 1)
    }

    pub fn from_ordinal(ordinal: i32) -> Self {
        let year = ordinal.div_euclid(4);
        let season = Season(ordinal.rem_euclid(4) as u8 + 1);
        Self { year, season }
    }

    pub fn prev(&self) -> Self {
        Self::from_ordinal(self.ordinal() - 1)
    }

    pub fn next(&self) -> Self {
        Self::from_ordinal(self.ordinal() + 1)
    }

    pub fn same_season_last_year(&self) -> Self {
        Self { year: self.year - 1, season: self.season }
    }
}

impl PartialOrd for ReportPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReportPeriod {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.year, self.season)
    }
}

/// Where an income sheet row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetSource {
    Statement,
    Announcement,
}

impl SheetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetSource::Statement => "statement",
            SheetSource::Announcement => "announcement",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "announcement" => SheetSource::Announcement,
            _ => SheetSource::Statement,
        }
    }
}

/// Single-quarter income statement with derived ratios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSheet {
    pub stock_id: i64,
    pub period: ReportPeriod,
    pub operating_revenue: f64,
    pub gross_profit: f64,
    pub operating_income: f64,
    pub profit_before_tax: f64,
    pub net_income: f64,
    pub eps: f64,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub pre_tax_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub gross_profit_yoy: Option<f64>,
    pub operating_income_yoy: Option<f64>,
    pub net_income_yoy: Option<f64>,
    pub eps_yoy: Option<f64>,
    pub source: SheetSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub stock_id: i64,
    pub period: ReportPeriod,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub total_equity: f64,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub cash_and_equivalents: Option<f64>,
    pub inventory: Option<f64>,
    pub accounts_receivable: Option<f64>,
    pub book_value_per_share: Option<f64>,
}

impl BalanceSheet {
    /// Liabilities over assets, in percent
    pub fn debt_ratio(&self) -> Option<f64> {
        if self.total_assets > 0.0 {
            Some(self.total_liabilities / self.total_assets * 100.0)
        } else {
            None
        }
    }

    pub fn current_ratio(&self) -> Option<f64> {
        match (self.current_assets, self.current_liabilities) {
            (Some(assets), Some(liabilities)) if liabilities > 0.0 => Some(assets / liabilities),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow {
    pub stock_id: i64,
    pub period: ReportPeriod,
    pub operating_cash_flow: f64,
    pub investing_cash_flow: f64,
    pub financing_cash_flow: f64,
    pub capital_expenditures: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

impl CashFlow {
    /// Operating cash flow less capex; falls back to OCF + investing CF
    pub fn derive_free_cash_flow(&self) -> f64 {
        match self.capital_expenditures {
            Some(capex) => self.operating_cash_flow - capex.abs(),
            None => self.operating_cash_flow + self.investing_cash_flow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthRevenue {
    pub stock_id: i64,
    pub year: i32,
    pub month: u32,
    pub revenue: f64,
    pub mom_growth: Option<f64>,
    pub yoy_growth: Option<f64>,
    pub cumulative_revenue: Option<f64>,
    pub cumulative_yoy_growth: Option<f64>,
}

/// Daily closing data with the exchange-published P/E
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPrice {
    pub stock_id: i64,
    pub date: NaiveDate,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: f64,
    pub volume: Option<i64>,
    pub pe_ratio: Option<f64>,
}

/// Key of a MOPS material announcement detail page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnouncementRef {
    pub symbol: String,
    /// ROC date as published, e.g. `1131030`
    pub spoke_date: String,
    pub spoke_time: String,
    pub seq_no: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    pub stock_id: i64,
    pub reference: AnnouncementRef,
    pub title: Option<String>,
    pub processed: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterModelRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedStock {
    pub date: NaiveDate,
    pub stock_id: i64,
    pub symbol: String,
    pub filter_model: String,
}

/// Tunables for the screener
#[derive(Debug, Clone)]
pub struct ScreenerSettings {
    pub ma_days: usize,
    pub pe_lookback_years: i32,
    pub pe_percentile: f64,
    pub revenue_high_ratio: f64,
    pub revenue_growth_min: f64,
}

impl Default for ScreenerSettings {
    fn default() -> Self {
        Self {
            ma_days: 60,
            pe_lookback_years: 5,
            pe_percentile: 0.25,
            revenue_high_ratio: 0.95,
            revenue_growth_min: 20.0,
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub mops_base_url: String,
    pub rate_limit_per_minute: u32,
    pub fetch_concurrency: usize,
    pub screener_template_path: Option<PathBuf>,
    pub screener: ScreenerSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = ScreenerSettings::default();
        let config = Config {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "db/stocks.db".to_string()),
            mops_base_url: std::env::var("MOPS_BASE_URL")
                .unwrap_or_else(|_| "https://mops.twse.com.tw".to_string()),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", 30),
            fetch_concurrency: env_or("FETCH_CONCURRENCY", 4),
            screener_template_path: std::env::var("SCREENER_TEMPLATE_PATH").ok().map(PathBuf::from),
            screener: ScreenerSettings {
                ma_days: env_or("SCREENER_MA_DAYS", defaults.ma_days),
                pe_lookback_years: env_or("SCREENER_PE_LOOKBACK_YEARS", defaults.pe_lookback_years),
                pe_percentile: env_or("SCREENER_PE_PERCENTILE", defaults.pe_percentile),
                revenue_high_ratio: env_or("SCREENER_REVENUE_HIGH_RATIO", defaults.revenue_high_ratio),
                revenue_growth_min: env_or("SCREENER_REVENUE_GROWTH_MIN", defaults.revenue_growth_min),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_per_minute == 0 {
            return Err(StockError::Config("RATE_LIMIT_PER_MINUTE must be positive".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(StockError::Config("FETCH_CONCURRENCY must be positive".into()));
        }
        if self.screener.ma_days == 0 {
            return Err(StockError::Config("SCREENER_MA_DAYS must be positive".into()));
        }
        if self.screener.pe_lookback_years <= 0 {
            return Err(StockError::Config("SCREENER_PE_LOOKBACK_YEARS must be positive".into()));
        }
        if !(self.screener.pe_percentile > 0.0 && self.screener.pe_percentile <= 1.0) {
            return Err(StockError::Config("SCREENER_PE_PERCENTILE must be within (0, 1]".into()));
        }
        if !(self.screener.revenue_high_ratio > 0.0 && self.screener.revenue_high_ratio <= 1.0) {
            return Err(StockError::Config("SCREENER_REVENUE_HIGH_RATIO must be within (0, 1]".into()));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
