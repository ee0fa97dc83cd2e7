use tracing::{debug, info};

use super::parser::{parse_filing, CumulativeFigures, ParsedFiling};
use crate::database::DatabaseManager;
use crate::error::{Result, StockError};
use crate::models::{IncomeSheet, ReportPeriod, SheetSource, Stock};

/// Single-quarter figures derived from a cumulative filing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarterFigures {
    pub operating_revenue: f64,
    pub gross_profit: f64,
    pub operating_income: f64,
    pub profit_before_tax: f64,
    pub net_income: f64,
    pub eps: f64,
}

impl From<CumulativeFigures> for QuarterFigures {
    fn from(c: CumulativeFigures) -> Self {
        Self {
            operating_revenue: c.operating_revenue,
            gross_profit: c.gross_profit,
            operating_income: c.operating_income,
            profit_before_tax: c.profit_before_tax,
            net_income: c.net_income,
            eps: c.eps,
        }
    }
}

/// Outcome of handling one filing page
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFiling {
    pub title: Option<String>,
    pub sheet: IncomeSheet,
}

/// Turns a year-to-date filing into a single-quarter income sheet
pub struct AnnounceHandler<'a> {
    db: &'a DatabaseManager,
}

impl<'a> AnnounceHandler<'a> {
    pub fn new(db: &'a DatabaseManager) -> Self {
        Self { db }
    }

    /// Parse `html`, derive quarter figures, margins and YoY growth, and store the sheet.
    ///
    /// `period_hint` wins over the period recognised from the page subject.
    pub async fn process(
        &self,
        stock: &Stock,
        html: &str,
        period_hint: Option<ReportPeriod>,
    ) -> Result<ProcessedFiling> {
        let stock_id = stock
            .id
            .ok_or_else(|| StockError::StockNotFound(stock.symbol.clone()))?;

        let ParsedFiling { title, period, figures } = parse_filing(html)?;
        let period = period_hint.or(period).ok_or_else(|| {
            StockError::Parse(format!(
                "could not determine reporting period from title {:?}",
                title.as_deref().unwrap_or("")
            ))
        })?;
        debug!("{} filing for {}: {:?}", stock.symbol, period, figures);

        let prior = self.db.get_income_sheets_for_year(stock_id, period.year).await?;
        let quarter = quarterize(&stock.symbol, figures, period, &prior)?;

        let last_year = self.db.get_income_sheet(stock_id, period.same_season_last_year()).await?;
        let sheet = build_income_sheet(stock_id, period, quarter, last_year.as_ref());

        self.db.upsert_income_sheet(&sheet).await?;
        info!(
            "📈 {} {}: revenue {:.0}, EPS {:.2}, revenue YoY {}",
            stock.symbol,
            period,
            sheet.operating_revenue,
            sheet.eps,
            sheet.revenue_yoy.map(|v| format!("{:.1}%", v)).unwrap_or_else(|| "n/a".to_string())
        );

        Ok(ProcessedFiling { title, sheet })
    }
}

/// Subtract earlier quarters of the same year from a cumulative filing.
///
/// Season 1 is already a single quarter. For later seasons every earlier
/// season of that year must be present in `stored`.
pub fn quarterize(
    symbol: &str,
    cumulative: CumulativeFigures,
    period: ReportPeriod,
    stored: &[IncomeSheet],
) -> Result<QuarterFigures> {
    let mut quarter = QuarterFigures::from(cumulative);

    for season in period.season.earlier() {
        let earlier = stored
            .iter()
            .find(|s| s.period.year == period.year && s.period.season == season)
            .ok_or_else(|| StockError::MissingPriorSeason {
                symbol: symbol.to_string(),
                period: ReportPeriod::new(period.year, season),
            })?;

        quarter.operating_revenue -= earlier.operating_revenue;
        quarter.gross_profit -= earlier.gross_profit;
        quarter.operating_income -= earlier.operating_income;
        quarter.profit_before_tax -= earlier.profit_before_tax;
        quarter.net_income -= earlier.net_income;
        quarter.eps -= earlier.eps;
    }

    // EPS is reported to two decimals; keep subtraction noise out of storage
    quarter.eps = (quarter.eps * 100.0).round() / 100.0;
    Ok(quarter)
}

/// `part / revenue` in percent, `None` when revenue is zero
pub fn margin(part: f64, revenue: f64) -> Option<f64> {
    if revenue == 0.0 {
        None
    } else {
        Some(part / revenue * 100.0)
    }
}

/// Growth of `current` over `previous` in percent, relative to |previous|
pub fn growth(current: f64, previous: Option<f64>) -> Option<f64> {
    match previous {
        Some(prev) if prev != 0.0 => Some((current - prev) / prev.abs() * 100.0),
        _ => None,
    }
}

pub fn build_income_sheet(
    stock_id: i64,
    period: ReportPeriod,
    q: QuarterFigures,
    last_year: Option<&IncomeSheet>,
) -> IncomeSheet {
    IncomeSheet {
        stock_id,
        period,
        operating_revenue: q.operating_revenue,
        gross_profit: q.gross_profit,
        operating_income: q.operating_income,
        profit_before_tax: q.profit_before_tax,
        net_income: q.net_income,
        eps: q.eps,
        gross_margin: margin(q.gross_profit, q.operating_revenue),
        operating_margin: margin(q.operating_income, q.operating_revenue),
        pre_tax_margin: margin(q.profit_before_tax, q.operating_revenue),
        net_margin: margin(q.net_income, q.operating_revenue),
        revenue_yoy: growth(q.operating_revenue, last_year.map(|s| s.operating_revenue)),
        gross_profit_yoy: growth(q.gross_profit, last_year.map(|s| s.gross_profit)),
        operating_income_yoy: growth(q.operating_income, last_year.map(|s| s.operating_income)),
        net_income_yoy: growth(q.net_income, last_year.map(|s| s.net_income)),
        eps_yoy: growth(q.eps, last_year.map(|s| s.eps)),
        source: SheetSource::Announcement,
    }
}
