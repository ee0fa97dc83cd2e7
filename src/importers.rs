//! CSV loaders for reference data: stock list, daily prices, balance sheets,
//! cash flows, quarterly income statements and announcement keys.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::announce::handler::{build_income_sheet, QuarterFigures};
use crate::database::DatabaseManager;
use crate::error::{Result, StockError};
use crate::models::{
    AnnouncementRef, BalanceSheet, CashFlow, DailyPrice, IncomeSheet, ReportPeriod, Season, SheetSource, Stock, StockStatus,
};

/// Rows written and rows skipped by one import
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Which statement file `import_statements` is reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

/// Symbol to stock id lookups, remembering misses
pub(crate) struct StockIds<'a> {
    db: &'a DatabaseManager,
    cache: HashMap<String, Option<i64>>,
}

impl<'a> StockIds<'a> {
    pub(crate) fn new(db: &'a DatabaseManager) -> Self {
        Self {
            db,
            cache: HashMap::new(),
        }
    }

    pub(crate) async fn lookup(&mut self, symbol: &str) -> Result<Option<i64>> {
        if let Some(id) = self.cache.get(symbol) {
            return Ok(*id);
        }
        let id = self.db.get_stock_by_symbol(symbol).await?.and_then(|s| s.id);
        if id.is_none() {
            warn!("⚠️  Unknown stock {}, skipping its rows", symbol);
        }
        self.cache.insert(symbol.to_string(), id);
        Ok(id)
    }
}

pub(crate) fn read_rows<T, R>(reader: R) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

fn open(path: &Path) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| {
        StockError::Io(std::io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
    })
}

/// The row's period, or `None` (logged) when the season is out of range
fn report_period(symbol: &str, year: i32, season: u8) -> Option<ReportPeriod> {
    match Season::new(season) {
        Ok(season) => Some(ReportPeriod::new(year, season)),
        Err(e) => {
            warn!("⚠️  Skipping {} {} row: {}", symbol, year, e);
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct StockRow {
    symbol: String,
    company_name: String,
    industry: Option<String>,
    market: Option<String>,
    status: Option<String>,
}

pub async fn import_stocks<R: Read>(db: &DatabaseManager, reader: R) -> Result<ImportReport> {
    let rows: Vec<StockRow> = read_rows(reader)?;
    let mut report = ImportReport::default();

    for row in rows {
        if row.symbol.is_empty() {
            report.skipped += 1;
            continue;
        }
        let stock = Stock {
            industry: row.industry.filter(|s| !s.is_empty()),
            market: row.market.filter(|s| !s.is_empty()),
            status: StockStatus::parse(row.status.as_deref()),
            ..Stock::new(&row.symbol, &row.company_name)
        };
        db.upsert_stock(&stock).await?;
        report.imported += 1;
    }

    info!("✅ Imported {} stocks", report.imported);
    Ok(report)
}

pub async fn import_stocks_csv(db: &DatabaseManager, path: impl AsRef<Path>) -> Result<ImportReport> {
    import_stocks(db, open(path.as_ref())?).await
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    symbol: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: f64,
    volume: Option<i64>,
    pe_ratio: Option<f64>,
}

pub async fn import_prices<R: Read>(db: &DatabaseManager, reader: R) -> Result<ImportReport> {
    let rows: Vec<PriceRow> = read_rows(reader)?;
    let mut ids = StockIds::new(db);
    let mut report = ImportReport::default();

    for row in rows {
        let Some(stock_id) = ids.lookup(&row.symbol).await? else {
            report.skipped += 1;
            continue;
        };
        db.upsert_daily_price(&DailyPrice {
            stock_id,
            date: row.date,
            open_price: row.open,
            high_price: row.high,
            low_price: row.low,
            close_price: row.close,
            volume: row.volume,
            pe_ratio: row.pe_ratio,
        })
        .await?;
        report.imported += 1;
    }

    info!("✅ Imported {} daily prices ({} skipped)", report.imported, report.skipped);
    Ok(report)
}

pub async fn import_prices_csv(db: &DatabaseManager, path: impl AsRef<Path>) -> Result<ImportReport> {
    import_prices(db, open(path.as_ref())?).await
}

#[derive(Debug, Deserialize)]
struct IncomeRow {
    symbol: String,
    year: i32,
    season: u8,
    operating_revenue: f64,
    gross_profit: f64,
    operating_income: f64,
    profit_before_tax: f64,
    net_income: f64,
    eps: f64,
}

#[derive(Debug, Deserialize)]
struct BalanceRow {
    symbol: String,
    year: i32,
    season: u8,
    total_assets: f64,
    total_liabilities: f64,
    total_equity: f64,
    current_assets: Option<f64>,
    current_liabilities: Option<f64>,
    cash_and_equivalents: Option<f64>,
    inventory: Option<f64>,
    accounts_receivable: Option<f64>,
    book_value_per_share: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CashFlowRow {
    symbol: String,
    year: i32,
    season: u8,
    operating_cash_flow: f64,
    investing_cash_flow: f64,
    financing_cash_flow: f64,
    capital_expenditures: Option<f64>,
    free_cash_flow: Option<f64>,
}

/// Import one statement file. Income rows hold single-quarter figures; margins
/// and YoY growth are derived the same way as for announcements.
pub async fn import_statements<R: Read>(db: &DatabaseManager, kind: StatementKind, reader: R) -> Result<ImportReport> {
    let mut ids = StockIds::new(db);
    let mut report = ImportReport::default();

    match kind {
        StatementKind::Income => {
            let mut rows: Vec<IncomeRow> = read_rows(reader)?;
            // oldest first so YoY can see last year's rows from the same file
            rows.sort_by_key(|r| (r.year, r.season));
            for row in rows {
                let Some(stock_id) = ids.lookup(&row.symbol).await? else {
                    report.skipped += 1;
                    continue;
                };
                let Some(period) = report_period(&row.symbol, row.year, row.season) else {
                    report.skipped += 1;
                    continue;
                };
                let last_year = db.get_income_sheet(stock_id, period.same_season_last_year()).await?;
                let figures = QuarterFigures {
                    operating_revenue: row.operating_revenue,
                    gross_profit: row.gross_profit,
                    operating_income: row.operating_income,
                    profit_before_tax: row.profit_before_tax,
                    net_income: row.net_income,
                    eps: row.eps,
                };
                let sheet = build_income_sheet(stock_id, period, figures, last_year.as_ref());
                db.upsert_income_sheet(&IncomeSheet {
                    source: SheetSource::Statement,
                    ..sheet
                })
                .await?;
                report.imported += 1;
            }
        }
        StatementKind::Balance => {
            let rows: Vec<BalanceRow> = read_rows(reader)?;
            for row in rows {
                let Some(stock_id) = ids.lookup(&row.symbol).await? else {
                    report.skipped += 1;
                    continue;
                };
                let Some(period) = report_period(&row.symbol, row.year, row.season) else {
                    report.skipped += 1;
                    continue;
                };
                db.upsert_balance_sheet(&BalanceSheet {
                    stock_id,
                    period,
                    total_assets: row.total_assets,
                    total_liabilities: row.total_liabilities,
                    total_equity: row.total_equity,
                    current_assets: row.current_assets,
                    current_liabilities: row.current_liabilities,
                    cash_and_equivalents: row.cash_and_equivalents,
                    inventory: row.inventory,
                    accounts_receivable: row.accounts_receivable,
                    book_value_per_share: row.book_value_per_share,
                })
                .await?;
                report.imported += 1;
            }
        }
        StatementKind::CashFlow => {
            let rows: Vec<CashFlowRow> = read_rows(reader)?;
            for row in rows {
                let Some(stock_id) = ids.lookup(&row.symbol).await? else {
                    report.skipped += 1;
                    continue;
                };
                let Some(period) = report_period(&row.symbol, row.year, row.season) else {
                    report.skipped += 1;
                    continue;
                };
                db.upsert_cash_flow(&CashFlow {
                    stock_id,
                    period,
                    operating_cash_flow: row.operating_cash_flow,
                    investing_cash_flow: row.investing_cash_flow,
                    financing_cash_flow: row.financing_cash_flow,
                    capital_expenditures: row.capital_expenditures,
                    free_cash_flow: row.free_cash_flow,
                })
                .await?;
                report.imported += 1;
            }
        }
    }

    info!("✅ Imported {} {:?} rows ({} skipped)", report.imported, kind, report.skipped);
    Ok(report)
}

pub async fn import_statements_csv(
    db: &DatabaseManager,
    kind: StatementKind,
    path: impl AsRef<Path>,
) -> Result<ImportReport> {
    import_statements(db, kind, open(path.as_ref())?).await
}

/// Announcement keys (`symbol,spoke_date,spoke_time,seq_no`)
pub fn read_announcement_refs<R: Read>(reader: R) -> Result<Vec<AnnouncementRef>> {
    read_rows(reader)
}

pub fn read_announcement_refs_csv(path: impl AsRef<Path>) -> Result<Vec<AnnouncementRef>> {
    read_announcement_refs(open(path.as_ref())?)
}
