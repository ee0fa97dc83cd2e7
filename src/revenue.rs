//! Monthly revenue reports: growth figures and the MOPS CSV layout.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::announce::handler::growth;
use crate::announce::number::parse_accounting_number;
use crate::announce::parser::ROC_YEAR_OFFSET;
use crate::database::DatabaseManager;
use crate::error::Result;
use crate::importers::{read_rows, ImportReport, StockIds};
use crate::models::MonthRevenue;

/// Fill MoM, YoY, year-to-date revenue and year-to-date YoY.
///
/// `earlier_this_year` holds the revenue of every earlier month of the same
/// year; `last_year_to_date` the revenue of last year's months up to and
/// including the same month. An incomplete history leaves the cumulative
/// figures as they are computed from what is present.
pub fn compute_growth(
    mut current: MonthRevenue,
    previous_month: Option<f64>,
    same_month_last_year: Option<f64>,
    earlier_this_year: &[f64],
    last_year_to_date: &[f64],
) -> MonthRevenue {
    current.mom_growth = growth(current.revenue, previous_month);
    current.yoy_growth = growth(current.revenue, same_month_last_year);

    let cumulative = current.revenue + earlier_this_year.iter().sum::<f64>();
    current.cumulative_revenue = Some(cumulative);

    let last_year_cumulative = if last_year_to_date.is_empty() {
        None
    } else {
        Some(last_year_to_date.iter().sum::<f64>())
    };
    current.cumulative_yoy_growth = growth(cumulative, last_year_cumulative);
    current
}

/// Compute growth against stored history and upsert the month
pub async fn store_month_revenue(db: &DatabaseManager, stock_id: i64, year: i32, month: u32, revenue: f64) -> Result<MonthRevenue> {
    let (prev_year, prev_month) = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    let previous = db.get_month_revenue(stock_id, prev_year, prev_month).await?;
    let last_year = db.get_month_revenue(stock_id, year - 1, month).await?;

    let earlier: Vec<f64> = if month > 1 {
        db.get_month_revenues_between(stock_id, (year, 1), (year, month - 1))
            .await?
            .iter()
            .map(|r| r.revenue)
            .collect()
    } else {
        Vec::new()
    };
    let last_year_to_date: Vec<f64> = db
        .get_month_revenues_between(stock_id, (year - 1, 1), (year - 1, month))
        .await?
        .iter()
        .map(|r| r.revenue)
        .collect();

    let row = compute_growth(
        MonthRevenue {
            stock_id,
            year,
            month,
            revenue,
            mom_growth: None,
            yoy_growth: None,
            cumulative_revenue: None,
            cumulative_yoy_growth: None,
        },
        previous.map(|r| r.revenue),
        last_year.map(|r| r.revenue),
        &earlier,
        &last_year_to_date,
    );

    db.upsert_month_revenue(&row).await?;
    Ok(row)
}

#[derive(Debug, Deserialize)]
struct MopsRevenueRow {
    #[serde(rename = "資料年月")]
    data_month: String,
    #[serde(rename = "公司代號")]
    symbol: String,
    #[serde(rename = "營業收入-當月營收")]
    revenue: String,
}

/// `113/10` style ROC year/month; also accepts `11310`
pub fn parse_roc_month(value: &str) -> Option<(i32, u32)> {
    let value = value.trim();
    let (year, month) = match value.split_once('/') {
        Some((y, m)) => (y.trim().parse::<i32>().ok()?, m.trim().parse::<u32>().ok()?),
        None if value.len() > 2 && value.is_ascii() => {
            let (y, m) = value.split_at(value.len() - 2);
            (y.parse::<i32>().ok()?, m.parse::<u32>().ok()?)
        }
        None => return None,
    };
    if !(1..=12).contains(&month) || year <= 0 {
        return None;
    }
    Some((year + ROC_YEAR_OFFSET, month))
}

/// Import a MOPS monthly revenue CSV. Rows are stored oldest month first so
/// growth figures can use months from the same file.
pub async fn import_month_revenue<R: Read>(db: &DatabaseManager, reader: R) -> Result<ImportReport> {
    let rows: Vec<MopsRevenueRow> = read_rows(reader)?;
    let mut parsed = Vec::with_capacity(rows.len());
    let mut report = ImportReport::default();

    for row in rows {
        match (parse_roc_month(&row.data_month), parse_accounting_number(&row.revenue)) {
            (Some((year, month)), Some(revenue)) => parsed.push((year, month, row.symbol, revenue)),
            _ => {
                warn!("⚠️  Unreadable revenue row for {}: {} / {}", row.symbol, row.data_month, row.revenue);
                report.skipped += 1;
            }
        }
    }
    parsed.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut ids = StockIds::new(db);
    for (year, month, symbol, revenue) in parsed {
        let Some(stock_id) = ids.lookup(&symbol).await? else {
            report.skipped += 1;
            continue;
        };
        store_month_revenue(db, stock_id, year, month, revenue).await?;
        report.imported += 1;
    }

    info!("✅ Imported {} monthly revenues ({} skipped)", report.imported, report.skipped);
    Ok(report)
}

pub async fn import_month_revenue_csv(db: &DatabaseManager, path: impl AsRef<Path>) -> Result<ImportReport> {
    let file = std::fs::File::open(path.as_ref())?;
    import_month_revenue(db, file).await
}
