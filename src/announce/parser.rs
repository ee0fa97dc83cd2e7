//! Extraction of self-reported income figures from a MOPS announcement page.
//!
//! The detail page renders its figures in the fifth `<table>` of the document.
//! Rows are read by fixed offset; the first cell holds the item label and the
//! second cell the cumulative amount for the current fiscal year to date.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::number::parse_accounting_number;
use crate::error::{Result, StockError};
use crate::models::{ReportPeriod, Season};

/// Zero-based index of the figures table on the detail page
pub const FIGURES_TABLE_INDEX: usize = 4;
/// Column holding the current cumulative amount
pub const CURRENT_AMOUNT_COLUMN: usize = 1;

/// Offset between the Minguo calendar and the Gregorian calendar
pub const ROC_YEAR_OFFSET: i32 = 1911;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("Failed to parse table selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Failed to parse row selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").expect("Failed to parse cell selector"));

static SEASON_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)(\d{2,4})\s*年\s*度?\s*(?:第|前)\s*([一二三四1-4])\s*季")
        .expect("Failed to compile season title regex")
});
static ANNUAL_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\D)(\d{2,4})\s*年\s*度").expect("Failed to compile annual title regex")
});

/// Year-to-date figures exactly as reported in the filing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativeFigures {
    pub operating_revenue: f64,
    pub gross_profit: f64,
    pub operating_income: f64,
    pub profit_before_tax: f64,
    pub net_income: f64,
    pub eps: f64,
}

/// A parsed filing page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFiling {
    pub title: Option<String>,
    pub period: Option<ReportPeriod>,
    pub figures: CumulativeFigures,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Revenue,
    GrossProfit,
    OperatingIncome,
    ProfitBeforeTax,
    NetIncome,
    Eps,
}

/// (field, row offset, label keyword)
const ROW_LAYOUT: [(Field, usize, &str); 6] = [
    (Field::Revenue, 1, "營業收入"),
    (Field::GrossProfit, 2, "毛利"),
    (Field::OperatingIncome, 3, "營業利益"),
    (Field::ProfitBeforeTax, 4, "稅前"),
    (Field::NetIncome, 5, "淨利"),
    (Field::Eps, 6, "每股盈餘"),
];

/// Parse the whole detail page: subject line, period and figures
pub fn parse_filing(html: &str) -> Result<ParsedFiling> {
    let document = Html::parse_document(html);

    let title = find_subject(&document);
    let period = title.as_deref().and_then(parse_title);
    let figures = extract_figures(&document)?;

    Ok(ParsedFiling { title, period, figures })
}

fn extract_figures(document: &Html) -> Result<CumulativeFigures> {
    let table = document.select(&TABLE).nth(FIGURES_TABLE_INDEX).ok_or_else(|| {
        StockError::Parse(format!("expected at least {} tables on the page", FIGURES_TABLE_INDEX + 1))
    })?;

    let rows: Vec<ElementRef> = table.select(&ROW).collect();

    let mut figures = CumulativeFigures {
        operating_revenue: 0.0,
        gross_profit: 0.0,
        operating_income: 0.0,
        profit_before_tax: 0.0,
        net_income: 0.0,
        eps: 0.0,
    };

    for (field, offset, keyword) in ROW_LAYOUT {
        let row = rows
            .get(offset)
            .ok_or_else(|| StockError::Parse(format!("figures table has no row {}", offset)))?;
        let cells: Vec<String> = row.select(&CELL).map(cell_text).collect();

        if let Some(label) = cells.first() {
            if !label.contains(keyword) {
                warn!("Row {} label {:?} does not mention {}; reading by offset", offset, label, keyword);
            }
        }

        let raw = cells.get(CURRENT_AMOUNT_COLUMN).ok_or_else(|| {
            StockError::Parse(format!("row {} has no column {}", offset, CURRENT_AMOUNT_COLUMN))
        })?;
        let value = parse_accounting_number(raw)
            .ok_or_else(|| StockError::Parse(format!("row {} value {:?} is not a number", offset, raw)))?;

        match field {
            Field::Revenue => figures.operating_revenue = value,
            Field::GrossProfit => figures.gross_profit = value,
            Field::OperatingIncome => figures.operating_income = value,
            Field::ProfitBeforeTax => figures.profit_before_tax = value,
            Field::NetIncome => figures.net_income = value,
            Field::Eps => figures.eps = value,
        }
    }

    Ok(figures)
}

/// The cell following a `主旨` (subject) header cell
fn find_subject(document: &Html) -> Option<String> {
    for row in document.select(&ROW) {
        let cells: Vec<String> = row.select(&CELL).map(cell_text).collect();
        if let Some(pos) = cells.iter().position(|c| c.contains("主旨")) {
            if let Some(subject) = cells.get(pos + 1) {
                if !subject.is_empty() {
                    return Some(subject.clone());
                }
            }
        }
    }
    None
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<Vec<_>>().join("").trim().to_string()
}

/// Recognise the reporting period from an announcement title.
///
/// `113年第3季`, `113年第三季` and `113年前三季` map to the given season of
/// 2024; `113年度` (full year) maps to season 4. A four-digit year is taken
/// as Gregorian.
pub fn parse_title(title: &str) -> Option<ReportPeriod> {
    if let Some(caps) = SEASON_TITLE.captures(title) {
        let year = title_year(&caps[1])?;
        let season = match &caps[2] {
            "一" | "1" => Season::Q1,
            "二" | "2" => Season::Q2,
            "三" | "3" => Season::Q3,
            "四" | "4" => Season::Q4,
            _ => return None,
        };
        return Some(ReportPeriod::new(year, season));
    }

    let caps = ANNUAL_TITLE.captures(title)?;
    Some(ReportPeriod::new(title_year(&caps[1])?, Season::Q4))
}

fn title_year(digits: &str) -> Option<i32> {
    let year: i32 = digits.parse().ok()?;
    if digits.len() == 4 {
        Some(year)
    } else {
        Some(year + ROC_YEAR_OFFSET)
    }
}
