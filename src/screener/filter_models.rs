use serde::{Deserialize, Serialize};

use super::valuation::is_undervalued;
use crate::models::ScreenerSettings;

/// Everything the filter models look at for one stock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetrics {
    pub stock_id: i64,
    pub symbol: String,
    pub company_name: String,
    pub eps: Option<f64>,
    pub eps_ttm: Option<f64>,
    /// Number of seasons that contributed to `eps_ttm`
    pub ttm_seasons: i64,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub prev_gross_margin: Option<f64>,
    pub prev_operating_margin: Option<f64>,
    pub month_revenue: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub trailing_revenue_max: Option<f64>,
    pub moving_average: Option<f64>,
    pub pe_at_percentile: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub free_cash_flow: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterModel {
    ValueScreen,
    RevenueNearYearHigh,
    RevenueGrowth,
    MarginExpansion,
    PositiveCashFlow,
}

impl FilterModel {
    pub const ALL: [FilterModel; 5] = [
        FilterModel::ValueScreen,
        FilterModel::RevenueNearYearHigh,
        FilterModel::RevenueGrowth,
        FilterModel::MarginExpansion,
        FilterModel::PositiveCashFlow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterModel::ValueScreen => "value_screen",
            FilterModel::RevenueNearYearHigh => "revenue_near_year_high",
            FilterModel::RevenueGrowth => "revenue_growth",
            FilterModel::MarginExpansion => "margin_expansion",
            FilterModel::PositiveCashFlow => "positive_cash_flow",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FilterModel::ValueScreen => {
                "Profitable, margins holding up year over year, moving-average price below trailing EPS times a low historical P/E"
            }
            FilterModel::RevenueNearYearHigh => "Monthly revenue close to its trailing twelve-month high",
            FilterModel::RevenueGrowth => "Monthly revenue growing year over year",
            FilterModel::MarginExpansion => "Gross and operating margins above the same season last year",
            FilterModel::PositiveCashFlow => "Positive operating and free cash flow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn evaluate(&self, m: &CandidateMetrics, settings: &ScreenerSettings) -> bool {
        match self {
            FilterModel::ValueScreen => value_screen(m),
            FilterModel::RevenueNearYearHigh => match (m.month_revenue, m.trailing_revenue_max) {
                (Some(current), Some(high)) => high > 0.0 && current >= high * settings.revenue_high_ratio,
                _ => false,
            },
            FilterModel::RevenueGrowth => m.revenue_yoy.is_some_and(|g| g >= settings.revenue_growth_min),
            FilterModel::MarginExpansion => {
                strictly_above(m.gross_margin, m.prev_gross_margin)
                    && strictly_above(m.operating_margin, m.prev_operating_margin)
            }
            FilterModel::PositiveCashFlow => {
                m.operating_cash_flow.is_some_and(|v| v > 0.0) && m.free_cash_flow.is_some_and(|v| v > 0.0)
            }
        }
    }
}

fn value_screen(m: &CandidateMetrics) -> bool {
    let Some(eps_ttm) = m.eps_ttm.filter(|_| m.ttm_seasons >= 4) else {
        return false;
    };
    if !(m.eps.is_some_and(|e| e > 0.0) && eps_ttm > 0.0 && m.operating_margin.is_some_and(|v| v > 0.0)) {
        return false;
    }
    if !(not_below(m.gross_margin, m.prev_gross_margin) && not_below(m.operating_margin, m.prev_operating_margin)) {
        return false;
    }

    match (m.moving_average, m.pe_at_percentile) {
        (Some(ma), Some(pe)) => is_undervalued(ma, eps_ttm, pe),
        _ => false,
    }
}

fn not_below(current: Option<f64>, previous: Option<f64>) -> bool {
    matches!((current, previous), (Some(c), Some(p)) if c >= p)
}

fn strictly_above(current: Option<f64>, previous: Option<f64>) -> bool {
    matches!((current, previous), (Some(c), Some(p)) if c > p)
}
