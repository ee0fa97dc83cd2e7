use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::filter_models::{CandidateMetrics, FilterModel};
use super::period::{reference_month, reference_season, trailing_months};
use super::template::{QueryTemplates, TemplateValue};
use super::valuation::{moving_average, percentile};
use crate::database::DatabaseManager;
use crate::error::Result;
use crate::models::{ReportPeriod, ScreenerSettings};

const CANDIDATES_QUERY: &str = "candidates";
const REVENUE_HIGH_WINDOW_MONTHS: usize = 12;

/// Outcome of one screening run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub date: NaiveDate,
    pub reference_season: ReportPeriod,
    pub reference_month: (i32, u32),
    pub candidates: usize,
    /// Filter model name to matching symbols
    pub matches: BTreeMap<String, Vec<String>>,
}

impl ScreeningReport {
    pub fn total_recommendations(&self) -> usize {
        self.matches.values().map(Vec::len).sum()
    }
}

pub struct StockScreenerManager {
    db: DatabaseManager,
    templates: QueryTemplates,
    settings: ScreenerSettings,
}

impl StockScreenerManager {
    pub fn new(db: DatabaseManager, templates: QueryTemplates, settings: ScreenerSettings) -> Self {
        Self { db, templates, settings }
    }

    /// Screen every candidate as of `date` and store that date's recommendations
    pub async fn run(&self, date: NaiveDate) -> Result<ScreeningReport> {
        let season = reference_season(date);
        let month = reference_month(date);
        info!("🔍 Screening as of {} (season {}, month {}-{:02})", date, season, month.0, month.1);

        let mut model_ids = Vec::with_capacity(FilterModel::ALL.len());
        for model in FilterModel::ALL {
            let id = self.db.ensure_filter_model(model.name(), model.description()).await?;
            model_ids.push((model, id));
        }

        let candidates = self.candidate_metrics(date, season, month).await?;
        info!("📊 {} candidates with reference data", candidates.len());

        let mut rows = Vec::new();
        let mut matches: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for candidate in &candidates {
            for (model, model_id) in &model_ids {
                if model.evaluate(candidate, &self.settings) {
                    debug!("{} matched {}", candidate.symbol, model.name());
                    rows.push((candidate.stock_id, *model_id));
                    matches
                        .entry(model.name().to_string())
                        .or_default()
                        .push(candidate.symbol.clone());
                }
            }
        }

        self.db.replace_recommendations(date, &rows).await?;

        let report = ScreeningReport {
            date,
            reference_season: season,
            reference_month: month,
            candidates: candidates.len(),
            matches,
        };
        info!("✅ Stored {} recommendations for {}", report.total_recommendations(), date);
        Ok(report)
    }

    /// Candidates from the `candidates` template, enriched with price,
    /// P/E, trailing revenue and cash flow data
    pub async fn candidate_metrics(
        &self,
        date: NaiveDate,
        season: ReportPeriod,
        month: (i32, u32),
    ) -> Result<Vec<CandidateMetrics>> {
        let prepared = self.templates.prepare(CANDIDATES_QUERY)?;
        let mut values: HashMap<&str, TemplateValue> = HashMap::new();
        values.insert("year", season.year.into());
        values.insert("season", (season.season.get() as i64).into());
        values.insert("month_year", month.0.into());
        values.insert("month", month.1.into());

        let rows = prepared.bind(&values)?.fetch_all(self.db.pool()).await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut metrics = metrics_from_row(row);
            match self.enrich(&mut metrics, date, season, month).await {
                Ok(()) => candidates.push(metrics),
                Err(e) => warn!("⚠️  Skipping {}: {}", metrics.symbol, e),
            }
        }
        Ok(candidates)
    }

    async fn enrich(
        &self,
        metrics: &mut CandidateMetrics,
        date: NaiveDate,
        season: ReportPeriod,
        (year, month): (i32, u32),
    ) -> Result<()> {
        let stock_id = metrics.stock_id;

        let closes = self.db.get_recent_closes(stock_id, date, self.settings.ma_days).await?;
        metrics.moving_average = moving_average(&closes);

        let lookback = Months::new(12 * self.settings.pe_lookback_years.max(0) as u32);
        let from = date.checked_sub_months(lookback).unwrap_or(NaiveDate::MIN);
        let pe_history = self.db.get_pe_ratios_between(stock_id, from, date).await?;
        metrics.pe_at_percentile = percentile(&pe_history, self.settings.pe_percentile);

        let window = trailing_months(year, month, REVENUE_HIGH_WINDOW_MONTHS);
        if let Some(&start) = window.first() {
            let revenues = self.db.get_month_revenues_between(stock_id, start, (year, month)).await?;
            metrics.trailing_revenue_max = revenues.iter().map(|r| r.revenue).reduce(f64::max);
        }

        if let Some(cash_flow) = self.db.get_cash_flow(stock_id, season).await? {
            metrics.operating_cash_flow = Some(cash_flow.operating_cash_flow);
            metrics.free_cash_flow = Some(
                cash_flow
                    .free_cash_flow
                    .unwrap_or_else(|| cash_flow.derive_free_cash_flow()),
            );
        }

        Ok(())
    }
}

fn metrics_from_row(row: &SqliteRow) -> CandidateMetrics {
    CandidateMetrics {
        stock_id: row.get("stock_id"),
        symbol: row.get("symbol"),
        company_name: row.get("company_name"),
        eps: row.get("eps"),
        eps_ttm: row.get("eps_ttm"),
        ttm_seasons: row.get("ttm_seasons"),
        gross_margin: row.get("gross_margin"),
        operating_margin: row.get("operating_margin"),
        prev_gross_margin: row.get("prev_gross_margin"),
        prev_operating_margin: row.get("prev_operating_margin"),
        month_revenue: row.get("month_revenue"),
        revenue_yoy: row.get("revenue_yoy"),
        ..CandidateMetrics::default()
    }
}
