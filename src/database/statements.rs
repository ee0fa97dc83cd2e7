use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{period_from_row, DatabaseManager};
use crate::error::Result;
use crate::models::{BalanceSheet, CashFlow, IncomeSheet, MonthRevenue, ReportPeriod, SheetSource};

impl DatabaseManager {
    pub async fn upsert_income_sheet(&self, sheet: &IncomeSheet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO income_sheets (
                stock_id, year, season, operating_revenue, gross_profit, operating_income,
                profit_before_tax, net_income, eps, gross_margin, operating_margin,
                pre_tax_margin, net_margin, revenue_yoy, gross_profit_yoy,
                operating_income_yoy, net_income_yoy, eps_yoy, source, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_id, year, season) DO UPDATE SET
                operating_revenue = excluded.operating_revenue,
                gross_profit = excluded.gross_profit,
                operating_income = excluded.operating_income,
                profit_before_tax = excluded.profit_before_tax,
                net_income = excluded.net_income,
                eps = excluded.eps,
                gross_margin = excluded.gross_margin,
                operating_margin = excluded.operating_margin,
                pre_tax_margin = excluded.pre_tax_margin,
                net_margin = excluded.net_margin,
                revenue_yoy = excluded.revenue_yoy,
                gross_profit_yoy = excluded.gross_profit_yoy,
                operating_income_yoy = excluded.operating_income_yoy,
                net_income_yoy = excluded.net_income_yoy,
                eps_yoy = excluded.eps_yoy,
                source = excluded.source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(sheet.stock_id)
        .bind(sheet.period.year)
        .bind(sheet.period.season.get() as i64)
        .bind(sheet.operating_revenue)
        .bind(sheet.gross_profit)
        .bind(sheet.operating_income)
        .bind(sheet.profit_before_tax)
        .bind(sheet.net_income)
        .bind(sheet.eps)
        .bind(sheet.gross_margin)
        .bind(sheet.operating_margin)
        .bind(sheet.pre_tax_margin)
        .bind(sheet.net_margin)
        .bind(sheet.revenue_yoy)
        .bind(sheet.gross_profit_yoy)
        .bind(sheet.operating_income_yoy)
        .bind(sheet.net_income_yoy)
        .bind(sheet.eps_yoy)
        .bind(sheet.source.as_str())
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_income_sheet(&self, stock_id: i64, period: ReportPeriod) -> Result<Option<IncomeSheet>> {
        let row = sqlx::query("SELECT * FROM income_sheets WHERE stock_id = ? AND year = ? AND season = ?")
            .bind(stock_id)
            .bind(period.year)
            .bind(period.season.get() as i64)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(income_sheet_from_row).transpose()
    }

    /// All stored quarters of one year, ordered by season
    pub async fn get_income_sheets_for_year(&self, stock_id: i64, year: i32) -> Result<Vec<IncomeSheet>> {
        let rows = sqlx::query("SELECT * FROM income_sheets WHERE stock_id = ? AND year = ? ORDER BY season")
            .bind(stock_id)
            .bind(year)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(income_sheet_from_row).collect()
    }

    pub async fn upsert_balance_sheet(&self, sheet: &BalanceSheet) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO balance_sheets (
                stock_id, year, season, total_assets, total_liabilities, total_equity,
                current_assets, current_liabilities, cash_and_equivalents, inventory,
                accounts_receivable, book_value_per_share, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_id, year, season) DO UPDATE SET
                total_assets = excluded.total_assets,
                total_liabilities = excluded.total_liabilities,
                total_equity = excluded.total_equity,
                current_assets = excluded.current_assets,
                current_liabilities = excluded.current_liabilities,
                cash_and_equivalents = excluded.cash_and_equivalents,
                inventory = excluded.inventory,
                accounts_receivable = excluded.accounts_receivable,
                book_value_per_share = excluded.book_value_per_share,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(sheet.stock_id)
        .bind(sheet.period.year)
        .bind(sheet.period.season.get() as i64)
        .bind(sheet.total_assets)
        .bind(sheet.total_liabilities)
        .bind(sheet.total_equity)
        .bind(sheet.current_assets)
        .bind(sheet.current_liabilities)
        .bind(sheet.cash_and_equivalents)
        .bind(sheet.inventory)
        .bind(sheet.accounts_receivable)
        .bind(sheet.book_value_per_share)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_balance_sheet(&self, stock_id: i64, period: ReportPeriod) -> Result<Option<BalanceSheet>> {
        let row = sqlx::query("SELECT * FROM balance_sheets WHERE stock_id = ? AND year = ? AND season = ?")
            .bind(stock_id)
            .bind(period.year)
            .bind(period.season.get() as i64)
            .fetch_optional(self.pool())
            .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        Ok(Some(BalanceSheet {
            stock_id: r.get("stock_id"),
            period: period_from_row(&r)?,
            total_assets: r.get("total_assets"),
            total_liabilities: r.get("total_liabilities"),
            total_equity: r.get("total_equity"),
            current_assets: r.get("current_assets"),
            current_liabilities: r.get("current_liabilities"),
            cash_and_equivalents: r.get("cash_and_equivalents"),
            inventory: r.get("inventory"),
            accounts_receivable: r.get("accounts_receivable"),
            book_value_per_share: r.get("book_value_per_share"),
        }))
    }

    pub async fn upsert_cash_flow(&self, cash_flow: &CashFlow) -> Result<()> {
        let free_cash_flow = cash_flow
            .free_cash_flow
            .unwrap_or_else(|| cash_flow.derive_free_cash_flow());

        sqlx::query(
            r#"
            INSERT INTO cash_flows (
                stock_id, year, season, operating_cash_flow, investing_cash_flow,
                financing_cash_flow, capital_expenditures, free_cash_flow, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_id, year, season) DO UPDATE SET
                operating_cash_flow = excluded.operating_cash_flow,
                investing_cash_flow = excluded.investing_cash_flow,
                financing_cash_flow = excluded.financing_cash_flow,
                capital_expenditures = excluded.capital_expenditures,
                free_cash_flow = excluded.free_cash_flow,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cash_flow.stock_id)
        .bind(cash_flow.period.year)
        .bind(cash_flow.period.season.get() as i64)
        .bind(cash_flow.operating_cash_flow)
        .bind(cash_flow.investing_cash_flow)
        .bind(cash_flow.financing_cash_flow)
        .bind(cash_flow.capital_expenditures)
        .bind(free_cash_flow)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_cash_flow(&self, stock_id: i64, period: ReportPeriod) -> Result<Option<CashFlow>> {
        let row = sqlx::query("SELECT * FROM cash_flows WHERE stock_id = ? AND year = ? AND season = ?")
            .bind(stock_id)
            .bind(period.year)
            .bind(period.season.get() as i64)
            .fetch_optional(self.pool())
            .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        Ok(Some(CashFlow {
            stock_id: r.get("stock_id"),
            period: period_from_row(&r)?,
            operating_cash_flow: r.get("operating_cash_flow"),
            investing_cash_flow: r.get("investing_cash_flow"),
            financing_cash_flow: r.get("financing_cash_flow"),
            capital_expenditures: r.get("capital_expenditures"),
            free_cash_flow: r.get("free_cash_flow"),
        }))
    }

    pub async fn upsert_month_revenue(&self, revenue: &MonthRevenue) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO month_revenues (
                stock_id, year, month, revenue, mom_growth, yoy_growth,
                cumulative_revenue, cumulative_yoy_growth, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_id, year, month) DO UPDATE SET
                revenue = excluded.revenue,
                mom_growth = excluded.mom_growth,
                yoy_growth = excluded.yoy_growth,
                cumulative_revenue = excluded.cumulative_revenue,
                cumulative_yoy_growth = excluded.cumulative_yoy_growth,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(revenue.stock_id)
        .bind(revenue.year)
        .bind(revenue.month as i64)
        .bind(revenue.revenue)
        .bind(revenue.mom_growth)
        .bind(revenue.yoy_growth)
        .bind(revenue.cumulative_revenue)
        .bind(revenue.cumulative_yoy_growth)
        .bind(Utc::now())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn get_month_revenue(&self, stock_id: i64, year: i32, month: u32) -> Result<Option<MonthRevenue>> {
        let row = sqlx::query("SELECT * FROM month_revenues WHERE stock_id = ? AND year = ? AND month = ?")
            .bind(stock_id)
            .bind(year)
            .bind(month as i64)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.as_ref().map(month_revenue_from_row))
    }

    /// Inclusive range of months, oldest first
    pub async fn get_month_revenues_between(
        &self,
        stock_id: i64,
        from: (i32, u32),
        to: (i32, u32),
    ) -> Result<Vec<MonthRevenue>> {
        let from_key = from.0 as i64 * 12 + from.1 as i64;
        let to_key = to.0 as i64 * 12 + to.1 as i64;

        let rows = sqlx::query(
            r#"
            SELECT * FROM month_revenues
            WHERE stock_id = ? AND (year * 12 + month) BETWEEN ? AND ?
            ORDER BY year, month
            "#,
        )
        .bind(stock_id)
        .bind(from_key)
        .bind(to_key)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(month_revenue_from_row).collect())
    }
}

fn income_sheet_from_row(r: &SqliteRow) -> Result<IncomeSheet> {
    Ok(IncomeSheet {
        stock_id: r.get("stock_id"),
        period: period_from_row(r)?,
        operating_revenue: r.get("operating_revenue"),
        gross_profit: r.get("gross_profit"),
        operating_income: r.get("operating_income"),
        profit_before_tax: r.get("profit_before_tax"),
        net_income: r.get("net_income"),
        eps: r.get("eps"),
        gross_margin: r.get("gross_margin"),
        operating_margin: r.get("operating_margin"),
        pre_tax_margin: r.get("pre_tax_margin"),
        net_margin: r.get("net_margin"),
        revenue_yoy: r.get("revenue_yoy"),
        gross_profit_yoy: r.get("gross_profit_yoy"),
        operating_income_yoy: r.get("operating_income_yoy"),
        net_income_yoy: r.get("net_income_yoy"),
        eps_yoy: r.get("eps_yoy"),
        source: SheetSource::parse(&r.get::<String, _>("source")),
    })
}

fn month_revenue_from_row(r: &SqliteRow) -> MonthRevenue {
    MonthRevenue {
        stock_id: r.get("stock_id"),
        year: r.get::<i64, _>("year") as i32,
        month: r.get::<i64, _>("month") as u32,
        revenue: r.get("revenue"),
        mom_growth: r.get("mom_growth"),
        yoy_growth: r.get("yoy_growth"),
        cumulative_revenue: r.get("cumulative_revenue"),
        cumulative_yoy_growth: r.get("cumulative_yoy_growth"),
    }
}
