use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, StockError};
use crate::models::{DailyPrice, ReportPeriod, Season, Stock, StockStatus};

mod screening;
mod statements;

/// SQLx-backed store for stocks, statements, prices and screening output
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (or create) the database file and apply migrations
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        info!("💾 Database ready at {}", database_path);
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A single long-lived connection keeps the in-memory database alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upsert a stock keyed by symbol, returning its row id
    pub async fn upsert_stock(&self, stock: &Stock) -> Result<i64> {
        let last_updated = stock.last_updated.unwrap_or_else(Utc::now);

        let row = sqlx::query(
            r#"
            INSERT INTO stocks (symbol, company_name, industry, market, status, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                company_name = excluded.company_name,
                industry = excluded.industry,
                market = excluded.market,
                status = excluded.status,
                last_updated = excluded.last_updated
            RETURNING id
            "#,
        )
        .bind(&stock.symbol)
        .bind(&stock.company_name)
        .bind(&stock.industry)
        .bind(&stock.market)
        .bind(stock.status.as_str())
        .bind(last_updated)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    pub async fn get_stock_by_symbol(&self, symbol: &str) -> Result<Option<Stock>> {
        let row = sqlx::query(
            r#"
            SELECT id, symbol, company_name, industry, market, status, last_updated
            FROM stocks
            WHERE symbol = ?
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(stock_from_row))
    }

    /// Like `get_stock_by_symbol` but a missing stock is an error
    pub async fn require_stock(&self, symbol: &str) -> Result<Stock> {
        self.get_stock_by_symbol(symbol)
            .await?
            .ok_or_else(|| StockError::StockNotFound(symbol.to_string()))
    }

    pub async fn get_active_stocks(&self) -> Result<Vec<Stock>> {
        let rows = sqlx::query(
            r#"
            SELECT id, symbol, company_name, industry, market, status, last_updated
            FROM stocks
            WHERE status = 'active'
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(stock_from_row).collect())
    }

    pub async fn upsert_daily_price(&self, price: &DailyPrice) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_prices (stock_id, date, open_price, high_price, low_price, close_price, volume, pe_ratio)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_id, date) DO UPDATE SET
                open_price = excluded.open_price,
                high_price = excluded.high_price,
                low_price = excluded.low_price,
                close_price = excluded.close_price,
                volume = excluded.volume,
                pe_ratio = excluded.pe_ratio
            "#,
        )
        .bind(price.stock_id)
        .bind(price.date)
        .bind(price.open_price)
        .bind(price.high_price)
        .bind(price.low_price)
        .bind(price.close_price)
        .bind(price.volume)
        .bind(price.pe_ratio)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent `limit` closes on or before `date`, newest first
    pub async fn get_recent_closes(&self, stock_id: i64, date: NaiveDate, limit: usize) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            r#"
            SELECT close_price
            FROM daily_prices
            WHERE stock_id = ? AND date <= ?
            ORDER BY date DESC
            LIMIT ?
            "#,
        )
        .bind(stock_id)
        .bind(date)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get::<f64, _>("close_price")).collect())
    }

    /// Positive P/E ratios published between `from` and `to` inclusive
    pub async fn get_pe_ratios_between(&self, stock_id: i64, from: NaiveDate, to: NaiveDate) -> Result<Vec<f64>> {
        let rows = sqlx::query(
            r#"
            SELECT pe_ratio
            FROM daily_prices
            WHERE stock_id = ? AND date BETWEEN ? AND ? AND pe_ratio > 0
            ORDER BY date
            "#,
        )
        .bind(stock_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get::<f64, _>("pe_ratio")).collect())
    }

    /// Row counts per table, for the CLI status output
    pub async fn get_stats(&self) -> Result<Vec<(&'static str, i64)>> {
        let mut stats = Vec::new();
        for table in [
            "stocks",
            "income_sheets",
            "balance_sheets",
            "cash_flows",
            "month_revenues",
            "daily_prices",
            "announcements",
            "recommended_stocks",
        ] {
            let row = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}", table))
                .fetch_one(&self.pool)
                .await?;
            stats.push((table, row.get::<i64, _>("count")));
        }
        Ok(stats)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn stock_from_row(r: &SqliteRow) -> Stock {
    Stock {
        id: Some(r.get::<i64, _>("id")),
        symbol: r.get::<String, _>("symbol"),
        company_name: r.get::<String, _>("company_name"),
        industry: r.get::<Option<String>, _>("industry"),
        market: r.get::<Option<String>, _>("market"),
        status: StockStatus::parse(r.get::<Option<String>, _>("status").as_deref()),
        last_updated: r.get::<Option<DateTime<Utc>>, _>("last_updated"),
    }
}

/// Reads the `year`/`season` columns shared by all statement tables
fn period_from_row(r: &SqliteRow) -> Result<ReportPeriod> {
    let year = r.get::<i64, _>("year") as i32;
    let season = Season::new(r.get::<i64, _>("season") as u8)?;
    Ok(ReportPeriod::new(year, season))
}
