use chrono::NaiveDate;
use sqlx::Row;

use super::DatabaseManager;
use crate::error::Result;
use crate::models::{Announcement, AnnouncementRef, FilterModelRecord, RecommendedStock};

impl DatabaseManager {
    /// Insert an announcement once; repeated calls return the same id
    pub async fn record_announcement(&self, stock_id: i64, reference: &AnnouncementRef) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO announcements (stock_id, spoke_date, spoke_time, seq_no)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(stock_id, spoke_date, spoke_time, seq_no) DO UPDATE SET
                seq_no = excluded.seq_no
            RETURNING id
            "#,
        )
        .bind(stock_id)
        .bind(&reference.spoke_date)
        .bind(&reference.spoke_time)
        .bind(&reference.seq_no)
        .fetch_one(self.pool())
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    pub async fn is_announcement_processed(&self, announcement_id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT processed FROM announcements WHERE id = ?")
            .bind(announcement_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|r| r.get::<bool, _>("processed")).unwrap_or(false))
    }

    pub async fn mark_announcement_processed(&self, announcement_id: i64, title: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE announcements SET processed = 1, title = COALESCE(?, title), last_error = NULL WHERE id = ?")
            .bind(title)
            .bind(announcement_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_announcement_failed(&self, announcement_id: i64, error: &str) -> Result<()> {
        sqlx::query("UPDATE announcements SET processed = 0, last_error = ? WHERE id = ?")
            .bind(error)
            .bind(announcement_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_unprocessed_announcements(&self) -> Result<Vec<Announcement>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id, a.stock_id, s.symbol, a.spoke_date, a.spoke_time, a.seq_no,
                   a.title, a.processed, a.last_error
            FROM announcements a
            JOIN stocks s ON s.id = a.stock_id
            WHERE a.processed = 0
            ORDER BY a.spoke_date, a.spoke_time
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|r| Announcement {
                id: r.get("id"),
                stock_id: r.get("stock_id"),
                reference: AnnouncementRef {
                    symbol: r.get("symbol"),
                    spoke_date: r.get("spoke_date"),
                    spoke_time: r.get("spoke_time"),
                    seq_no: r.get("seq_no"),
                },
                title: r.get("title"),
                processed: r.get("processed"),
                last_error: r.get("last_error"),
            })
            .collect())
    }

    /// Register a filter model by name, refreshing its description
    pub async fn ensure_filter_model(&self, name: &str, description: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO filter_models (name, description)
            VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET description = excluded.description
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .fetch_one(self.pool())
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    pub async fn list_filter_models(&self) -> Result<Vec<FilterModelRecord>> {
        let rows = sqlx::query("SELECT id, name, description FROM filter_models ORDER BY name")
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .iter()
            .map(|r| FilterModelRecord {
                id: r.get("id"),
                name: r.get("name"),
                description: r.get("description"),
            })
            .collect())
    }

    /// Replace every recommendation for `date` with `(stock_id, filter_model_id)` pairs
    pub async fn replace_recommendations(&self, date: NaiveDate, rows: &[(i64, i64)]) -> Result<usize> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM recommended_stocks WHERE date = ?")
            .bind(date)
            .execute(&mut *tx)
            .await?;

        for (stock_id, filter_model_id) in rows {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO recommended_stocks (date, stock_id, filter_model_id)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(date)
            .bind(stock_id)
            .bind(filter_model_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    pub async fn get_recommendations(&self, date: NaiveDate) -> Result<Vec<RecommendedStock>> {
        let rows = sqlx::query(
            r#"
            SELECT r.date, r.stock_id, s.symbol, f.name AS filter_model
            FROM recommended_stocks r
            JOIN stocks s ON s.id = r.stock_id
            JOIN filter_models f ON f.id = r.filter_model_id
            WHERE r.date = ?
            ORDER BY f.name, s.symbol
            "#,
        )
        .bind(date)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|r| RecommendedStock {
                date: r.get("date"),
                stock_id: r.get("stock_id"),
                symbol: r.get("symbol"),
                filter_model: r.get("filter_model"),
            })
            .collect())
    }

    /// Most recent date that has recommendations stored
    pub async fn latest_recommendation_date(&self) -> Result<Option<NaiveDate>> {
        let row = sqlx::query("SELECT MAX(date) AS latest FROM recommended_stocks")
            .fetch_one(self.pool())
            .await?;

        Ok(row.get::<Option<NaiveDate>, _>("latest"))
    }
}
