use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::handler::{AnnounceHandler, ProcessedFiling};
use crate::database::DatabaseManager;
use crate::error::{Result, StockError};
use crate::models::{AnnouncementRef, Config, ReportPeriod};

const DETAIL_PATH: &str = "/mops/web/ajax_t05st01";

/// Anything that can return the HTML of an announcement detail page
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnnouncementSource: Send + Sync {
    async fn fetch_filing(&self, reference: &AnnouncementRef) -> Result<String>;
}

/// HTTP client for the MOPS announcement detail endpoint
pub struct MopsClient {
    client: Client,
    detail_url: Url,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl MopsClient {
    pub fn new(base_url: &str, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("tw-stocks/0.1")
            .build()?;

        let detail_url = Url::parse(base_url)
            .and_then(|base| base.join(DETAIL_PATH))
            .map_err(|e| StockError::Config(format!("invalid MOPS base url {}: {}", base_url, e)))?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            detail_url,
            rate_limiter,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.mops_base_url, config.rate_limit_per_minute)
    }
}

#[async_trait]
impl AnnouncementSource for MopsClient {
    async fn fetch_filing(&self, reference: &AnnouncementRef) -> Result<String> {
        self.rate_limiter.until_ready().await;

        let form = [
            ("encodeURIComponent", "1"),
            ("step", "2"),
            ("firstin", "1"),
            ("off", "1"),
            ("co_id", reference.symbol.as_str()),
            ("spoke_date", reference.spoke_date.as_str()),
            ("spoke_time", reference.spoke_time.as_str()),
            ("seq_no", reference.seq_no.as_str()),
        ];

        debug!("Fetching announcement {:?}", reference);
        let response = self
            .client
            .post(self.detail_url.clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StockError::HttpStatus {
                status: status.as_u16(),
                url: self.detail_url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Counts from one ingestion batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestOutcome {
    Processed,
    Skipped,
    Failed,
}

/// Fetch and process many announcements.
///
/// Stocks are handled concurrently (at most `concurrency` at a time), but the
/// filings of one stock run in date order so earlier quarters are stored
/// before later cumulative filings need them.
pub async fn ingest_announcements<S>(
    db: &DatabaseManager,
    source: &S,
    references: Vec<AnnouncementRef>,
    concurrency: usize,
) -> IngestReport
where
    S: AnnouncementSource + ?Sized,
{
    let mut by_symbol: BTreeMap<String, Vec<AnnouncementRef>> = BTreeMap::new();
    for reference in references {
        by_symbol.entry(reference.symbol.clone()).or_default().push(reference);
    }
    info!("🚀 Ingesting announcements for {} stocks", by_symbol.len());

    let outcomes: Vec<Vec<IngestOutcome>> = stream::iter(by_symbol)
        .map(|(symbol, refs)| async move { ingest_symbol(db, source, &symbol, refs).await })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = IngestReport::default();
    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            IngestOutcome::Processed => report.processed += 1,
            IngestOutcome::Skipped => report.skipped += 1,
            IngestOutcome::Failed => report.failed += 1,
        }
    }

    info!(
        "✅ Announcements: {} processed, {} skipped, {} failed",
        report.processed, report.skipped, report.failed
    );
    report
}

/// Fetch, process and record a single announcement.
///
/// Fetch and parse failures are stored on the announcement before the error
/// is returned, so it stays pending for the next run.
pub async fn announce_one<S>(
    db: &DatabaseManager,
    source: &S,
    reference: &AnnouncementRef,
    period_hint: Option<ReportPeriod>,
) -> Result<ProcessedFiling>
where
    S: AnnouncementSource + ?Sized,
{
    let stock = db.require_stock(&reference.symbol).await?;
    let stock_id = stock
        .id
        .ok_or_else(|| StockError::StockNotFound(reference.symbol.clone()))?;
    let announcement_id = db.record_announcement(stock_id, reference).await?;

    let result = match source.fetch_filing(reference).await {
        Ok(html) => AnnounceHandler::new(db).process(&stock, &html, period_hint).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(filing) => {
            db.mark_announcement_processed(announcement_id, filing.title.as_deref())
                .await?;
            Ok(filing)
        }
        Err(e) => {
            db.mark_announcement_failed(announcement_id, &e.to_string()).await?;
            Err(e)
        }
    }
}

/// ROC dates lose a digit before year 100, so shorter dates sort first
fn spoke_order(reference: &AnnouncementRef) -> (usize, &str, &str) {
    (reference.spoke_date.len(), &reference.spoke_date, &reference.spoke_time)
}

async fn ingest_symbol<S>(
    db: &DatabaseManager,
    source: &S,
    symbol: &str,
    mut refs: Vec<AnnouncementRef>,
) -> Vec<IngestOutcome>
where
    S: AnnouncementSource + ?Sized,
{
    let stock = match db.get_stock_by_symbol(symbol).await {
        Ok(Some(stock)) => stock,
        Ok(None) => {
            warn!("⚠️  Unknown stock {}, skipping {} announcements", symbol, refs.len());
            return vec![IngestOutcome::Skipped; refs.len()];
        }
        Err(e) => {
            warn!("⚠️  Failed to load stock {}: {}", symbol, e);
            return vec![IngestOutcome::Failed; refs.len()];
        }
    };
    let Some(stock_id) = stock.id else {
        return vec![IngestOutcome::Failed; refs.len()];
    };

    refs.sort_by(|a, b| spoke_order(a).cmp(&spoke_order(b)));
    let handler = AnnounceHandler::new(db);
    let mut outcomes = Vec::with_capacity(refs.len());

    for reference in refs {
        let announcement_id = match db.record_announcement(stock_id, &reference).await {
            Ok(id) => id,
            Err(e) => {
                warn!("⚠️  Failed to record announcement {:?}: {}", reference, e);
                outcomes.push(IngestOutcome::Failed);
                continue;
            }
        };

        match db.is_announcement_processed(announcement_id).await {
            Ok(true) => {
                debug!("Announcement {:?} already processed", reference);
                outcomes.push(IngestOutcome::Skipped);
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("⚠️  Failed to check announcement {:?}: {}", reference, e);
                outcomes.push(IngestOutcome::Failed);
                continue;
            }
        }

        let result = match source.fetch_filing(&reference).await {
            Ok(html) => handler.process(&stock, &html, None).await,
            Err(e) => Err(e),
        };

        let bookkeeping = match result {
            Ok(filing) => {
                outcomes.push(IngestOutcome::Processed);
                db.mark_announcement_processed(announcement_id, filing.title.as_deref())
                    .await
            }
            Err(e) => {
                warn!("⚠️  {} announcement {}/{} failed: {}", symbol, reference.spoke_date, reference.seq_no, e);
                outcomes.push(IngestOutcome::Failed);
                db.mark_announcement_failed(announcement_id, &e.to_string()).await
            }
        };
        if let Err(e) = bookkeeping {
            warn!("⚠️  Failed to update announcement {}: {}", announcement_id, e);
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Season, Stock};
    use assert_matches::assert_matches;

    fn filing(subject: &str, revenue: &str, eps: &str) -> String {
        let mut html = String::from("<html><body>");
        html.push_str(&format!("<table><tr><th>主旨</th><td>{}</td></tr></table>", subject));
        for _ in 0..3 {
            html.push_str("<table><tr><td>layout</td></tr></table>");
        }
        html.push_str("<table><tr><th>項目</th><th>本期</th></tr>");
        for (label, value) in [
            ("營業收入", revenue),
            ("營業毛利", revenue),
            ("營業利益", revenue),
            ("稅前淨利", revenue),
            ("本期淨利", revenue),
            ("每股盈餘", eps),
        ] {
            html.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>", label, value));
        }
        html.push_str("</table></body></html>");
        html
    }

    fn reference(symbol: &str, date: &str) -> AnnouncementRef {
        AnnouncementRef {
            symbol: symbol.to_string(),
            spoke_date: date.to_string(),
            spoke_time: "170000".to_string(),
            seq_no: "1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_processes_in_date_order_and_skips_unknown() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let stock_id = db.upsert_stock(&Stock::new("2330", "台積電")).await.unwrap();

        let mut source = MockAnnouncementSource::new();
        source.expect_fetch_filing().returning(|r| {
            Ok(match r.spoke_date.as_str() {
                "1130430" => filing("113年第1季自結損益", "100", "1.00"),
                _ => filing("113年第2季自結損益", "250", "2.60"),
            })
        });

        // Q2 listed first; per-stock ordering must still store Q1 before it
        let refs = vec![
            reference("2330", "1130731"),
            reference("2330", "1130430"),
            reference("9999", "1130430"),
        ];
        let report = ingest_announcements(&db, &source, refs, 2).await;
        assert_eq!(report, IngestReport { processed: 2, skipped: 1, failed: 0 });

        let q2 = db
            .get_income_sheet(stock_id, ReportPeriod::new(2024, Season::Q2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(q2.operating_revenue, 150.0);
        assert_eq!(q2.eps, 1.6);
    }

    #[tokio::test]
    async fn test_reingest_skips_processed_and_records_failures() {
        let db = DatabaseManager::in_memory().await.unwrap();
        db.upsert_stock(&Stock::new("2330", "台積電")).await.unwrap();

        let mut source = MockAnnouncementSource::new();
        source.expect_fetch_filing().returning(|r| match r.spoke_date.as_str() {
            "1130430" => Ok(filing("113年第1季自結損益", "100", "1.00")),
            _ => Err(StockError::HttpStatus { status: 503, url: "http://mops".to_string() }),
        });

        let first = ingest_announcements(&db, &source, vec![reference("2330", "1130430")], 1).await;
        assert_eq!(first.processed, 1);

        let second = ingest_announcements(
            &db,
            &source,
            vec![reference("2330", "1130430"), reference("2330", "1130731")],
            1,
        )
        .await;
        assert_eq!(second, IngestReport { processed: 0, skipped: 1, failed: 1 });

        let pending = db.get_unprocessed_announcements().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].last_error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_roc_dates_before_year_100_sort_first() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let stock_id = db.upsert_stock(&Stock::new("2330", "台積電")).await.unwrap();

        let mut source = MockAnnouncementSource::new();
        source.expect_fetch_filing().returning(|r| {
            Ok(match r.spoke_date.as_str() {
                "991029" => filing("99年第3季自結損益", "300", "3.00"),
                _ => filing("99年度自結損益", "420", "4.20"),
            })
        });

        // Q1 and Q2 of 2010 are already stored
        for (season, revenue) in [(Season::Q1, 100.0), (Season::Q2, 100.0)] {
            let figures = crate::announce::handler::QuarterFigures {
                operating_revenue: revenue,
                gross_profit: revenue,
                operating_income: revenue,
                profit_before_tax: revenue,
                net_income: revenue,
                eps: 1.0,
            };
            let sheet = crate::announce::handler::build_income_sheet(stock_id, ReportPeriod::new(2010, season), figures, None);
            db.upsert_income_sheet(&sheet).await.unwrap();
        }

        let refs = vec![reference("2330", "1000301"), reference("2330", "991029")];
        let report = ingest_announcements(&db, &source, refs, 1).await;
        assert_eq!(report, IngestReport { processed: 2, skipped: 0, failed: 0 });

        let q4 = db
            .get_income_sheet(stock_id, ReportPeriod::new(2010, Season::Q4))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(q4.operating_revenue, 120.0);
    }

    #[tokio::test]
    async fn test_announce_one_records_fetch_failure() {
        let db = DatabaseManager::in_memory().await.unwrap();
        db.upsert_stock(&Stock::new("2330", "台積電")).await.unwrap();

        let mut source = MockAnnouncementSource::new();
        source
            .expect_fetch_filing()
            .returning(|_| Err(StockError::HttpStatus { status: 503, url: "http://mops".to_string() }));

        let result = announce_one(&db, &source, &reference("2330", "1130430"), None).await;
        assert_matches!(result, Err(StockError::HttpStatus { status: 503, .. }));

        let pending = db.get_unprocessed_announcements().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].last_error.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_announce_one_with_period_hint() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let stock_id = db.upsert_stock(&Stock::new("2330", "台積電")).await.unwrap();

        let mut source = MockAnnouncementSource::new();
        source
            .expect_fetch_filing()
            .returning(|_| Ok(filing("董事會通過自結損益", "100", "1.00")));

        let hint = ReportPeriod::new(2024, Season::Q1);
        let processed = announce_one(&db, &source, &reference("2330", "1130430"), Some(hint)).await.unwrap();
        assert_eq!(processed.sheet.period, hint);
        assert!(db.get_income_sheet(stock_id, hint).await.unwrap().is_some());
        assert!(db.get_unprocessed_announcements().await.unwrap().is_empty());
    }
}
