//! Announcements fetched over HTTP, turned into single-quarter sheets

use pretty_assertions::assert_eq;
use tw_stocks::announce::{ingest_announcements, IngestReport, MopsClient};
use tw_stocks::models::{ReportPeriod, Season, SheetSource};
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::test_data::{announcement_ref, create_test_stock, filing_page, FilingFigures};
use crate::common::{database, logging};

async fn serve_filing(server: &MockServer, spoke_date: &str, subject: &str, figures: FilingFigures) {
    Mock::given(method("POST"))
        .and(body_string_contains(format!("spoke_date={}", spoke_date)))
        .respond_with(ResponseTemplate::new(200).set_body_string(filing_page(subject, figures)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cumulative_filings_become_quarters_with_yoy() {
    logging::init_test_logging();
    logging::log_test_step("Ingesting a year of cumulative filings plus the next Q1");

    let test_db = database::init_fresh_test_database().await;
    let db = &test_db.db;
    let stock_id = db.upsert_stock(&create_test_stock("2330", "台積電")).await.unwrap();

    let server = MockServer::start().await;
    let filings = [
        ("1120428", "112年第一季自結損益", FilingFigures::with_revenue(100_000.0, 1.00)),
        ("1120728", "112年第二季自結損益", FilingFigures::with_revenue(220_000.0, 2.20)),
        ("1121027", "112年前三季自結損益", FilingFigures::with_revenue(360_000.0, 3.60)),
        ("1130226", "112年度自結損益", FilingFigures::with_revenue(500_000.0, 5.00)),
        ("1130426", "113年第一季自結損益", FilingFigures::with_revenue(130_000.0, 1.30)),
    ];
    for (date, subject, figures) in filings {
        serve_filing(&server, date, subject, figures).await;
    }

    // deliberately out of order
    let refs = ["1130426", "1121027", "1120428", "1130226", "1120728"]
        .iter()
        .map(|d| announcement_ref("2330", d, "1"))
        .collect();

    let client = MopsClient::new(&server.uri(), 600).unwrap();
    let report = ingest_announcements(db, &client, refs, 4).await;
    assert_eq!(report, IngestReport { processed: 5, skipped: 0, failed: 0 });

    let revenues: Vec<f64> = db
        .get_income_sheets_for_year(stock_id, 2023)
        .await
        .unwrap()
        .iter()
        .map(|s| s.operating_revenue)
        .collect();
    assert_eq!(revenues, vec![100_000.0, 120_000.0, 140_000.0, 140_000.0]);

    let q4 = db.get_income_sheet(stock_id, ReportPeriod::new(2023, Season::Q4)).await.unwrap().unwrap();
    assert_eq!(q4.eps, 1.4);
    assert_eq!(q4.source, SheetSource::Announcement);
    assert_eq!(q4.gross_margin, Some(50.0));

    let q1 = db.get_income_sheet(stock_id, ReportPeriod::new(2024, Season::Q1)).await.unwrap().unwrap();
    assert_eq!(q1.revenue_yoy, Some(30.0));
    let eps_yoy = q1.eps_yoy.unwrap();
    assert!((eps_yoy - 30.0).abs() < 1e-9);

    // a second run finds everything processed
    let refs = vec![announcement_ref("2330", "1130426", "1")];
    let again = ingest_announcements(db, &client, refs, 4).await;
    assert_eq!(again, IngestReport { processed: 0, skipped: 1, failed: 0 });
}

#[tokio::test]
async fn test_missing_earlier_quarter_leaves_announcement_pending() {
    let test_db = database::init_fresh_test_database().await;
    let db = &test_db.db;
    db.upsert_stock(&create_test_stock("2317", "鴻海")).await.unwrap();

    let server = MockServer::start().await;
    serve_filing(&server, "1131114", "113年前三季自結損益", FilingFigures::with_revenue(300_000.0, 7.5)).await;

    let client = MopsClient::new(&server.uri(), 600).unwrap();
    let report = ingest_announcements(db, &client, vec![announcement_ref("2317", "1131114", "2")], 1).await;
    assert_eq!(report.failed, 1);

    let pending = db.get_unprocessed_announcements().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reference.seq_no, "2");
    assert!(pending[0].last_error.as_deref().unwrap().contains("Missing income sheet"));
}
