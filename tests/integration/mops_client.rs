//! MopsClient against a stubbed MOPS server

use assert_matches::assert_matches;
use tw_stocks::announce::{AnnouncementSource, MopsClient};
use tw_stocks::StockError;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{logging, test_data};

#[tokio::test]
async fn test_fetch_filing_posts_detail_form() {
    logging::init_test_logging();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mops/web/ajax_t05st01"))
        .and(body_string_contains("step=2"))
        .and(body_string_contains("co_id=2330"))
        .and(body_string_contains("spoke_date=1131017"))
        .and(body_string_contains("seq_no=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>filing</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = MopsClient::new(&server.uri(), 600).unwrap();
    let html = client
        .fetch_filing(&test_data::announcement_ref("2330", "1131017", "1"))
        .await
        .unwrap();
    assert_eq!(html, "<html>filing</html>");
}

#[tokio::test]
async fn test_server_error_is_reported_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = MopsClient::new(&server.uri(), 600).unwrap();
    let err = client
        .fetch_filing(&test_data::announcement_ref("2330", "1131017", "1"))
        .await
        .unwrap_err();
    assert_matches!(err, StockError::HttpStatus { status: 503, .. });
}

#[test]
fn test_invalid_base_url_is_config_error() {
    assert!(matches!(MopsClient::new("not a url", 10), Err(StockError::Config(_))));
}
