//! Common test utilities and helpers

use std::path::{Path, PathBuf};

/// Test data utilities
pub mod test_data {
    use chrono::NaiveDate;
    use tw_stocks::models::{AnnouncementRef, DailyPrice, Stock};

    pub fn create_test_stock(symbol: &str, company_name: &str) -> Stock {
        Stock {
            industry: Some("半導體業".to_string()),
            market: Some("sii".to_string()),
            ..Stock::new(symbol, company_name)
        }
    }

    pub fn create_test_daily_price(stock_id: i64, date: NaiveDate, close: f64, pe: Option<f64>) -> DailyPrice {
        DailyPrice {
            stock_id,
            date,
            open_price: Some(close),
            high_price: Some(close * 1.01),
            low_price: Some(close * 0.99),
            close_price: close,
            volume: Some(1_000_000),
            pe_ratio: pe,
        }
    }

    pub fn announcement_ref(symbol: &str, spoke_date: &str, seq_no: &str) -> AnnouncementRef {
        AnnouncementRef {
            symbol: symbol.to_string(),
            spoke_date: spoke_date.to_string(),
            spoke_time: "173000".to_string(),
            seq_no: seq_no.to_string(),
        }
    }

    /// Income figures, cumulative for the year to date, in filing row order
    #[derive(Debug, Clone, Copy)]
    pub struct FilingFigures {
        pub revenue: f64,
        pub gross_profit: f64,
        pub operating_income: f64,
        pub profit_before_tax: f64,
        pub net_income: f64,
        pub eps: f64,
    }

    impl FilingFigures {
        /// Fixed 50/40/42/35 percent margins
        pub fn with_revenue(revenue: f64, eps: f64) -> Self {
            Self {
                revenue,
                gross_profit: revenue * 0.5,
                operating_income: revenue * 0.4,
                profit_before_tax: revenue * 0.42,
                net_income: revenue * 0.35,
                eps,
            }
        }
    }

    fn amount(value: f64) -> String {
        let rounded = value.round() as i64;
        let digits = rounded.abs().to_string();
        let mut grouped = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        if rounded < 0 {
            format!("({})", grouped)
        } else {
            grouped
        }
    }

    /// A MOPS-like detail page: the subject sits in an early table and the
    /// figures in the fifth one
    pub fn filing_page(subject: &str, figures: FilingFigures) -> String {
        let rows = [
            ("營業收入", amount(figures.revenue)),
            ("營業毛利(毛損)", amount(figures.gross_profit)),
            ("營業利益(損失)", amount(figures.operating_income)),
            ("稅前淨利(淨損)", amount(figures.profit_before_tax)),
            ("本期淨利(淨損)", amount(figures.net_income)),
            ("基本每股盈餘(元)", format!("{:.2}", figures.eps)),
        ];

        let mut html = String::from("<html><body>");
        html.push_str("<table class=\"noBorder\"><tr><td>公開資訊觀測站</td></tr></table>");
        html.push_str("<table class=\"hasBorder\"><tr><td>公司代號</td><td>2330</td></tr></table>");
        html.push_str(&format!(
            "<table class=\"hasBorder\"><tr><td class=\"tblHead\">主旨</td><td class=\"odd\">{}</td></tr></table>",
            subject
        ));
        html.push_str("<table><tr><td>說明</td></tr></table>");
        html.push_str("<table class=\"hasBorder\"><tr><th>項目</th><th>本期</th><th>去年同期</th></tr>");
        for (label, value) in rows {
            html.push_str(&format!("<tr><td>{}</td><td>&nbsp;{}</td><td>0</td></tr>", label, value));
        }
        html.push_str("</table></body></html>");
        html
    }
}

/// File-backed databases in throwaway directories
pub mod database {
    use tempfile::TempDir;
    use tw_stocks::database::DatabaseManager;

    /// The directory must outlive the manager
    pub struct TestDatabase {
        pub db: DatabaseManager,
        _dir: TempDir,
    }

    pub async fn init_fresh_test_database() -> TestDatabase {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("db").join("stocks.db");
        let db = DatabaseManager::new(&path.to_string_lossy())
            .await
            .expect("Failed to create test database");
        TestDatabase { db, _dir: dir }
    }
}

/// Logging utilities for tests
pub mod logging {
    use std::sync::Once;
    use tracing::info;

    static INIT: Once = Once::new();

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter("tw_stocks=debug")
                .with_test_writer()
                .try_init();
        });
    }

    pub fn log_test_step(step: &str) {
        info!("🧪 Test Step: {}", step);
    }
}

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

/// Write `content` to `name` inside `dir` and return the path
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}
