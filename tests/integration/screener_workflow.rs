//! CSV imports feeding a full screening run

use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use std::fmt::Write as _;
use tw_stocks::importers::{self, StatementKind};
use tw_stocks::models::ScreenerSettings;
use tw_stocks::revenue;
use tw_stocks::screener::{QueryTemplates, StockScreenerManager};

use crate::common::{database, logging, write_file};

fn income_csv() -> String {
    let mut csv = String::from(
        "symbol,year,season,operating_revenue,gross_profit,operating_income,profit_before_tax,net_income,eps\n",
    );
    // 2330: margins up year over year, four profitable quarters
    for (year, season, gross, operating) in [(2023, 3, 45, 35), (2023, 4, 48, 38), (2024, 1, 50, 40), (2024, 2, 51, 41), (2024, 3, 52, 42)] {
        writeln!(csv, "2330,{},{},1000,{},{},{},{},10.0", year, season, gross * 10, operating * 10, operating * 10, operating * 8).unwrap();
    }
    // 2317: losing money this season
    writeln!(csv, "2317,2023,3,1000,100,50,50,40,1.0").unwrap();
    writeln!(csv, "2317,2024,3,1000,80,-20,-20,-25,-0.5").unwrap();
    // not listed
    writeln!(csv, "8888,2024,3,1000,100,50,50,40,1.0").unwrap();
    csv
}

fn prices_csv() -> String {
    let mut csv = String::from("date,symbol,open,high,low,close,volume,pe_ratio\n");
    let start = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
    for i in 0..60 {
        let date = start + Duration::days(i);
        // P/E walks 10..=15.9, 25th percentile about 11.5; EPS TTM 40 -> fair price about 460
        writeln!(csv, "{},2330,400,405,395,400,1000,{:.1}", date, 10.0 + i as f64 * 0.1).unwrap();
        writeln!(csv, "{},2317,100,101,99,100,2000,", date).unwrap();
    }
    csv
}

fn revenue_csv() -> String {
    let mut csv = String::from("出表日期,資料年月,公司代號,公司名稱,產業別,營業收入-當月營收\n");
    writeln!(csv, "112/11/10,112/10,2330,台積電,半導體業,\"200,000\"").unwrap();
    for month in 1..=10 {
        let revenue = 200_000 + month * 5_000;
        writeln!(csv, "113/{}/10,113/{},2330,台積電,半導體業,{}", month + 1, month, revenue).unwrap();
    }
    csv
}

#[tokio::test]
async fn test_imports_then_screen() {
    logging::init_test_logging();
    logging::log_test_step("Importing CSV data and screening");

    let dir = tempfile::tempdir().unwrap();
    let test_db = database::init_fresh_test_database().await;
    let db = &test_db.db;

    let stocks = write_file(dir.path(), "stocks.csv", "symbol,company_name,industry,market\n2330,台積電,半導體業,sii\n2317,鴻海,其他電子業,sii\n");
    assert_eq!(importers::import_stocks_csv(db, &stocks).await.unwrap().imported, 2);

    let income = write_file(dir.path(), "income.csv", &income_csv());
    let report = importers::import_statements_csv(db, StatementKind::Income, &income).await.unwrap();
    assert_eq!((report.imported, report.skipped), (7, 1));

    let cash = write_file(
        dir.path(),
        "cash.csv",
        "symbol,year,season,operating_cash_flow,investing_cash_flow,financing_cash_flow,capital_expenditures,free_cash_flow\n\
         2330,2024,3,500,-300,-100,-200,\n\
         2317,2024,3,-50,-10,20,,\n",
    );
    importers::import_statements_csv(db, StatementKind::CashFlow, &cash).await.unwrap();

    let prices = write_file(dir.path(), "prices.csv", &prices_csv());
    assert_eq!(importers::import_prices_csv(db, &prices).await.unwrap().imported, 120);

    let revenues = write_file(dir.path(), "revenue.csv", &revenue_csv());
    assert_eq!(revenue::import_month_revenue_csv(db, &revenues).await.unwrap().imported, 11);

    let template_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("queries").join("screener.json");
    let templates = QueryTemplates::load(template_path).unwrap();
    let manager = StockScreenerManager::new(db.clone(), templates, ScreenerSettings::default());

    let date = NaiveDate::from_ymd_opt(2024, 11, 20).unwrap();
    let report = manager.run(date).await.unwrap();
    assert_eq!(report.candidates, 2);

    let symbols = |model: &str| report.matches.get(model).cloned().unwrap_or_default();
    assert_eq!(symbols("value_screen"), vec!["2330"]);
    assert_eq!(symbols("margin_expansion"), vec!["2330"]);
    assert_eq!(symbols("positive_cash_flow"), vec!["2330"]);
    // October 250,000 vs 200,000 a year earlier
    assert_eq!(symbols("revenue_growth"), vec!["2330"]);
    assert_eq!(symbols("revenue_near_year_high"), vec!["2330"]);

    let stored = db.get_recommendations(date).await.unwrap();
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|r| r.symbol == "2330"));

    let models = db.list_filter_models().await.unwrap();
    assert_eq!(models.len(), 5);
}

#[tokio::test]
async fn test_rerun_replaces_recommendations() {
    let test_db = database::init_fresh_test_database().await;
    let db = &test_db.db;
    let dir = tempfile::tempdir().unwrap();

    let stocks = write_file(dir.path(), "stocks.csv", "symbol,company_name,industry,market\n2330,台積電,,\n");
    importers::import_stocks_csv(db, &stocks).await.unwrap();
    let revenues = write_file(dir.path(), "revenue.csv", &revenue_csv());
    revenue::import_month_revenue_csv(db, &revenues).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 11, 20).unwrap();
    let lenient = StockScreenerManager::new(db.clone(), QueryTemplates::builtin().unwrap(), ScreenerSettings::default());
    assert_eq!(lenient.run(date).await.unwrap().total_recommendations(), 2);

    let strict = ScreenerSettings { revenue_growth_min: 50.0, revenue_high_ratio: 1.0, ..ScreenerSettings::default() };
    let manager = StockScreenerManager::new(db.clone(), QueryTemplates::builtin().unwrap(), strict);
    let report = manager.run(date).await.unwrap();

    // 250,000 is still the trailing high; growth of 25% misses the 50% bar
    assert_eq!(report.total_recommendations(), 1);
    assert_eq!(db.get_recommendations(date).await.unwrap().len(), 1);
}
