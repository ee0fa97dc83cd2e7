//! Parsing a saved MOPS detail page

use pretty_assertions::assert_eq;
use tw_stocks::announce::parser::{parse_filing, parse_title};
use tw_stocks::models::{ReportPeriod, Season};

use crate::common::{fixture_path, logging};

#[test]
fn test_saved_q3_filing() {
    logging::init_test_logging();
    let html = std::fs::read_to_string(fixture_path("mops_filing_q3.html")).unwrap();

    let parsed = parse_filing(&html).unwrap();
    assert_eq!(parsed.title.as_deref(), Some("本公司113年前三季自結合併損益"));
    assert_eq!(parsed.period, Some(ReportPeriod::new(2024, Season::Q3)));

    let f = parsed.figures;
    assert_eq!(f.operating_revenue, 2_025_846_521.0);
    assert_eq!(f.gross_profit, 1_145_678_312.0);
    assert_eq!(f.operating_income, 927_001_465.0);
    assert_eq!(f.profit_before_tax, 971_209_033.0);
    assert_eq!(f.net_income, 842_087_300.0);
    assert_eq!(f.eps, 32.47);
}

#[test]
fn test_titles_seen_on_mops() {
    let cases = [
        ("公告本公司113年第一季自結損益", Some(ReportPeriod::new(2024, Season::Q1))),
        ("本公司 113 年第 2 季自結損益", Some(ReportPeriod::new(2024, Season::Q2))),
        ("公告本公司112年度自結損益", Some(ReportPeriod::new(2023, Season::Q4))),
        ("本公司董事會決議召開股東常會", None),
    ];
    for (title, expected) in cases {
        assert_eq!(parse_title(title), expected, "{}", title);
    }
}
