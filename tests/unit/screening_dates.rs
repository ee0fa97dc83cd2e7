//! Reference periods across a whole year of screening dates

use chrono::{Datelike, NaiveDate};
use tw_stocks::models::{ReportPeriod, Season};
use tw_stocks::screener::period::{filing_deadline, reference_month, reference_season};

#[test]
fn test_reference_season_never_ahead_of_deadline() {
    let mut date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
    let mut previous = reference_season(date);

    while date <= end {
        let season = reference_season(date);
        assert!(filing_deadline(season) < date, "{} -> {}", date, season);
        // the next season is not yet due
        assert!(filing_deadline(season.next()) >= date, "{} -> {}", date, season);
        assert!(season >= previous);
        previous = season;
        date = date.succ_opt().unwrap();
    }
}

#[test]
fn test_reference_month_is_one_or_two_months_back() {
    for month in 1..=12 {
        for day in [1, 10, 11, 28] {
            let date = NaiveDate::from_ymd_opt(2024, month, day).unwrap();
            let (y, m) = reference_month(date);
            let back = (date.year() * 12 + date.month() as i32) - (y * 12 + m as i32);
            assert_eq!(back, if day > 10 { 1 } else { 2 }, "{}", date);
        }
    }
}

#[test]
fn test_first_quarter_reports_visible_after_may_15() {
    let season = reference_season(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    assert_eq!(season, ReportPeriod::new(2024, Season::Q1));
}
