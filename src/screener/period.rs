//! Reference season and month for a screening date.
//!
//! Quarterly reports are only complete once their statutory deadline has
//! passed, and monthly revenue is due by the 10th of the following month.

use chrono::{Datelike, NaiveDate};

use crate::models::{ReportPeriod, Season};

/// Day of month by which the previous month's revenue must be filed
pub const MONTH_REVENUE_DEADLINE_DAY: u32 = 10;

/// Last filing day for a quarterly report
pub fn filing_deadline(period: ReportPeriod) -> NaiveDate {
    let (year, month, day) = match period.season.get() {
        1 => (period.year, 5, 15),
        2 => (period.year, 8, 14),
        3 => (period.year, 11, 14),
        _ => (period.year + 1, 3, 31),
    };
    // all four dates exist in every year
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// The latest season whose filing deadline is strictly before `today`
pub fn reference_season(today: NaiveDate) -> ReportPeriod {
    let current = ReportPeriod::new(today.year(), Season::of_month(today.month()));
    let mut candidate = current.prev();
    // at most five steps back: Q4 of two years ago is always past its deadline
    while filing_deadline(candidate) >= today {
        candidate = candidate.prev();
    }
    candidate
}

/// The latest month whose revenue report is due: last month after the 10th,
/// otherwise the month before that
pub fn reference_month(today: NaiveDate) -> (i32, u32) {
    let back = if today.day() > MONTH_REVENUE_DEADLINE_DAY { 1 } else { 2 };
    shift_month(today.year(), today.month(), -back)
}

/// Move `(year, month)` by `delta` months
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = month_ordinal(year, month) + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Monotonic month index, `year * 12 + month - 1`
pub fn month_ordinal(year: i32, month: u32) -> i32 {
    year * 12 + month as i32 - 1
}

pub fn season_ordinal(period: ReportPeriod) -> i32 {
    period.ordinal()
}

/// The `n` months ending at `(year, month)`, oldest first
pub fn trailing_months(year: i32, month: u32, n: usize) -> Vec<(i32, u32)> {
    (0..n as i32)
        .rev()
        .map(|back| shift_month(year, month, -back))
        .collect()
}

/// The four seasons ending at `period`, oldest first
pub fn trailing_seasons(period: ReportPeriod) -> Vec<ReportPeriod> {
    (0..4)
        .rev()
        .map(|back| ReportPeriod::from_ordinal(period.ordinal() - back))
        .collect()
}
