mod filing_fixture;
mod screening_dates;
