use serde::{Deserialize, Serialize};

/// Summary of a stock's historical P/E ratios
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub volatility: f64,
    pub data_points: usize,
}

fn sorted_positive(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite() && *v > 0.0).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

/// Percentile `p` (0..=1) of the positive values, linearly interpolated.
/// Non-positive and non-finite values are ignored.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let sorted = sorted_positive(values);
    if sorted.is_empty() {
        return None;
    }
    Some(interpolate(&sorted, p))
}

pub fn moving_average(closes: &[f64]) -> Option<f64> {
    if closes.is_empty() {
        return None;
    }
    Some(closes.iter().sum::<f64>() / closes.len() as f64)
}

/// P/E statistics over positive ratios; `None` without data
pub fn calculate_pe_statistics(pe_data: &[f64]) -> Option<PeStatistics> {
    let sorted = sorted_positive(pe_data);
    if sorted.is_empty() {
        return None;
    }

    let len = sorted.len();
    let mean = sorted.iter().sum::<f64>() / len as f64;
    let variance = sorted.iter().map(|pe| (pe - mean).powi(2)).sum::<f64>() / len as f64;

    Some(PeStatistics {
        min: sorted[0],
        max: sorted[len - 1],
        mean,
        median: interpolate(&sorted, 0.5),
        percentile_25: interpolate(&sorted, 0.25),
        percentile_75: interpolate(&sorted, 0.75),
        volatility: variance.sqrt(),
        data_points: len,
    })
}

/// Price implied by trailing EPS at the given P/E
pub fn fair_price(eps_ttm: f64, pe: f64) -> Option<f64> {
    if eps_ttm <= 0.0 || pe <= 0.0 {
        None
    } else {
        Some(eps_ttm * pe)
    }
}

/// Moving-average price sits below the price implied by a low historical P/E
pub fn is_undervalued(moving_average: f64, eps_ttm: f64, pe_at_percentile: f64) -> bool {
    fair_price(eps_ttm, pe_at_percentile).is_some_and(|fair| moving_average > 0.0 && moving_average < fair)
}
