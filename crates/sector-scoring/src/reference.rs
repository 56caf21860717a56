//! Sector reference construction.
//!
//! Builds per-sector `(mean, stdev)` summaries from a broad population of
//! stock metrics, so a user's holdings can be normalized against a wider
//! peer set (e.g. the whole index) instead of against themselves.

use portfolio_core::{MetricStats, SectorReference, SectorReferenceMap, StockMetrics};
use std::collections::HashMap;

/// Mean and sample standard deviation of the given values.
///
/// Returns `None` for an empty slice. With a single value the standard
/// deviation is defined as 0; otherwise the sum of squared deviations is
/// divided by `n - 1`.
pub fn sample_stats(values: &[f64]) -> Option<MetricStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let stdev = if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    } else {
        0.0
    };
    Some(MetricStats { mean, stdev })
}

fn stats_for(
    stocks: &[&StockMetrics],
    accessor: fn(&StockMetrics) -> Option<f64>,
) -> Option<MetricStats> {
    let finite: Vec<f64> = stocks
        .iter()
        .filter_map(|&s| accessor(s))
        .filter(|v| v.is_finite())
        .collect();
    sample_stats(&finite)
}

/// Summarize a population of stocks into per-sector normalization
/// references. Unknown metric values are skipped, not treated as zero.
pub fn build_sector_references(population: &[StockMetrics]) -> SectorReferenceMap {
    let mut by_sector: HashMap<&str, Vec<&StockMetrics>> = HashMap::new();
    for stock in population {
        by_sector.entry(stock.sector.as_str()).or_default().push(stock);
    }

    by_sector
        .into_iter()
        .map(|(sector, stocks)| {
            tracing::debug!("Building sector reference for {} ({} stocks)", sector, stocks.len());
            let reference = SectorReference {
                dividend_yield: stats_for(&stocks, |s| s.dividend_yield),
                profit_margin: stats_for(&stocks, |s| s.profit_margin),
                debt_to_equity: stats_for(&stocks, |s| s.debt_to_equity),
                price_to_earnings: stats_for(&stocks, |s| s.price_to_earnings),
                discount_from_high: stats_for(&stocks, |s| s.discount_from_high),
            };
            (sector.to_string(), reference)
        })
        .collect()
}
