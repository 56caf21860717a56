//! Sector-relative scoring engine.
//!
//! Turns raw per-stock financial metrics into comparable 0-100 health,
//! value and total scores. Each metric is z-scored against a peer reference
//! (the batch's own sector group, or a precomputed sector summary), the
//! z-scores are combined into weighted raw scores, and each score dimension
//! is rescaled to 0-100 within the scored sector group.
//!
//! The engine is pure and total: no I/O, no hidden state, and one
//! `ScoreResult` per input stock for any well-formed batch.

use portfolio_core::{
    AnalysisError, MetricStats, PeerReference, ScoreResult, SectorReference, StockMetrics,
};

pub mod reference;
pub use reference::{build_sector_references, sample_stats};

/// Weights applied to the normalized metrics when composing raw scores.
///
/// Sign convention: dividend yield and profit margin improve health,
/// debt-to-equity worsens it; a low P/E and a large discount from the high
/// improve value.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub dividend_yield: f64,
    pub profit_margin: f64,
    pub debt_to_equity: f64,
    pub price_to_earnings: f64,
    pub discount_from_high: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            dividend_yield: 1.0 / 3.0,
            profit_margin: 1.0 / 3.0,
            debt_to_equity: -1.0 / 3.0,
            price_to_earnings: -0.6,
            discount_from_high: 0.4,
        }
    }
}

/// Raw weighted scores before 0-100 rescaling.
#[derive(Debug, Clone, Copy)]
struct RawScore {
    health: f64,
    value: f64,
    total: f64,
}

pub struct SectorScoringEngine {
    weights: ScoringWeights,
}

impl Default for SectorScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SectorScoringEngine {
    pub fn new() -> Self {
        Self {
            weights: ScoringWeights::default(),
        }
    }

    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Score a batch of stocks against the given peer reference.
    ///
    /// Stocks are partitioned by sector; z-scores and the final 0-100
    /// rescale are both computed within each sector group. Returns one
    /// `ScoreResult` per input stock, in input order.
    ///
    /// Fails only on malformed input: an empty batch, or a record with an
    /// empty symbol or sector.
    pub fn score(
        &self,
        stocks: &[StockMetrics],
        reference: &PeerReference,
    ) -> Result<Vec<ScoreResult>, AnalysisError> {
        if stocks.is_empty() {
            return Err(AnalysisError::InvalidData(
                "cannot score an empty stock list".to_string(),
            ));
        }
        for stock in stocks {
            if stock.symbol.is_empty() {
                return Err(AnalysisError::InvalidData(
                    "stock record with empty symbol".to_string(),
                ));
            }
            if stock.sector.is_empty() {
                return Err(AnalysisError::InvalidData(format!(
                    "stock {} has an empty sector",
                    stock.symbol
                )));
            }
        }

        // Partition into sector groups, remembering original positions so
        // the output can be returned in input order.
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (idx, stock) in stocks.iter().enumerate() {
            match groups.iter_mut().find(|(s, _)| *s == stock.sector) {
                Some((_, indices)) => indices.push(idx),
                None => groups.push((stock.sector.as_str(), vec![idx])),
            }
        }

        let mut results: Vec<Option<ScoreResult>> = vec![None; stocks.len()];
        for (sector, indices) in &groups {
            let group: Vec<&StockMetrics> = indices.iter().map(|&i| &stocks[i]).collect();
            let sector_ref = match reference {
                PeerReference::SelfBySector => None,
                PeerReference::Precomputed(map) => map.get(*sector),
            };
            let raw = self.raw_scores(&group, sector_ref);
            let scaled = rescale_group(&raw);
            for (slot, (stock, score)) in indices.iter().zip(group.iter().zip(scaled)) {
                results[*slot] = Some(ScoreResult {
                    symbol: stock.symbol.clone(),
                    health_score: score.health,
                    value_score: score.value,
                    total_score: score.total,
                });
            }
        }

        // Every index was assigned exactly once above.
        Ok(results.into_iter().flatten().collect())
    }

    /// Compute raw weighted scores for one sector group.
    ///
    /// When `sector_ref` is `None` the group itself is the normalization
    /// reference; a precomputed reference supplies mean/stdev directly
    /// (missing metrics in it normalize to 0 for everyone).
    fn raw_scores(
        &self,
        group: &[&StockMetrics],
        sector_ref: Option<&SectorReference>,
    ) -> Vec<RawScore> {
        let z_dividend = normalize_metric(group, |s| s.dividend_yield, sector_ref.map(|r| r.dividend_yield));
        let z_margin = normalize_metric(group, |s| s.profit_margin, sector_ref.map(|r| r.profit_margin));
        let z_debt = normalize_metric(group, |s| s.debt_to_equity, sector_ref.map(|r| r.debt_to_equity));
        let z_pe = normalize_metric(group, |s| s.price_to_earnings, sector_ref.map(|r| r.price_to_earnings));
        let z_discount = normalize_metric(group, |s| s.discount_from_high, sector_ref.map(|r| r.discount_from_high));

        (0..group.len())
            .map(|i| {
                let health = self.weights.dividend_yield * z_dividend[i]
                    + self.weights.profit_margin * z_margin[i]
                    + self.weights.debt_to_equity * z_debt[i];
                let value = self.weights.price_to_earnings * z_pe[i]
                    + self.weights.discount_from_high * z_discount[i];
                let total = (health + value) / 2.0;
                RawScore {
                    health,
                    value,
                    total,
                }
            })
            .collect()
    }
}

/// Normalize one metric across a sector group.
///
/// `precomputed` distinguishes three cases: `None` means derive the stats
/// from the group itself, `Some(None)` means a precomputed reference exists
/// but carries no stats for this metric (everyone normalizes to 0), and
/// `Some(Some(stats))` supplies stored mean/stdev directly.
fn normalize_metric(
    group: &[&StockMetrics],
    accessor: fn(&StockMetrics) -> Option<f64>,
    precomputed: Option<Option<MetricStats>>,
) -> Vec<f64> {
    let stats = match precomputed {
        Some(stats) => stats,
        None => {
            let finite: Vec<f64> = group
                .iter()
                .filter_map(|&s| accessor(s))
                .filter(|v| v.is_finite())
                .collect();
            sample_stats(&finite)
        }
    };

    let Some(stats) = stats else {
        // No reference values at all: relative standing cannot be judged,
        // so every stock is treated as sector-average.
        return vec![0.0; group.len()];
    };

    group
        .iter()
        .map(|&stock| {
            let value = match accessor(stock) {
                Some(v) if v.is_finite() => v,
                _ => return 0.0,
            };
            let z = if stats.stdev == 0.0 || !stats.stdev.is_finite() {
                // No scale information: fall back to the raw centered
                // difference rather than dividing by zero.
                value - stats.mean
            } else {
                (value - stats.mean) / stats.stdev
            };
            if z.is_finite() {
                z
            } else {
                0.0
            }
        })
        .collect()
}

/// Rescale one group's raw scores, independently per dimension.
///
/// The worst raw score in the group anchors at 50, the best at 100, and
/// the mapping is monotonic in between. A group with no spread in a
/// dimension (including a group of one) gets exactly 50 for that dimension.
fn rescale_group(raw: &[RawScore]) -> Vec<RawScore> {
    let (min_h, max_h) = min_max(raw.iter().map(|r| r.health));
    let (min_v, max_v) = min_max(raw.iter().map(|r| r.value));
    let (min_t, max_t) = min_max(raw.iter().map(|r| r.total));

    raw.iter()
        .map(|r| RawScore {
            health: safe_scale(r.health, min_h, max_h),
            value: safe_scale(r.value, min_v, max_v),
            total: safe_scale(r.total, min_t, max_t),
        })
        .collect()
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    })
}

/// Map a raw score into [0, 100] given the group's min/max, with 50 as the
/// defensive floor for any degenerate arithmetic.
fn safe_scale(raw: f64, min: f64, max: f64) -> f64 {
    if !raw.is_finite() || !min.is_finite() || !max.is_finite() {
        return 50.0;
    }
    if max == min {
        return 50.0;
    }
    let scaled = 50.0 + (raw - min) / (max - min) * 50.0;
    if scaled.is_finite() {
        scaled.clamp(0.0, 100.0)
    } else {
        50.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_core::SectorReferenceMap;

    fn stock(
        symbol: &str,
        sector: &str,
        dividend_yield: Option<f64>,
        profit_margin: Option<f64>,
        debt_to_equity: Option<f64>,
        pe: Option<f64>,
        discount: Option<f64>,
    ) -> StockMetrics {
        StockMetrics {
            symbol: symbol.to_string(),
            sector: sector.to_string(),
            dividend_yield,
            profit_margin,
            debt_to_equity,
            price_to_earnings: pe,
            discount_from_high: discount,
            price: None,
        }
    }

    fn tech_pair() -> Vec<StockMetrics> {
        vec![
            stock("AAPL", "Technology", Some(0.5), Some(0.25), Some(1.5), Some(30.0), Some(0.1)),
            stock("MSFT", "Technology", Some(0.8), Some(0.35), Some(0.8), Some(35.0), Some(0.05)),
        ]
    }

    #[test]
    fn test_scores_within_bounds() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![
            stock("AAPL", "Technology", Some(0.5), Some(0.25), Some(1.5), Some(30.0), Some(0.1)),
            stock("MSFT", "Technology", Some(0.8), Some(0.35), Some(0.8), Some(35.0), Some(0.05)),
            stock("JNJ", "Healthcare", Some(2.5), Some(0.20), Some(0.5), Some(25.0), Some(0.15)),
            stock("PFE", "Healthcare", Some(3.0), Some(0.15), Some(0.7), Some(20.0), Some(0.20)),
        ];

        let results = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();
        assert_eq!(results.len(), 4);
        for r in &results {
            assert!(r.health_score.is_finite());
            assert!((0.0..=100.0).contains(&r.health_score), "{:?}", r);
            assert!((0.0..=100.0).contains(&r.value_score), "{:?}", r);
            assert!((0.0..=100.0).contains(&r.total_score), "{:?}", r);
        }
    }

    #[test]
    fn test_two_stock_sector_spans_scale_endpoints() {
        let engine = SectorScoringEngine::new();
        let results = engine.score(&tech_pair(), &PeerReference::SelfBySector).unwrap();

        // With two distinct raw scores, the scale anchors the group's worst
        // at 50 and its best at 100.
        let healths: Vec<f64> = results.iter().map(|r| r.health_score).collect();
        assert!(healths.contains(&50.0));
        assert!(healths.contains(&100.0));
    }

    #[test]
    fn test_order_independence() {
        let engine = SectorScoringEngine::new();
        let stocks = tech_pair();
        let forward = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();

        let mut reversed_input = stocks.clone();
        reversed_input.reverse();
        let reversed = engine.score(&reversed_input, &PeerReference::SelfBySector).unwrap();

        for r in &forward {
            let other = reversed.iter().find(|o| o.symbol == r.symbol).unwrap();
            assert_eq!(r, other);
        }
    }

    #[test]
    fn test_idempotence() {
        let engine = SectorScoringEngine::new();
        let stocks = tech_pair();
        let first = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();
        let second = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_single_stock_scores_midpoint() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![stock(
            "AAPL",
            "Technology",
            Some(0.5),
            Some(0.25),
            Some(1.5),
            Some(30.0),
            Some(0.1),
        )];

        let results = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();
        assert_eq!(results[0].health_score, 50.0);
        assert_eq!(results[0].value_score, 50.0);
        assert_eq!(results[0].total_score, 50.0);
    }

    #[test]
    fn test_all_unknown_batch_scores_midpoint() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![
            stock("AAA", "Energy", None, None, None, None, None),
            stock("BBB", "Energy", None, None, None, None, None),
            stock("CCC", "Energy", None, None, None, None, None),
        ];

        let results = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();
        for r in &results {
            assert_eq!(r.health_score, 50.0);
            assert_eq!(r.value_score, 50.0);
            assert_eq!(r.total_score, 50.0);
        }
    }

    #[test]
    fn test_unknown_metrics_are_neutral_in_raw_scores() {
        // A stock with all five metrics unknown gets z = 0 everywhere, so
        // its raw scores are exactly 0 regardless of the reference.
        let engine = SectorScoringEngine::new();
        let unknown = stock("UNK", "Technology", None, None, None, None, None);
        let known = stock("KNW", "Technology", Some(1.0), Some(0.3), Some(1.2), Some(22.0), Some(0.12));
        let other = stock("OTH", "Technology", Some(2.0), Some(0.1), Some(0.6), Some(18.0), Some(0.3));

        let group = [&unknown, &known, &other];
        let raw = engine.raw_scores(&group, None);
        assert_eq!(raw[0].health, 0.0);
        assert_eq!(raw[0].value, 0.0);
        assert_eq!(raw[0].total, 0.0);
    }

    #[test]
    fn test_monotonic_raw_to_scaled() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![
            stock("A", "Utilities", Some(1.0), Some(0.10), Some(1.0), Some(15.0), Some(0.1)),
            stock("B", "Utilities", Some(2.0), Some(0.20), Some(0.8), Some(14.0), Some(0.2)),
            stock("C", "Utilities", Some(3.0), Some(0.30), Some(0.6), Some(13.0), Some(0.3)),
        ];

        let group: Vec<&StockMetrics> = stocks.iter().collect();
        let raw = engine.raw_scores(&group, None);
        let results = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();

        for i in 0..stocks.len() {
            for j in 0..stocks.len() {
                if raw[i].health > raw[j].health {
                    assert!(results[i].health_score >= results[j].health_score);
                }
                if raw[i].total > raw[j].total {
                    assert!(results[i].total_score >= results[j].total_score);
                }
            }
        }
    }

    #[test]
    fn test_zero_variance_metric_uses_centered_difference() {
        // All reference stocks share debt_to_equity = 2.0: no divide by
        // zero, every z collapses to value - mean = 0.
        let group_owned: Vec<StockMetrics> = (0..5)
            .map(|i| {
                stock(
                    &format!("S{}", i),
                    "Financials",
                    Some(1.0 + i as f64),
                    Some(0.1),
                    Some(2.0),
                    Some(10.0 + i as f64),
                    Some(0.1),
                )
            })
            .collect();
        let group: Vec<&StockMetrics> = group_owned.iter().collect();

        let z_debt = normalize_metric(&group, |s| s.debt_to_equity, None);
        assert!(z_debt.iter().all(|&z| z == 0.0));
    }

    #[test]
    fn test_hand_computed_z_scores() {
        // Reference: margins 0.1, 0.2, 0.3 -> mean 0.2, sample stdev 0.1.
        let group_owned = vec![
            stock("A", "Tech", None, Some(0.1), None, None, None),
            stock("B", "Tech", None, Some(0.2), None, None, None),
            stock("C", "Tech", None, Some(0.3), None, None, None),
            stock("D", "Tech", None, None, None, None, None),
        ];
        let group: Vec<&StockMetrics> = group_owned.iter().collect();

        let z = normalize_metric(&group, |s| s.profit_margin, None);
        assert!((z[0] - (-1.0)).abs() < 1e-9);
        assert!(z[1].abs() < 1e-9);
        assert!((z[2] - 1.0).abs() < 1e-9);
        assert_eq!(z[3], 0.0);
    }

    #[test]
    fn test_partial_unknowns_match_hand_computed_raw() {
        // One stock with dividend and debt unknown, scored against three
        // fully-known peers. The unknown metrics must contribute exactly 0.
        let engine = SectorScoringEngine::new();
        let target = stock("TGT", "Tech", None, Some(0.3), None, Some(20.0), Some(0.1));
        let r1 = stock("R1", "Tech", Some(1.0), Some(0.1), Some(1.0), Some(10.0), Some(0.2));
        let r2 = stock("R2", "Tech", Some(2.0), Some(0.2), Some(2.0), Some(20.0), Some(0.3));
        let r3 = stock("R3", "Tech", Some(3.0), Some(0.3), Some(3.0), Some(30.0), Some(0.4));

        let group = [&target, &r1, &r2, &r3];
        let raw = engine.raw_scores(&group, None);

        // Margins: mean 0.225, sample stdev over {0.3, 0.1, 0.2, 0.3}.
        let margins = [0.3, 0.1, 0.2, 0.3];
        let mean = margins.iter().sum::<f64>() / 4.0;
        let var = margins.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / 3.0;
        let z_margin = (0.3 - mean) / var.sqrt();

        // P/E: mean 20, sample stdev over {20, 10, 20, 30}.
        let pes = [20.0, 10.0, 20.0, 30.0];
        let pe_mean = pes.iter().sum::<f64>() / 4.0;
        let pe_var = pes.iter().map(|p| (p - pe_mean) * (p - pe_mean)).sum::<f64>() / 3.0;
        let z_pe = (20.0 - pe_mean) / pe_var.sqrt();

        // Discounts: mean 0.25, sample stdev over {0.1, 0.2, 0.3, 0.4}.
        let discounts = [0.1, 0.2, 0.3, 0.4];
        let d_mean = discounts.iter().sum::<f64>() / 4.0;
        let d_var = discounts.iter().map(|d| (d - d_mean) * (d - d_mean)).sum::<f64>() / 3.0;
        let z_discount = (0.1 - d_mean) / d_var.sqrt();

        let expected_health = (1.0 / 3.0) * z_margin; // unknown dividend and debt drop out
        let expected_value = -0.6 * z_pe + 0.4 * z_discount;

        assert!((raw[0].health - expected_health).abs() < 1e-9);
        assert!((raw[0].value - expected_value).abs() < 1e-9);
        assert!((raw[0].total - (expected_health + expected_value) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_precomputed_reference_decouples_scored_set() {
        let engine = SectorScoringEngine::new();
        let population = vec![
            stock("P1", "Tech", Some(1.0), Some(0.1), Some(1.0), Some(10.0), Some(0.1)),
            stock("P2", "Tech", Some(2.0), Some(0.2), Some(2.0), Some(20.0), Some(0.2)),
            stock("P3", "Tech", Some(3.0), Some(0.3), Some(3.0), Some(30.0), Some(0.3)),
        ];
        let refs: SectorReferenceMap = build_sector_references(&population);

        let scored = vec![
            stock("A", "Tech", Some(1.5), Some(0.15), Some(1.5), Some(15.0), Some(0.15)),
            stock("B", "Tech", Some(2.5), Some(0.25), Some(2.5), Some(25.0), Some(0.25)),
        ];
        let results = engine.score(&scored, &PeerReference::Precomputed(refs)).unwrap();

        assert_eq!(results.len(), 2);
        for r in &results {
            assert!((0.0..=100.0).contains(&r.total_score));
        }
        // A trades at the lower P/E against the population stats.
        let a = results.iter().find(|r| r.symbol == "A").unwrap();
        let b = results.iter().find(|r| r.symbol == "B").unwrap();
        assert!(a.value_score > b.value_score);
    }

    #[test]
    fn test_precomputed_reference_missing_sector_falls_back_to_midpoint() {
        // No stats for this sector: every z is 0, every raw score ties,
        // and the whole group lands on the midpoint.
        let engine = SectorScoringEngine::new();
        let scored = vec![
            stock("A", "Tech", Some(1.5), Some(0.15), Some(1.5), Some(15.0), Some(0.15)),
            stock("B", "Tech", Some(2.5), Some(0.25), Some(2.5), Some(25.0), Some(0.25)),
        ];
        let results = engine
            .score(&scored, &PeerReference::Precomputed(SectorReferenceMap::new()))
            .unwrap();
        for r in &results {
            assert_eq!(r.health_score, 50.0);
            assert_eq!(r.value_score, 50.0);
            assert_eq!(r.total_score, 50.0);
        }
    }

    #[test]
    fn test_results_preserve_input_order() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![
            stock("A", "Tech", Some(1.0), None, None, None, None),
            stock("B", "Energy", Some(2.0), None, None, None, None),
            stock("C", "Tech", Some(3.0), None, None, None, None),
        ];
        let results = engine.score(&stocks, &PeerReference::SelfBySector).unwrap();
        let symbols: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let engine = SectorScoringEngine::new();
        let err = engine.score(&[], &PeerReference::SelfBySector).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![stock("", "Tech", None, None, None, None, None)];
        let err = engine.score(&stocks, &PeerReference::SelfBySector).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }

    #[test]
    fn test_empty_sector_rejected() {
        let engine = SectorScoringEngine::new();
        let stocks = vec![stock("AAPL", "", None, None, None, None, None)];
        let err = engine.score(&stocks, &PeerReference::SelfBySector).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidData(_)));
    }

    #[test]
    fn test_safe_scale_degenerate_inputs() {
        assert_eq!(safe_scale(f64::NAN, 0.0, 1.0), 50.0);
        assert_eq!(safe_scale(0.5, f64::NEG_INFINITY, 1.0), 50.0);
        assert_eq!(safe_scale(3.0, 3.0, 3.0), 50.0);
        assert_eq!(safe_scale(0.0, 0.0, 1.0), 50.0);
        assert_eq!(safe_scale(1.0, 0.0, 1.0), 100.0);
    }
}
