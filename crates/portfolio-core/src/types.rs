use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sector label used when the provider reports no sector classification.
/// It is a valid peer bucket, not a missing-data marker.
pub const UNKNOWN_SECTOR: &str = "Unknown";

/// Raw per-stock financial metrics, one record per symbol.
///
/// `None` means the provider did not report the field ("unknown"); it is
/// never coerced to zero at this layer. Records are immutable once produced
/// and the scoring engine only ever borrows them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMetrics {
    pub symbol: String,
    pub sector: String,
    pub dividend_yield: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub price_to_earnings: Option<f64>,
    /// Derived: (reference high - price) / reference high. Positive means
    /// the stock trades below its high.
    pub discount_from_high: Option<f64>,
    /// Informational only, not used in scoring.
    #[serde(default)]
    pub price: Option<f64>,
}

/// Mean and sample standard deviation of one metric over a reference
/// population.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Precomputed normalization reference for one sector.
///
/// When supplied, it replaces the scored batch as the source of mean/stdev
/// per metric, so "who is scored" is decoupled from "what is normal".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorReference {
    pub dividend_yield: Option<MetricStats>,
    pub profit_margin: Option<MetricStats>,
    pub debt_to_equity: Option<MetricStats>,
    pub price_to_earnings: Option<MetricStats>,
    pub discount_from_high: Option<MetricStats>,
}

/// Per-sector references keyed by sector label.
pub type SectorReferenceMap = HashMap<String, SectorReference>;

/// Normalization reference for a scoring run.
#[derive(Debug, Clone, Default)]
pub enum PeerReference {
    /// Score the batch against itself, partitioned by sector.
    #[default]
    SelfBySector,
    /// Score against precomputed per-sector statistics.
    Precomputed(SectorReferenceMap),
}

/// Scores for one stock, each in [0, 100]. Produced fresh on every scoring
/// run; never partially updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub symbol: String,
    pub health_score: f64,
    pub value_score: f64,
    pub total_score: f64,
}

/// Discrete recommendation derived from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    /// Map a 0-100 total score to a recommendation band. Boundaries are
    /// inclusive on the lower bound of each band.
    pub fn from_total_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => Recommendation::StrongBuy,
            s if s >= 60.0 => Recommendation::Buy,
            s if s >= 40.0 => Recommendation::Hold,
            s if s >= 20.0 => Recommendation::Sell,
            _ => Recommendation::StrongSell,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Hold => "Hold",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong Sell",
        }
    }
}

/// One stock's full analysis output: the raw metrics that went in, the
/// scores that came out, and the derived recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReport {
    pub symbol: String,
    pub sector: String,
    pub metrics: StockMetrics,
    pub scores: ScoreResult,
    pub recommendation: Recommendation,
    pub analyzed_at: DateTime<Utc>,
}
