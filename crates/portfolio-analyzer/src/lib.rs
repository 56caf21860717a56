//! Portfolio analysis orchestration.
//!
//! Wires the metric collector and the scoring engine together: collects
//! metrics for a symbol list (with a short-lived per-symbol cache so
//! repeated analyses don't re-fetch), scores them sector-relative, and
//! returns per-stock reports carrying the raw metrics, the scores, and the
//! derived recommendation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metric_collector::MetricCollector;
use portfolio_core::{
    AnalysisError, MetricSource, PeerReference, Recommendation, ScoreResult, StockMetrics,
    StockReport,
};
use quote_client::QuoteClient;
use sector_scoring::SectorScoringEngine;

/// Internal cache entry with timestamp
struct CacheEntry<T> {
    data: T,
    cached_at: DateTime<Utc>,
}

const CACHE_TTL_SECS: i64 = 300; // 5 minutes

pub struct PortfolioAnalyzer<S: MetricSource> {
    source: S,
    engine: SectorScoringEngine,
    /// Cache collected metrics per symbol (5-min TTL)
    metrics_cache: DashMap<String, CacheEntry<StockMetrics>>,
}

impl PortfolioAnalyzer<MetricCollector<QuoteClient>> {
    /// Analyzer backed by the HTTP quote provider, configured from the
    /// environment.
    pub fn from_env() -> Self {
        Self::new(MetricCollector::new(QuoteClient::new()))
    }
}

impl<S: MetricSource> PortfolioAnalyzer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            engine: SectorScoringEngine::new(),
            metrics_cache: DashMap::new(),
        }
    }

    /// Score already-collected metrics against the given reference. This is
    /// the engine's single logical operation, re-exported at the
    /// orchestration surface for callers that bring their own metrics.
    pub fn score(
        &self,
        stocks: &[StockMetrics],
        reference: &PeerReference,
    ) -> Result<Vec<ScoreResult>, AnalysisError> {
        self.engine.score(stocks, reference)
    }

    /// Collect metrics for the given symbols and score them.
    ///
    /// Symbols whose metrics cannot be collected are absent from the
    /// output; the call fails only when no symbol yields data at all, so
    /// callers can distinguish "no input data" from partial upstream
    /// failures.
    pub async fn analyze(
        &self,
        symbols: &[String],
        reference: &PeerReference,
    ) -> Result<Vec<StockReport>, AnalysisError> {
        if symbols.is_empty() {
            return Err(AnalysisError::InvalidData(
                "no symbols to analyze".to_string(),
            ));
        }

        let stocks = self.collect_with_cache(symbols).await?;
        if stocks.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "no metric data available for any requested symbol".to_string(),
            ));
        }

        tracing::info!("Scoring {} stocks across sectors", stocks.len());
        let scores = self.engine.score(&stocks, reference)?;
        let analyzed_at = Utc::now();

        Ok(stocks
            .into_iter()
            .zip(scores)
            .map(|(metrics, scores)| StockReport {
                symbol: metrics.symbol.clone(),
                sector: metrics.sector.clone(),
                recommendation: Recommendation::from_total_score(scores.total_score),
                metrics,
                scores,
                analyzed_at,
            })
            .collect())
    }

    /// Serve fresh cached metrics, fetch the rest, cache what arrives.
    async fn collect_with_cache(&self, symbols: &[String]) -> Result<Vec<StockMetrics>, AnalysisError> {
        let now = Utc::now();
        let mut cached = Vec::new();
        let mut to_fetch = Vec::new();

        for symbol in symbols {
            match self.metrics_cache.get(symbol) {
                Some(entry) if (now - entry.cached_at).num_seconds() < CACHE_TTL_SECS => {
                    cached.push(entry.data.clone());
                }
                _ => to_fetch.push(symbol.clone()),
            }
        }

        if !cached.is_empty() {
            tracing::debug!("Serving {} symbols from metrics cache", cached.len());
        }

        if !to_fetch.is_empty() {
            let fetched = self.source.collect(&to_fetch).await?;
            for metrics in fetched {
                self.metrics_cache.insert(
                    metrics.symbol.clone(),
                    CacheEntry {
                        data: metrics.clone(),
                        cached_at: now,
                    },
                );
                cached.push(metrics);
            }
        }

        Ok(cached)
    }
}
