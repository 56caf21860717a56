//! Metric collection.
//!
//! Produces one `StockMetrics` record per requested symbol from the quote
//! provider, with deterministic handling of missing data: absent numeric
//! fields stay unknown (`None`), a missing sector becomes the literal
//! `"Unknown"` bucket, and a per-symbol fetch failure is logged and skipped
//! rather than aborting the batch.
//!
//! Symbols are fetched sequentially so every failure attributes cleanly to
//! one symbol.

use async_trait::async_trait;
use portfolio_core::{AnalysisError, MetricSource, StockMetrics, UNKNOWN_SECTOR};
use quote_client::{QuoteProvider, QuoteSnapshot, SymbolFundamentals};

pub struct MetricCollector<P: QuoteProvider> {
    provider: P,
}

impl<P: QuoteProvider> MetricCollector<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Collect metrics for one symbol. Two provider calls: the summary for
    /// fundamentals and the quote for session price data. A quote failure
    /// degrades gracefully; a summary failure fails the symbol.
    async fn collect_one(&self, symbol: &str) -> Result<StockMetrics, AnalysisError> {
        let fundamentals = self.provider.get_fundamentals(symbol).await?;

        let quote = match self.provider.get_quote(symbol).await {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!("Quote fetch failed for {}, using summary data only: {}", symbol, e);
                QuoteSnapshot::default()
            }
        };

        Ok(build_metrics(symbol, fundamentals, quote))
    }
}

fn build_metrics(symbol: &str, fundamentals: SymbolFundamentals, quote: QuoteSnapshot) -> StockMetrics {
    let price = fundamentals.price.or(quote.price);

    // Prefer the 52-week high; fall back to the session day high when the
    // provider runs in degraded mode and omits it.
    let reference_high = fundamentals
        .fifty_two_week_high
        .or(quote.fifty_two_week_high)
        .or(quote.day_high);

    // Forward P/E preferred, else trailing.
    let price_to_earnings = fundamentals
        .forward_pe
        .or(fundamentals.trailing_pe)
        .or(quote.trailing_pe);

    StockMetrics {
        symbol: symbol.to_string(),
        sector: fundamentals.sector.unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
        dividend_yield: fundamentals.dividend_yield,
        profit_margin: fundamentals.profit_margin,
        debt_to_equity: fundamentals.debt_to_equity,
        price_to_earnings,
        discount_from_high: discount_from_high(reference_high, price),
        price,
    }
}

/// Derived discount from the reference high: `(high - price) / high`,
/// defined only when both values are present and the high is nonzero.
fn discount_from_high(reference_high: Option<f64>, price: Option<f64>) -> Option<f64> {
    match (reference_high, price) {
        (Some(high), Some(price)) if high != 0.0 && high.is_finite() && price.is_finite() => {
            Some((high - price) / high)
        }
        _ => None,
    }
}

/// Skip policy for symbols the provider's addressing scheme does not
/// reliably resolve: anything with exchange-suffix punctuation (dots,
/// hyphens) or longer than five characters is skipped by convention.
fn is_supported_ticker(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 5
        && symbol.chars().all(|c| c.is_ascii_alphabetic())
}

#[async_trait]
impl<P: QuoteProvider> MetricSource for MetricCollector<P> {
    async fn collect(&self, symbols: &[String]) -> Result<Vec<StockMetrics>, AnalysisError> {
        if symbols.is_empty() {
            return Err(AnalysisError::InvalidData(
                "no symbols to collect".to_string(),
            ));
        }

        let mut metrics = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !is_supported_ticker(symbol) {
                tracing::warn!("Skipping {}: unsupported ticker format", symbol);
                continue;
            }

            match self.collect_one(symbol).await {
                Ok(m) => metrics.push(m),
                Err(e) => {
                    tracing::warn!("Failed to collect metrics for {}: {}", symbol, e);
                }
            }
        }

        tracing::info!("Collected metrics for {}/{} symbols", metrics.len(), symbols.len());
        Ok(metrics)
    }
}
