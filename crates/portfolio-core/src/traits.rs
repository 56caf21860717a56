use crate::{AnalysisError, StockMetrics};
use async_trait::async_trait;

/// Trait for metric collection backends.
///
/// Implementations fetch one `StockMetrics` record per resolvable symbol.
/// Per-symbol failures are reported and skipped, never surfaced as a batch
/// error, so the output may be shorter than the input.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn collect(&self, symbols: &[String]) -> Result<Vec<StockMetrics>, AnalysisError>;
}
