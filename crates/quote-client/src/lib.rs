//! HTTP client for the third-party quote and fundamentals provider.
//!
//! Wraps the provider's quote and symbol-summary endpoints with a
//! sliding-window rate limiter and automatic retry on 429 responses.
//! Numeric fields the provider omits come back as `None` and are mapped to
//! the explicit unknown marker further up the stack.

use async_trait::async_trait;
use portfolio_core::AnalysisError;
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_BASE_URL: &str = "https://quote.stockpulse.dev";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Need to wait until the oldest request falls out of the window
            let wait_until = match ts.front().and_then(|f| f.checked_add(self.window)) {
                Some(t) => t,
                None => now,
            };
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for quote API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Flat per-symbol quote snapshot (current trading session).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteSnapshot {
    #[serde(rename = "regularMarketPrice")]
    pub price: Option<f64>,
    #[serde(rename = "regularMarketDayHigh")]
    pub day_high: Option<f64>,
    #[serde(rename = "fiftyTwoWeekHigh")]
    pub fifty_two_week_high: Option<f64>,
    #[serde(rename = "trailingPE")]
    pub trailing_pe: Option<f64>,
}

/// Per-symbol fundamentals assembled from the provider's summary modules.
#[derive(Debug, Clone, Default)]
pub struct SymbolFundamentals {
    pub sector: Option<String>,
    pub dividend_yield: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub forward_pe: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub price: Option<f64>,
}

/// Provider seam used by the metric collector. Tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<QuoteSnapshot, AnalysisError>;
    async fn get_fundamentals(&self, symbol: &str) -> Result<SymbolFundamentals, AnalysisError>;
}

#[derive(Clone)]
pub struct QuoteClient {
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl QuoteClient {
    pub fn new() -> Self {
        // Default 120 req/min; free-tier users should set QUOTE_RATE_LIMIT lower.
        let rate_limit: usize = std::env::var("QUOTE_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let base_url = std::env::var("QUOTE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    pub fn with_base_url(base_url: String) -> Self {
        let mut client = Self::new();
        client.base_url = base_url;
        client
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AnalysisError> {
        let request = builder.build().map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request.try_clone()
                .ok_or_else(|| AnalysisError::ApiError("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await
                .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 10u64;
            tracing::warn!("Quote API 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(AnalysisError::ApiError("Rate limited by quote provider after 3 retries".to_string()))
    }
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteProvider for QuoteClient {
    /// Get the current-session quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<QuoteSnapshot, AnalysisError> {
        let url = format!("{}/v7/finance/quote", self.base_url);

        let response = self.send_request(
            self.client.get(&url).query(&[("symbols", symbol)])
        ).await?;

        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: QuoteResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        body.quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::ApiError(format!("No quote returned for {}", symbol)))
    }

    /// Get the fundamentals summary for a symbol (sector, yield, margins,
    /// leverage, valuation, 52-week high).
    async fn get_fundamentals(&self, symbol: &str) -> Result<SymbolFundamentals, AnalysisError> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);

        let response = self.send_request(
            self.client.get(&url).query(&[(
                "modules",
                "assetProfile,summaryDetail,defaultKeyStatistics,financialData",
            )])
        ).await?;

        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: SummaryResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        let result = body
            .quote_summary
            .result
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::ApiError(format!("No summary returned for {}", symbol)))?;

        let summary_detail = result.summary_detail.unwrap_or_default();
        let key_statistics = result.default_key_statistics.unwrap_or_default();
        let financial_data = result.financial_data.unwrap_or_default();

        Ok(SymbolFundamentals {
            sector: result.asset_profile.and_then(|p| p.sector),
            dividend_yield: summary_detail.dividend_yield.raw(),
            profit_margin: key_statistics.profit_margins.raw(),
            debt_to_equity: financial_data.debt_to_equity.raw(),
            forward_pe: summary_detail.forward_pe.raw(),
            trailing_pe: summary_detail.trailing_pe.raw(),
            fifty_two_week_high: summary_detail.fifty_two_week_high.raw(),
            price: financial_data.current_price.raw(),
        })
    }
}

// Response structures. The provider wraps every numeric field in an object
// carrying both a raw value and a display string; only the raw value is used.

#[derive(Debug, Clone, Default, Deserialize)]
struct WrappedValue {
    #[serde(default)]
    raw: Option<f64>,
}

impl WrappedValue {
    fn raw(&self) -> Option<f64> {
        self.raw
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponseBody,
}

#[derive(Debug, Deserialize)]
struct QuoteResponseBody {
    #[serde(default)]
    result: Vec<QuoteSnapshot>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryResponseBody,
}

#[derive(Debug, Deserialize)]
struct SummaryResponseBody {
    #[serde(default)]
    result: Vec<SummaryResult>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    #[serde(rename = "assetProfile")]
    asset_profile: Option<AssetProfile>,
    #[serde(rename = "summaryDetail")]
    summary_detail: Option<SummaryDetail>,
    #[serde(rename = "defaultKeyStatistics")]
    default_key_statistics: Option<KeyStatistics>,
    #[serde(rename = "financialData")]
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    #[serde(default)]
    sector: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryDetail {
    #[serde(rename = "dividendYield", default)]
    dividend_yield: WrappedValue,
    #[serde(rename = "forwardPE", default)]
    forward_pe: WrappedValue,
    #[serde(rename = "trailingPE", default)]
    trailing_pe: WrappedValue,
    #[serde(rename = "fiftyTwoWeekHigh", default)]
    fifty_two_week_high: WrappedValue,
}

#[derive(Debug, Default, Deserialize)]
struct KeyStatistics {
    #[serde(rename = "profitMargins", default)]
    profit_margins: WrappedValue,
}

#[derive(Debug, Default, Deserialize)]
struct FinancialData {
    #[serde(rename = "debtToEquity", default)]
    debt_to_equity: WrappedValue,
    #[serde(rename = "currentPrice", default)]
    current_price: WrappedValue,
}
