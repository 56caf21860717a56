//! Client for the external AI analysis service.
//!
//! The text generator itself is opaque; this crate owns the boundary
//! contract around it: a cache keyed by `(symbol, variant)` with a 24-hour
//! TTL, and a serialized request queue with bounded retries. The upstream
//! holds stateful conversations, so requests run one at a time with a
//! pacing pause between them; pacing is injectable so tests run without
//! wall-clock delays.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use portfolio_core::AnalysisError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

mod backend;
mod pacing;

pub use backend::{AnalysisBackend, HttpAnalysisBackend};
pub use pacing::{FixedDelayPacing, NoPacing, PacingPolicy};

const CACHE_TTL_HOURS: i64 = 24;
const MAX_ATTEMPTS: u32 = 2;

/// Depth of the requested analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisVariant {
    Quick,
    Standard,
    Deep,
}

impl AnalysisVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisVariant::Quick => "quick",
            AnalysisVariant::Standard => "standard",
            AnalysisVariant::Deep => "deep",
        }
    }
}

/// One AI analysis outcome. Failed requests produce a record with
/// `success = false` instead of aborting the batch they belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub symbol: String,
    pub variant: AnalysisVariant,
    pub text: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl AiAnalysis {
    /// Whether this analysis is still within the cache TTL.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.success && now - self.analyzed_at < Duration::hours(CACHE_TTL_HOURS)
    }
}

struct CacheEntry {
    analysis: AiAnalysis,
}

pub struct AiAnalystClient<B: AnalysisBackend, P: PacingPolicy> {
    backend: B,
    pacing: P,
    cache: DashMap<String, CacheEntry>,
    /// Serializes requests to the upstream conversation API.
    request_lock: Mutex<()>,
}

impl<B: AnalysisBackend, P: PacingPolicy> AiAnalystClient<B, P> {
    pub fn new(backend: B, pacing: P) -> Self {
        Self {
            backend,
            pacing,
            cache: DashMap::new(),
            request_lock: Mutex::new(()),
        }
    }

    fn cache_key(symbol: &str, variant: AnalysisVariant) -> String {
        format!("{}:{}", symbol, variant.as_str())
    }

    /// Analyze one symbol, serving from cache when a fresh result exists.
    pub async fn analyze(
        &self,
        symbol: &str,
        variant: AnalysisVariant,
    ) -> Result<AiAnalysis, AnalysisError> {
        if symbol.is_empty() {
            return Err(AnalysisError::InvalidData("empty symbol".to_string()));
        }

        let key = Self::cache_key(symbol, variant);
        if let Some(entry) = self.cache.get(&key) {
            if entry.analysis.is_fresh_at(Utc::now()) {
                tracing::info!("Using cached AI analysis for {} ({})", symbol, variant.as_str());
                return Ok(entry.analysis.clone());
            }
        }

        // One request at a time against the stateful upstream.
        let _guard = self.request_lock.lock().await;

        for attempt in 1..=MAX_ATTEMPTS {
            tracing::info!("AI analysis attempt {}/{} for {}", attempt, MAX_ATTEMPTS, symbol);
            match self.backend.request_analysis(symbol, variant).await {
                Ok(text) => {
                    let analysis = AiAnalysis {
                        symbol: symbol.to_string(),
                        variant,
                        text,
                        success: true,
                        error_message: None,
                        analyzed_at: Utc::now(),
                    };
                    self.cache.insert(key, CacheEntry { analysis: analysis.clone() });
                    return Ok(analysis);
                }
                Err(e) => {
                    tracing::warn!("AI analysis attempt {} failed for {}: {}", attempt, symbol, e);
                    if attempt == MAX_ATTEMPTS {
                        // Failed record, never cached: a later call retries.
                        return Ok(AiAnalysis {
                            symbol: symbol.to_string(),
                            variant,
                            text: String::new(),
                            success: false,
                            error_message: Some(e.to_string()),
                            analyzed_at: Utc::now(),
                        });
                    }
                    self.pacing.pause_between_attempts().await;
                }
            }
        }

        unreachable!("retry loop always returns on the last attempt")
    }

    /// Analyze a list of symbols sequentially, pausing between requests so
    /// the upstream conversation state can reset. Per-symbol failures are
    /// recorded and the batch continues.
    pub async fn analyze_batch(
        &self,
        symbols: &[String],
        variant: AnalysisVariant,
    ) -> Vec<AiAnalysis> {
        let mut results = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            match self.analyze(symbol, variant).await {
                Ok(analysis) => results.push(analysis),
                Err(e) => {
                    tracing::warn!("Skipping AI analysis for {}: {}", symbol, e);
                }
            }
            if i + 1 < symbols.len() {
                self.pacing.pause_between_requests().await;
            }
        }
        results
    }

    /// Probe the upstream health endpoint.
    pub async fn is_available(&self) -> bool {
        self.backend.health().await
    }

    /// Drop cache entries older than the TTL.
    pub fn evict_stale(&self) {
        let now = Utc::now();
        self.cache.retain(|_, entry| entry.analysis.is_fresh_at(now));
    }
}
