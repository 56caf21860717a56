//! Transport seam for the AI analysis service.

use crate::AnalysisVariant;
use async_trait::async_trait;
use portfolio_core::AnalysisError;
use serde::Deserialize;
use std::time::Duration;

#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Request analysis text for one symbol. An unsuccessful upstream
    /// response is an error; retry policy lives in the client.
    async fn request_analysis(
        &self,
        symbol: &str,
        variant: AnalysisVariant,
    ) -> Result<String, AnalysisError>;

    /// Probe the upstream health endpoint.
    async fn health(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    analysis_text: String,
    success: bool,
    #[serde(default)]
    error_message: Option<String>,
}

/// HTTP transport against the analysis service.
pub struct HttpAnalysisBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisBackend {
    pub fn new(base_url: String) -> Self {
        // Deep analyses routinely take minutes upstream.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url }
    }

    /// Base URL from `AI_ANALYST_URL`, defaulting to a local service.
    pub fn from_env() -> Self {
        let base_url = std::env::var("AI_ANALYST_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        Self::new(base_url)
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    async fn request_analysis(
        &self,
        symbol: &str,
        variant: AnalysisVariant,
    ) -> Result<String, AnalysisError> {
        let url = format!("{}/analyze/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("analysis_type", variant.as_str())])
            .send()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let body: AnalysisResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::ApiError(e.to_string()))?;

        if !body.success {
            return Err(AnalysisError::ApiError(
                body.error_message
                    .unwrap_or_else(|| "analysis service reported failure".to_string()),
            ));
        }

        Ok(body.analysis_text)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!("AI analysis health check failed: {}", e);
                false
            }
        }
    }
}
