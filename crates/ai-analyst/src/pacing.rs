//! Pacing policy for the serialized request queue.
//!
//! The upstream keeps conversation state between calls and misbehaves when
//! hit back-to-back, so the client pauses between retries and between
//! consecutive batch requests. The policy is a trait so tests substitute a
//! no-op and run without wall-clock delays.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait PacingPolicy: Send + Sync {
    /// Pause before retrying a failed request.
    async fn pause_between_attempts(&self);
    /// Pause between consecutive requests in a batch.
    async fn pause_between_requests(&self);
}

/// Fixed-delay pacing backed by the tokio timer.
pub struct FixedDelayPacing {
    retry_delay: Duration,
    request_delay: Duration,
}

impl FixedDelayPacing {
    pub fn new(retry_delay: Duration, request_delay: Duration) -> Self {
        Self {
            retry_delay,
            request_delay,
        }
    }
}

impl Default for FixedDelayPacing {
    fn default() -> Self {
        // 3s before a retry, 5s between batch requests.
        Self::new(Duration::from_secs(3), Duration::from_secs(5))
    }
}

#[async_trait]
impl PacingPolicy for FixedDelayPacing {
    async fn pause_between_attempts(&self) {
        tracing::debug!("Pausing {:?} before retry", self.retry_delay);
        tokio::time::sleep(self.retry_delay).await;
    }

    async fn pause_between_requests(&self) {
        tracing::debug!("Pausing {:?} before next request", self.request_delay);
        tokio::time::sleep(self.request_delay).await;
    }
}

/// No pauses at all. For tests and local backends with no shared state.
pub struct NoPacing;

#[async_trait]
impl PacingPolicy for NoPacing {
    async fn pause_between_attempts(&self) {}
    async fn pause_between_requests(&self) {}
}
