//! # Client Middleware
//!
//! Orchestrates a complete processing operation on top of
//! [`ClientCore`](super::client::ClientCore).
//!
//! ## Responsibilities
//!
//! - **Health Gate**: probe the service before uploading anything
//! - **Retry Logic**: up to 3 attempts, 120-second deadline each, linear
//!   backoff (2 s, 4 s) on `503` only
//! - **Progress**: drive a [`ProgressEstimator`] for the duration of the upload
//! - **Metrics**: optionally record latency, attempts and outcome per operation
//!
//! ## Request Workflow
//!
//! 1. **Check Health**: `GET /health`; on failure stop, nothing is uploaded
//! 2. **Start Progress**: fabricated estimate begins ticking
//! 3. **Send**: `POST /process-image` with retries ([`RetryPolicy`])
//! 4. **Settle**: progress completes (100) or fails, then resets to 0
//!
//! ## Usage
//!
//! ```rust,ignore
//! use deaify_client::client::{ClientCore, ClientMiddleware, ProgressEstimator};
//!
//! let config = ClientConfig::default();
//! let core = Arc::new(ClientCore::new(&config)?);
//! let middleware = ClientMiddleware::new(config.clone(), core);
//!
//! let progress = ProgressEstimator::new(config.progress.clone());
//! let mut updates = progress.subscribe();
//! let image = middleware.process_image(&request, &progress).await?;
//! ```

use bytes::Bytes;
use log::{error, info};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use uuid::Uuid;

use super::client::ClientCore;
use super::metrics::ClientMetrics;
use super::progress::ProgressEstimator;
use super::retry::{RetryPolicy, RetryState};
use crate::common::config::ClientConfig;
use crate::common::error::ApiFailure;
use crate::common::messages::{AnalysisResult, HealthStatus};
use crate::common::request::{ImagePayload, UploadForm, UploadRequest};

/// Coordinates health gate, retries and progress for processing operations.
///
/// Holds no per-operation state: concurrent calls each get their own
/// [`RetryState`] and use the estimator they were handed.
pub struct ClientMiddleware {
    core: Arc<ClientCore>,
    policy: RetryPolicy,
    metrics: Option<Arc<Mutex<ClientMetrics>>>,
}

impl ClientMiddleware {
    pub fn new(config: ClientConfig, core: Arc<ClientCore>) -> Self {
        Self {
            core,
            policy: RetryPolicy::from_config(&config.retry, &config.timeouts),
            metrics: None,
        }
    }

    /// Record every `process_image` outcome into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Mutex<ClientMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn check_health(&self) -> Result<HealthStatus, ApiFailure> {
        self.core.check_health().await
    }

    pub async fn analyze_image(&self, payload: &ImagePayload) -> Result<AnalysisResult, ApiFailure> {
        self.core.analyze_image(payload).await
    }

    /// Sends an encoded upload with the retry policy and returns the
    /// processed image bytes.
    pub async fn send(&self, form: &UploadForm) -> Result<Bytes, ApiFailure> {
        let mut state = RetryState::new();
        self.send_with_state(form, &mut state).await
    }

    async fn send_with_state(&self, form: &UploadForm, state: &mut RetryState) -> Result<Bytes, ApiFailure> {
        let core = &self.core;
        self.policy
            .run(state, |attempt| core.post_process_image(form, attempt))
            .await
    }

    /// Runs one complete processing operation.
    ///
    /// The health probe settles before anything is uploaded; if it fails the
    /// error is returned and `progress` is never started. Otherwise `progress`
    /// ticks while the upload is outstanding and is settled on every exit path.
    pub async fn process_image(
        &self,
        request: &UploadRequest,
        progress: &ProgressEstimator,
    ) -> Result<Bytes, ApiFailure> {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut state = RetryState::new();

        info!(
            "🚀 Task {} processing {} ({} bytes, {} iterations, intensity {})",
            request_id,
            request.payload().file_name(),
            request.payload().len(),
            request.iterations(),
            request.intensity()
        );

        let result = match self.core.check_health().await {
            Ok(_) => {
                let form = UploadForm::process(request);
                let handle = progress.start();
                let result = self.send_with_state(&form, &mut state).await;
                match &result {
                    Ok(_) => handle.complete(),
                    Err(_) => handle.fail(),
                }
                result
            }
            Err(failure) => Err(failure),
        };

        match &result {
            Ok(image) => info!(
                "✅ Task {} completed: {} bytes after {} attempt(s)",
                request_id,
                image.len(),
                state.attempt
            ),
            Err(failure) => error!(
                "❌ Task {} FAILED after {} attempt(s) [{}]: {}",
                request_id,
                state.attempt,
                failure.kind(),
                failure
            ),
        }

        if let Some(metrics) = &self.metrics {
            if let Ok(mut metrics) = metrics.lock() {
                metrics.record_request(
                    request_id,
                    started.elapsed(),
                    state.attempt,
                    state.backoff_total,
                    result.as_ref().err().map(|f| f.kind()),
                );
            }
        }

        result
    }
}
