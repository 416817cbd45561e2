//! # Client Core
//!
//! Single-request primitives against the processing service. Each method here
//! performs exactly one HTTP exchange:
//!
//! - [`ClientCore::check_health`]: `GET /health` under its own deadline
//! - [`ClientCore::post_process_image`]: one `POST /process-image` attempt
//! - [`ClientCore::analyze_image`]: `POST /analyze-image`, no retry
//!
//! Retries, the health gate ordering and progress reporting are handled by the
//! [`ClientMiddleware`](super::middleware::ClientMiddleware).

use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;

use super::retry::{Reply, PROCESS_FAILURE_CONTEXT};
use crate::common::config::ClientConfig;
use crate::common::error::{ApiFailure, RawResponse};
use crate::common::messages::{AnalysisResult, AnalysisWire, Endpoint, HealthStatus};
use crate::common::request::{ImagePayload, UploadForm};

const ANALYZE_FAILURE_CONTEXT: &str = "Failed to analyze image";

/// HTTP access to one deployment of the processing service.
pub struct ClientCore {
    http: Client,
    base_url: String,
    health_timeout: Duration,
}

impl ClientCore {
    /// Builds the HTTP client for `config.api.base_url`.
    ///
    /// Only the connect timeout is set on the client itself; the health and
    /// attempt deadlines are enforced around each call.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.timeouts.connect())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.api.base_url.clone(),
            health_timeout: config.timeouts.health(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe, bounded by the health deadline (10 s by default).
    ///
    /// # Errors
    /// - `DeadlineExceeded` if nothing arrived in time (no status)
    /// - `HealthGate` for a non-2xx answer (status mirrored) or when the
    ///   service could not be reached at all
    pub async fn check_health(&self) -> Result<HealthStatus, ApiFailure> {
        let url = Endpoint::Health.url(&self.base_url);
        debug!("Probing {}", url);

        let probe = async {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| ApiFailure::network("API health check failed", e).into_health_gate())?;

            let status = response.status();
            if !status.is_success() {
                let headers = response.headers().clone();
                let body = response.text().await.ok();
                return Err(ApiFailure::health_gate(RawResponse { status, headers, body }));
            }

            response
                .json::<HealthStatus>()
                .await
                .map_err(|e| ApiFailure::network("Invalid health check response", e).into_health_gate())
        };

        match timeout(self.health_timeout, probe).await {
            Ok(Ok(health)) => {
                info!("💚 Service at {} is {}", self.base_url, health.status);
                Ok(health)
            }
            Ok(Err(failure)) => {
                warn!("❌ Health check failed: {}", failure);
                Err(failure)
            }
            Err(_) => {
                warn!("⏱️  Health check timed out after {:?}", self.health_timeout);
                Err(ApiFailure::deadline_exceeded("API health check", self.health_timeout))
            }
        }
    }

    /// One processing attempt. The reply is read in full but not classified.
    ///
    /// # Errors
    /// `Network` when no HTTP response was received.
    pub async fn post_process_image(&self, form: &UploadForm, attempt: u32) -> Result<Reply, ApiFailure> {
        let url = Endpoint::ProcessImage.url(&self.base_url);
        debug!("📤 POST {} (attempt {})", url, attempt);

        let response = self
            .http
            .post(&url)
            .multipart(form.to_multipart()?)
            .send()
            .await
            .map_err(|e| ApiFailure::network(PROCESS_FAILURE_CONTEXT, e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.ok();
        debug!(
            "📥 {} from {} ({} bytes)",
            status,
            url,
            body.as_ref().map_or(0, |b| b.len())
        );

        Ok(Reply { status, headers, body })
    }

    /// Fetches image metadata. Single attempt; no deadline beyond the HTTP
    /// client's connect timeout.
    pub async fn analyze_image(&self, payload: &ImagePayload) -> Result<AnalysisResult, ApiFailure> {
        let url = Endpoint::AnalyzeImage.url(&self.base_url);
        info!("🔍 Analyzing {} ({} bytes)", payload.file_name(), payload.len());

        let response = self
            .http
            .post(&url)
            .multipart(UploadForm::analyze(payload).to_multipart()?)
            .send()
            .await
            .map_err(|e| ApiFailure::network(ANALYZE_FAILURE_CONTEXT, e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            let failure = ApiFailure::generic_request(
                ANALYZE_FAILURE_CONTEXT,
                RawResponse { status, headers, body },
            );
            warn!("❌ {}", failure);
            return Err(failure);
        }

        let wire = response
            .json::<AnalysisWire>()
            .await
            .map_err(|e| ApiFailure::network("Invalid analysis response", e))?;
        Ok(wire.into())
    }
}
