//! # Wire Types
//!
//! Endpoints of the processing service and the JSON bodies they return.
//!
//! ```text
//! GET  /health         -> {"status": "healthy"}
//! POST /process-image  -> raw image bytes
//! POST /analyze-image  -> {"filename", "format", "mode", "size": {...}, ...}
//! ```

use serde::{Deserialize, Serialize};

// ============================================================================
// ENDPOINTS
// ============================================================================

/// Routes exposed by the processing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// **Liveness probe** (`GET`, no body)
    Health,
    /// **Image processing** (`POST`, multipart `file`, `iterations`, `intensity`)
    ProcessImage,
    /// **Image analysis** (`POST`, multipart `file`)
    AnalyzeImage,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Health => "/health",
            Endpoint::ProcessImage => "/process-image",
            Endpoint::AnalyzeImage => "/analyze-image",
        }
    }

    /// Joins this route onto `base_url`, tolerating a trailing slash.
    ///
    /// # Example
    /// ```
    /// use deaify_client::common::messages::Endpoint;
    ///
    /// assert_eq!(
    ///     Endpoint::Health.url("http://localhost:8000/"),
    ///     "http://localhost:8000/health"
    /// );
    /// ```
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}

// ============================================================================
// RESPONSE BODIES
// ============================================================================

/// Body of a successful `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

/// Image metadata returned by `POST /analyze-image`.
///
/// Read-only once decoded. The service nests the dimensions and uses its own
/// field names; see [`AnalysisWire`] for the exact JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub filename: String,
    /// Container format as reported by the service, e.g. `"PNG"`.
    pub format: String,
    /// Colour mode, e.g. `"RGB"`, `"RGBA"`, `"L"`.
    pub color_mode: String,
    pub width: u32,
    pub height: u32,
    pub file_size_bytes: u64,
    /// Free-text risk estimate; currently a placeholder on the service side.
    pub estimated_risk: String,
}

/// Exact JSON shape of the analysis endpoint.
///
/// `filename` and `format` are `null` when the service cannot determine them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWire {
    pub filename: Option<String>,
    pub format: Option<String>,
    pub mode: String,
    pub size: ImageSize,
    pub file_size_bytes: u64,
    pub estimated_ai_detection_risk: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl From<AnalysisWire> for AnalysisResult {
    fn from(wire: AnalysisWire) -> Self {
        Self {
            filename: wire.filename.unwrap_or_default(),
            format: wire.format.unwrap_or_default(),
            color_mode: wire.mode,
            width: wire.size.width,
            height: wire.size.height,
            file_size_bytes: wire.file_size_bytes,
            estimated_risk: wire.estimated_ai_detection_risk,
        }
    }
}
