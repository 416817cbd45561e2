//! # Mock Processing Service
//!
//! An in-process stand-in for the remote processing service, speaking the
//! same HTTP contract:
//!
//! - `GET /health` → `{"status": "healthy"}`
//! - `POST /process-image` → validates `iterations` (1–10), `intensity`
//!   (0.1–2.0) and the file's `image/*` content type, then echoes the
//!   uploaded image back unchanged as the "processed" result
//! - `POST /analyze-image` → format, colour mode, dimensions and size of the
//!   uploaded image, decoded with the `image` crate
//!
//! It does not implement the real processing algorithm. It can be scripted to
//! answer the next processing requests with given statuses (e.g. `503, 503`)
//! and to stall or fail the health probe, which is what the client's retry
//! and health-gate behaviour is tested against.

use anyhow::{Context, Result};
use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use image::ColorType;
use log::{info, warn};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::common::messages::{AnalysisWire, Endpoint, HealthStatus, ImageSize};
use crate::common::request::{
    FIELD_FILE, FIELD_INTENSITY, FIELD_ITERATIONS, INTENSITY_RANGE, ITERATIONS_RANGE,
};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const RISK_PLACEHOLDER: &str = "High (placeholder - integrate with actual AI detection service)";

/// Number of requests each route has received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockHits {
    pub health: usize,
    pub process: usize,
    pub analyze: usize,
}

#[derive(Default)]
struct Counters {
    health: AtomicUsize,
    process: AtomicUsize,
    analyze: AtomicUsize,
}

struct MockState {
    process_script: Mutex<VecDeque<StatusCode>>,
    health_status: StatusCode,
    health_delay: Duration,
    hits: Counters,
}

/// Builder and router for the mock service.
pub struct MockService {
    process_script: VecDeque<StatusCode>,
    health_status: StatusCode,
    health_delay: Duration,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    /// A healthy service that processes every request.
    pub fn new() -> Self {
        Self {
            process_script: VecDeque::new(),
            health_status: StatusCode::OK,
            health_delay: Duration::ZERO,
        }
    }

    /// Answer the next processing requests with these statuses, in order,
    /// before processing normally again.
    pub fn with_process_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.process_script.extend(statuses);
        self
    }

    pub fn with_health_status(mut self, status: StatusCode) -> Self {
        self.health_status = status;
        self
    }

    /// Stall the health probe before answering.
    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    fn into_state(self) -> Arc<MockState> {
        Arc::new(MockState {
            process_script: Mutex::new(self.process_script),
            health_status: self.health_status,
            health_delay: self.health_delay,
            hits: Counters::default(),
        })
    }

    fn router(state: Arc<MockState>) -> Router {
        Router::new()
            .route(Endpoint::Health.path(), get(health_handler))
            .route(Endpoint::ProcessImage.path(), post(process_handler))
            .route(Endpoint::AnalyzeImage.path(), post(analyze_handler))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Binds `addr` (use port 0 for an ephemeral port) and serves in the
    /// background until the returned handle is dropped.
    pub async fn spawn(self, addr: &str) -> Result<MockServer> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind mock service to {}", addr))?;
        let local_addr = listener.local_addr()?;

        let state = self.into_state();
        let app = Self::router(Arc::clone(&state));
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("Mock service stopped: {}", e);
            }
        });

        info!("🧪 Mock processing service on http://{}", local_addr);
        Ok(MockServer {
            addr: local_addr,
            state,
            task,
        })
    }
}

/// A running mock service.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> MockHits {
        MockHits {
            health: self.state.hits.health.load(Ordering::SeqCst),
            process: self.state.hits.process.load(Ordering::SeqCst),
            analyze: self.state.hits.analyze.load(Ordering::SeqCst),
        }
    }

    /// Serves until the task ends.
    pub async fn wait(mut self) -> Result<()> {
        (&mut self.task).await.context("Mock service task failed")
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

struct UploadedFile {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

#[derive(Default)]
struct Upload {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, detail.into()).into_response()
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, Response> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == FIELD_FILE {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read image data: {}", e),
                )
            })?;
            upload.file = Some(UploadedFile {
                file_name,
                content_type,
                data,
            });
        } else {
            let text = field.text().await.map_err(|e| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Failed to read field {}: {}", name, e),
                )
            })?;
            upload.fields.insert(name, text);
        }
    }

    Ok(upload)
}

/// The uploaded file, provided it is declared as an image.
fn image_file(upload: Upload) -> Result<UploadedFile, Response> {
    let file = upload
        .file
        .ok_or_else(|| error_response(StatusCode::UNPROCESSABLE_ENTITY, "Field 'file' is required"))?;

    match file.content_type.as_deref() {
        Some(ct) if ct.starts_with("image/") => Ok(file),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "File must be an image")),
    }
}

async fn health_handler(State(state): State<Arc<MockState>>) -> Response {
    state.hits.health.fetch_add(1, Ordering::SeqCst);

    if !state.health_delay.is_zero() {
        tokio::time::sleep(state.health_delay).await;
    }

    if state.health_status.is_success() {
        Json(HealthStatus {
            status: "healthy".to_string(),
        })
        .into_response()
    } else {
        error_response(state.health_status, "unhealthy")
    }
}

async fn process_handler(State(state): State<Arc<MockState>>, multipart: Multipart) -> Response {
    state.hits.process.fetch_add(1, Ordering::SeqCst);

    let upload = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    if let Some(status) = state.process_script.lock().await.pop_front() {
        warn!("🧪 Scripted answer {} for /process-image", status);
        return error_response(status, format!("scripted failure {}", status.as_u16()));
    }

    let iterations = upload.fields.get(FIELD_ITERATIONS).map_or(Ok(1), |v| v.parse::<u8>());
    match iterations {
        Ok(n) if ITERATIONS_RANGE.contains(&n) => {}
        _ => {
            return error_response(StatusCode::BAD_REQUEST, "Iterations must be between 1 and 10")
        }
    }

    let intensity = upload.fields.get(FIELD_INTENSITY).map_or(Ok(1.0), |v| v.parse::<f64>());
    match intensity {
        Ok(x) if INTENSITY_RANGE.contains(&x) => {}
        _ => {
            return error_response(StatusCode::BAD_REQUEST, "Intensity must be between 0.1 and 2.0")
        }
    }

    let file = match image_file(upload) {
        Ok(file) => file,
        Err(response) => return response,
    };

    let extension = if file.content_type.as_deref() == Some("image/jpeg") {
        "jpeg"
    } else {
        "png"
    };
    let media_type = format!("image/{}", extension);
    let disposition = format!("attachment; filename=processed_image.{}", extension);

    info!(
        "🧪 Echoing {} ({} bytes)",
        file.file_name.as_deref().unwrap_or("upload"),
        file.data.len()
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, media_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.data,
    )
        .into_response()
}

async fn analyze_handler(State(state): State<Arc<MockState>>, multipart: Multipart) -> Response {
    state.hits.analyze.fetch_add(1, Ordering::SeqCst);

    let file = match read_upload(multipart).await.and_then(image_file) {
        Ok(file) => file,
        Err(response) => return response,
    };

    match analyze(&file) {
        Ok(wire) => Json(wire).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error analyzing image: {}", e),
        ),
    }
}

fn analyze(file: &UploadedFile) -> image::ImageResult<AnalysisWire> {
    let format = image::guess_format(&file.data)?;
    let img = image::load_from_memory_with_format(&file.data, format)?;

    Ok(AnalysisWire {
        filename: file.file_name.clone(),
        format: Some(format!("{:?}", format).to_uppercase()),
        mode: color_mode(img.color()),
        size: ImageSize {
            width: img.width(),
            height: img.height(),
        },
        file_size_bytes: file.data.len() as u64,
        estimated_ai_detection_risk: RISK_PLACEHOLDER.to_string(),
    })
}

fn color_mode(color: ColorType) -> String {
    match color {
        ColorType::L8 | ColorType::L16 => "L".to_string(),
        ColorType::La8 | ColorType::La16 => "LA".to_string(),
        ColorType::Rgb8 | ColorType::Rgb16 | ColorType::Rgb32F => "RGB".to_string(),
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => "RGBA".to_string(),
        other => format!("{:?}", other),
    }
}
