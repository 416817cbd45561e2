//! # Upload Requests
//!
//! Validated upload parameters and their multipart encoding.
//!
//! [`UploadRequest`] is checked once, when it is built, and is immutable
//! afterwards. [`UploadForm`] is the transport-ready encoding: an ordered list
//! of named fields that can be turned into a fresh `reqwest` multipart body for
//! every attempt (multipart bodies are consumed by sending them, so a retry
//! cannot reuse the previous one).

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::ops::RangeInclusive;
use std::path::Path;

use super::error::ApiFailure;

/// Accepted values for [`UploadRequest::iterations`].
pub const ITERATIONS_RANGE: RangeInclusive<u8> = 1..=10;

/// Accepted values for [`UploadRequest::intensity`].
pub const INTENSITY_RANGE: RangeInclusive<f64> = 0.1..=2.0;

pub const FIELD_FILE: &str = "file";
pub const FIELD_ITERATIONS: &str = "iterations";
pub const FIELD_INTENSITY: &str = "intensity";

/// An image file held in memory, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    file_name: String,
    content_type: String,
    bytes: Bytes,
}

impl ImagePayload {
    /// Wraps raw image bytes.
    ///
    /// # Errors
    /// `InvalidRequest` if `content_type` is not an `image/*` type. The service
    /// refuses anything else with a 400, so there is no point uploading it.
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Result<Self, ApiFailure> {
        let content_type = content_type.into();
        if !content_type.starts_with("image/") {
            return Err(ApiFailure::invalid_request(format!(
                "File must be an image (got content type '{}')",
                content_type
            )));
        }

        Ok(Self {
            file_name: file_name.into(),
            content_type,
            bytes: bytes.into(),
        })
    }

    /// Reads an image file, guessing its content type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(file_name, content_type, bytes)?)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Parameters of one processing operation.
///
/// # Ranges
/// - `iterations`: number of processing passes, [`ITERATIONS_RANGE`] (1–10)
/// - `intensity`: noise strength multiplier, [`INTENSITY_RANGE`] (0.1–2.0)
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    payload: ImagePayload,
    iterations: u8,
    intensity: f64,
}

impl UploadRequest {
    /// Validates and builds a request.
    ///
    /// # Errors
    /// `InvalidRequest` when either scalar is outside its documented range
    /// (a NaN intensity is out of range).
    ///
    /// # Example
    /// ```
    /// use deaify_client::common::request::{ImagePayload, UploadRequest};
    ///
    /// let payload = ImagePayload::new("a.png", "image/png", vec![1, 2, 3]).unwrap();
    /// assert!(UploadRequest::new(payload.clone(), 2, 1.0).is_ok());
    /// assert!(UploadRequest::new(payload, 11, 1.0).is_err());
    /// ```
    pub fn new(payload: ImagePayload, iterations: u8, intensity: f64) -> Result<Self, ApiFailure> {
        if !ITERATIONS_RANGE.contains(&iterations) {
            return Err(ApiFailure::invalid_request(format!(
                "Iterations must be between {} and {} (got {})",
                ITERATIONS_RANGE.start(),
                ITERATIONS_RANGE.end(),
                iterations
            )));
        }
        if !INTENSITY_RANGE.contains(&intensity) {
            return Err(ApiFailure::invalid_request(format!(
                "Intensity must be between {} and {} (got {})",
                INTENSITY_RANGE.start(),
                INTENSITY_RANGE.end(),
                intensity
            )));
        }

        Ok(Self {
            payload,
            iterations,
            intensity,
        })
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }

    pub fn iterations(&self) -> u8 {
        self.iterations
    }

    pub fn intensity(&self) -> f64 {
        self.intensity
    }
}

/// Value of a single multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    File(ImagePayload),
    Text(String),
}

/// Ordered multipart fields of an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    fields: Vec<(&'static str, FieldValue)>,
}

impl UploadForm {
    /// Encodes a processing request: `file`, then `iterations`, then
    /// `intensity`, scalars as decimal strings (`2`, `1`, `0.5`).
    pub fn process(request: &UploadRequest) -> Self {
        Self {
            fields: vec![
                (FIELD_FILE, FieldValue::File(request.payload.clone())),
                (FIELD_ITERATIONS, FieldValue::Text(request.iterations.to_string())),
                (FIELD_INTENSITY, FieldValue::Text(request.intensity.to_string())),
            ],
        }
    }

    /// Encodes an analysis request: just the `file` field.
    pub fn analyze(payload: &ImagePayload) -> Self {
        Self {
            fields: vec![(FIELD_FILE, FieldValue::File(payload.clone()))],
        }
    }

    pub fn fields(&self) -> &[(&'static str, FieldValue)] {
        &self.fields
    }

    /// Text value of a scalar field, if present.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(field, value)| match value {
            FieldValue::Text(text) if *field == name => Some(text.as_str()),
            _ => None,
        })
    }

    /// Materialises a fresh multipart body. Called once per attempt.
    pub fn to_multipart(&self) -> Result<Form, ApiFailure> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = match value {
                FieldValue::Text(text) => form.text(*name, text.clone()),
                FieldValue::File(payload) => {
                    let part = Part::bytes(payload.bytes.to_vec())
                        .file_name(payload.file_name.clone())
                        .mime_str(&payload.content_type)
                        .map_err(|e| ApiFailure::invalid_request(format!("Invalid content type: {}", e)))?;
                    form.part(*name, part)
                }
            };
        }
        Ok(form)
    }
}
