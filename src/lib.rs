//! Resilient client for a remote image-processing service.
//!
//! - [`client`]: health gate, retrying transport, fabricated progress, metrics
//! - [`common`]: failure taxonomy, wire types, upload encoding, configuration
//! - [`server`]: mock processing service for development and tests

pub mod client;
pub mod common;
pub mod server;

pub use client::{ClientCore, ClientMiddleware, ProgressEstimator};
pub use common::config::ClientConfig;
pub use common::error::{ApiFailure, FailureKind};
pub use common::request::{ImagePayload, UploadRequest};
