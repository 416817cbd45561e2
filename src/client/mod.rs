//! # Client Components
//!
//! The client is split the same way as a request flows through it:
//!
//! ## Core Client ([`client`])
//! One HTTP exchange per call: health probe, a single processing attempt, or
//! an analysis request.
//!
//! ## Client Middleware ([`middleware`])
//! Coordination around the core:
//! - Health gate before any upload
//! - Retry logic (3 attempts, 120 s deadline each, 2 s / 4 s backoff on 503)
//! - Fabricated progress estimate while the upload is outstanding
//! - Optional metrics
//!
//! ## Supporting modules
//! - [`retry`]: attempt loop and reply classification
//! - [`progress`]: the fabricated progress estimate
//! - [`metrics`]: per-operation statistics and JSON export

pub mod client;
pub mod metrics;
pub mod middleware;
pub mod progress;
pub mod retry;

// Re-export for convenience
pub use client::ClientCore;
pub use metrics::ClientMetrics;
pub use middleware::ClientMiddleware;
pub use progress::{ProgressEstimator, ProgressHandle};
pub use retry::{RetryPolicy, RetryState};
