//! # Configuration
//!
//! Client settings loaded from a TOML file. Every section and field has a
//! default, so an empty file (or no file at all, via [`ClientConfig::default`])
//! describes the stock behaviour of the client.
//!
//! # Example TOML
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//!
//! [timeouts]
//! health_secs = 10
//! process_secs = 120
//! connect_secs = 10
//!
//! [retry]
//! max_attempts = 3
//! backoff_base_ms = 2000
//!
//! [progress]
//! tick_ms = 200
//! step = 10
//! cap = 90
//! settle_ms = 1000
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Default service address: the processing service running locally on its
/// standard port. Point `api.base_url` at the hosted deployment instead.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: T = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api: ApiConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub progress: ProgressConfig,
}

impl ClientConfig {
    /// Same configuration aimed at another service address.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api.base_url = base_url.into();
        self
    }
}

/// Where the processing service lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL without a trailing route, e.g. `http://localhost:8000`
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Hard deadlines. Exceeding one aborts the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Liveness probe budget (seconds)
    pub health_secs: f64,
    /// Budget of each processing attempt, body download included (seconds)
    pub process_secs: f64,
    /// TCP connect budget applied to every request (seconds)
    pub connect_secs: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            health_secs: 10.0,
            process_secs: 120.0,
            connect_secs: 10.0,
        }
    }
}

impl TimeoutConfig {
    pub fn health(&self) -> Duration {
        seconds(self.health_secs, 10.0)
    }

    pub fn process(&self) -> Duration {
        seconds(self.process_secs, 120.0)
    }

    pub fn connect(&self) -> Duration {
        seconds(self.connect_secs, 10.0)
    }
}

/// Negative or non-finite values fall back to `default`.
fn seconds(value: f64, default: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(default))
}

/// Retry policy for `503` answers from the processing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Wait before attempt `n + 1` is `n * backoff_base_ms`
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 2000,
        }
    }
}

/// Timing of the fabricated progress estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub tick_ms: u64,
    pub step: u8,
    /// Highest value reached while a request is outstanding; stays below 100
    pub cap: u8,
    /// Delay between settlement and the reset to 0
    pub settle_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_ms: 200,
            step: 10,
            cap: 90,
            settle_ms: 1000,
        }
    }
}
