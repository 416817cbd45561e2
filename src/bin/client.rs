//! # Client Binary Entry Point
//!
//! Thin wrapper that processes (or analyzes) one image file through the
//! client middleware.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --image photo.png --iterations 2 --intensity 1.0
//! cargo run --bin client -- --image photo.png --analyze
//! cargo run --bin client -- --config config/client.toml --api-url https://images.example.com \
//!   --image photo.png --metrics-output ./metrics/run.json
//! ```
//!
//! The client will:
//! 1. Load configuration (TOML file, or built-in defaults)
//! 2. Check the service's health
//! 3. Upload the image, retrying while the service answers 503
//! 4. Log the (estimated) progress while waiting
//! 5. Write the result next to the input as `deaified_<name>`

use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use deaify_client::client::{ClientCore, ClientMetrics, ClientMiddleware, ProgressEstimator};
use deaify_client::common::config::{load_config, ClientConfig};
use deaify_client::common::request::{ImagePayload, UploadRequest};

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Base URL of the processing service (overrides the config file)
    #[arg(long, env = "DEAIFY_API_URL")]
    api_url: Option<String>,

    /// Image file to upload
    #[arg(short, long)]
    image: PathBuf,

    /// Number of processing passes (1-10)
    #[arg(long, default_value_t = 2)]
    iterations: u8,

    /// Processing intensity (0.1-2.0)
    #[arg(long, default_value_t = 1.0)]
    intensity: f64,

    /// Where to write the processed image (default: deaified_<name> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print image analysis instead of processing
    #[arg(long)]
    analyze: bool,

    /// Path to write metrics JSON output (optional)
    #[arg(long)]
    metrics_output: Option<String>,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// INFO by default, `RUST_LOG` overrides.
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// `photo.png` -> `deaified_photo.png`, in the same directory.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    input.with_file_name(format!("deaified_{}.{}", stem, extension))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    let mut config: ClientConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(api_url) = args.api_url.clone() {
        config = config.with_base_url(api_url);
    }

    let core = Arc::new(ClientCore::new(&config)?);
    let mut middleware = ClientMiddleware::new(config.clone(), core);

    let metrics = if args.metrics_output.is_some() {
        let m = Arc::new(Mutex::new(ClientMetrics::new("client".to_string())));
        middleware = middleware.with_metrics(m.clone());
        Some(m)
    } else {
        None
    };

    let payload = ImagePayload::from_path(&args.image).await?;

    if args.analyze {
        let analysis = middleware.analyze_image(&payload).await?;
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let request = UploadRequest::new(payload, args.iterations, args.intensity)?;

    // Log the estimate as it moves.
    let progress = ProgressEstimator::new(config.progress.clone());
    let mut updates = progress.subscribe();
    let reporter = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let value = *updates.borrow_and_update();
            if value > 0 {
                info!("⏳ Processing your image... {}% (estimated)", value);
            }
        }
    });

    let result = middleware.process_image(&request, &progress).await;
    reporter.abort();

    if let Some(metrics) = metrics {
        if let Some(output_path) = &args.metrics_output {
            let metrics = metrics
                .lock()
                .map_err(|_| anyhow::anyhow!("Metrics lock poisoned"))?;
            metrics
                .export_to_json(output_path)
                .with_context(|| format!("Failed to write metrics to {}", output_path))?;
            println!("Metrics exported to: {}", output_path);
        }
    }

    let image = result?;
    let output = args.output.unwrap_or_else(|| default_output(&args.image));
    tokio::fs::write(&output, &image)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Processed image written to: {}", output.display());

    Ok(())
}
