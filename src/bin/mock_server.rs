//! Mock processing service for local development.
//!
//! ```bash
//! cargo run --bin mock_server -- --addr 127.0.0.1:8000 --fail-503 2
//! ```

use axum::http::StatusCode;
use clap::Parser;
use log::info;
use std::time::Duration;

use deaify_client::server::MockService;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: String,

    /// Answer this many processing requests with 503 before succeeding
    #[arg(long, default_value_t = 0)]
    fail_503: usize,

    /// Answer this many processing requests (after the 503s) with 429
    #[arg(long, default_value_t = 0)]
    fail_429: usize,

    /// Stall every health probe for this many milliseconds
    #[arg(long, default_value_t = 0)]
    health_delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let script = std::iter::repeat(StatusCode::SERVICE_UNAVAILABLE)
        .take(args.fail_503)
        .chain(std::iter::repeat(StatusCode::TOO_MANY_REQUESTS).take(args.fail_429));

    let server = MockService::new()
        .with_process_statuses(script)
        .with_health_delay(Duration::from_millis(args.health_delay_ms))
        .spawn(&args.addr)
        .await?;

    info!("🌐 Mock service running on {}", server.base_url());
    server.wait().await
}
