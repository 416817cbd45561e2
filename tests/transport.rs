mod common;

use axum::http::StatusCode;
use std::sync::{Arc, Mutex};

use deaify_client::client::{ClientMetrics, ProgressEstimator};
use deaify_client::common::error::FailureKind;
use deaify_client::common::request::UploadForm;
use deaify_client::server::MockService;

#[tokio::test]
async fn test_immediate_success_returns_uploaded_bytes() {
    let server = common::spawn(MockService::new()).await;
    let config = common::config_for(&server);
    let middleware = common::middleware(&config);
    let progress = ProgressEstimator::new(config.progress.clone());

    let image = middleware
        .process_image(&common::tiny_request(), &progress)
        .await
        .unwrap();

    assert_eq!(image.as_ref(), &[1u8, 2, 3, 4]);
    assert_eq!(server.hits().health, 1);
    assert_eq!(server.hits().process, 1);
    assert_eq!(progress.value(), 100);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = common::spawn(
        MockService::new().with_process_statuses([
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::SERVICE_UNAVAILABLE,
        ]),
    )
    .await;
    let config = common::config_for(&server);
    let metrics = Arc::new(Mutex::new(ClientMetrics::new("test".to_string())));
    let middleware = common::middleware(&config).with_metrics(metrics.clone());
    let progress = ProgressEstimator::new(config.progress.clone());

    let image = middleware
        .process_image(&common::tiny_request(), &progress)
        .await
        .unwrap();

    assert_eq!(image.len(), 4);
    assert_eq!(server.hits().process, 3);

    let metrics = metrics.lock().unwrap();
    let record = &metrics.requests()[0];
    assert!(record.success);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.backoff_ms, 20 + 40);
}

#[tokio::test]
async fn test_three_transient_failures_give_up() {
    let server = common::spawn(
        MockService::new().with_process_statuses([StatusCode::SERVICE_UNAVAILABLE; 3]),
    )
    .await;
    let config = common::config_for(&server);
    let middleware = common::middleware(&config);
    let progress = ProgressEstimator::new(config.progress.clone());

    let failure = middleware
        .process_image(&common::tiny_request(), &progress)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::TransientService);
    assert_eq!(failure.status(), Some(503));
    assert!(failure.message().contains("temporarily unavailable"));
    assert_eq!(server.hits().process, 3);
    assert!(progress.value() < 100);
}

#[tokio::test]
async fn test_rate_limit_is_not_retried() {
    let server =
        common::spawn(MockService::new().with_process_statuses([StatusCode::TOO_MANY_REQUESTS]))
            .await;
    let config = common::config_for(&server);
    let middleware = common::middleware(&config);

    let failure = middleware
        .send(&UploadForm::process(&common::tiny_request()))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::RateLimit);
    assert_eq!(failure.status(), Some(429));
    assert!(failure.message().contains("Rate limit"));
    assert_eq!(server.hits().process, 1);
}

#[tokio::test]
async fn test_other_status_carries_response_body() {
    let server =
        common::spawn(MockService::new().with_process_statuses([StatusCode::NOT_FOUND])).await;
    let config = common::config_for(&server);
    let middleware = common::middleware(&config);

    let failure = middleware
        .send(&UploadForm::process(&common::tiny_request()))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::GenericRequest);
    assert_eq!(failure.status(), Some(404));
    assert!(failure.message().contains("scripted failure 404"));

    let raw = failure.raw_response().unwrap();
    assert_eq!(raw.status.as_u16(), 404);
    assert_eq!(raw.body.as_deref(), Some("scripted failure 404"));
}

#[tokio::test]
async fn test_unreachable_service_is_network_failure() {
    // Grab a free port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = deaify_client::ClientConfig::default().with_base_url(format!("http://{}", addr));
    let middleware = common::middleware(&config);

    let failure = middleware
        .send(&UploadForm::process(&common::tiny_request()))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::Network);
    assert_eq!(failure.status(), None);
}

#[tokio::test]
async fn test_concurrent_operations_are_independent() {
    let server = common::spawn(MockService::new()).await;
    let config = common::config_for(&server);
    let middleware = common::middleware(&config);
    let progress_a = ProgressEstimator::new(config.progress.clone());
    let progress_b = ProgressEstimator::new(config.progress.clone());
    let request = common::tiny_request();

    let (a, b) = tokio::join!(
        middleware.process_image(&request, &progress_a),
        middleware.process_image(&request, &progress_b),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(server.hits().process, 2);
    assert_eq!(progress_a.value(), 100);
    assert_eq!(progress_b.value(), 100);
}
