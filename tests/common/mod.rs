#![allow(dead_code)]

use std::sync::Arc;

use deaify_client::client::{ClientCore, ClientMiddleware};
use deaify_client::common::config::ClientConfig;
use deaify_client::common::request::{ImagePayload, UploadRequest};
use deaify_client::server::{MockServer, MockService};

/// Stock configuration aimed at `server`, with millisecond backoff so retry
/// scenarios run quickly over real sockets.
pub fn config_for(server: &MockServer) -> ClientConfig {
    let mut config = ClientConfig::default().with_base_url(server.base_url());
    config.retry.backoff_base_ms = 20;
    config
}

pub async fn spawn(service: MockService) -> MockServer {
    service.spawn("127.0.0.1:0").await.unwrap()
}

pub fn middleware(config: &ClientConfig) -> ClientMiddleware {
    let core = Arc::new(ClientCore::new(config).unwrap());
    ClientMiddleware::new(config.clone(), core)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut data = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut data), image::ImageOutputFormat::Png)
        .unwrap();
    data
}

pub fn tiny_request() -> UploadRequest {
    let payload = ImagePayload::new("tiny.png", "image/png", vec![1u8, 2, 3, 4]).unwrap();
    UploadRequest::new(payload, 2, 1.0).unwrap()
}
