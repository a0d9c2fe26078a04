//! Shared test utilities and fixtures
//!
//! A wiremock server standing in for the Gemini API, plus clients wired to it.

#![allow(dead_code)]

use std::time::Duration;

use bodycode_engine::{ApiConfig, App, GeminiTransport, ModelSettings};
use bodycode_providers::gemini::GeminiClient;
use bodycode_providers::retry::RetryConfig;
use bodycode_types::{ApiKey, InlineImage};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY: &str = "AIzaTestKey0123456789";

pub fn stream_path(model: &str) -> String {
    format!("/models/{model}:streamGenerateContent")
}

pub fn generate_path(model: &str) -> String {
    format!("/models/{model}:generateContent")
}

/// Client talking plain HTTP to `server`, without retry back-off.
pub fn client_for(server: &MockServer) -> GeminiClient {
    let config = ApiConfig::new(ApiKey::new(TEST_KEY).unwrap())
        .with_base_url(server.uri())
        .with_stream_idle_timeout(Duration::from_secs(5));
    GeminiClient::with_http_client(config, reqwest::Client::new()).with_retry_config(RetryConfig {
        max_retries: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        jitter_factor: 0.0,
    })
}

pub fn app_for(server: &MockServer) -> App<GeminiTransport> {
    App::new(GeminiTransport::new(
        client_for(server),
        ModelSettings::default(),
    ))
}

pub fn png() -> InlineImage {
    InlineImage::new("image/png", "iVBORw0KGgo=")
}

/// One streamed chunk carrying `text`.
pub fn text_chunk(text: &str) -> Value {
    json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
}

/// Final chunk: `text`, a STOP finish reason and usage.
pub fn final_chunk(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 48}
    })
}

pub fn sse_body(chunks: &[Value]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("data: {chunk}\r\n\r\n"))
        .collect()
}

/// Answer the next stream request for `model` with `chunks`.
pub async fn mount_stream_once(server: &MockServer, model: &str, chunks: &[Value]) {
    Mock::given(method("POST"))
        .and(path(stream_path(model)))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", TEST_KEY))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(chunks), "text/event-stream"),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Answer one-shot requests for `model` with `text`.
pub async fn mount_generate(server: &MockServer, model: &str, text: &str) {
    let body = json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    });
    Mock::given(method("POST"))
        .and(path(generate_path(model)))
        .and(header("x-goog-api-key", TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, route: String, status: u16, body: Value) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// JSON bodies of every request the server has received for `route`.
pub async fn request_bodies(server: &MockServer, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == route)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}
