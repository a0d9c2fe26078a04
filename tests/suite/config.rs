//! Config file loading and its effect on outgoing requests.

use std::fs;

use bodycode_engine::{App, BodycodeConfig, ConfigError, GeminiTransport};
use bodycode_providers::gemini::GeminiClient;
use wiremock::MockServer;

use crate::common::{TEST_KEY, generate_path, mount_generate, png, request_bodies};

#[test]
fn missing_file_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = BodycodeConfig::load_from(&dir.path().join("config.toml")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[app\nmodel = ").unwrap();

    let err = BodycodeConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert_eq!(err.path(), &path);
}

#[tokio::test]
async fn configured_endpoint_and_models_are_used() {
    let server = MockServer::start().await;
    mount_generate(
        &server,
        "gemini-2.5-pro",
        "{\"score\": 40, \"explanation\": \"철분과 칼슘은 흡수를 방해합니다.\"}",
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        format!(
            "[api_keys]\ngoogle = \"{TEST_KEY}\"\n\n\
             [app]\ncompatibility_model = \"gemini-2.5-pro\"\nvalidation_model = \"not a model\"\n\n\
             [gemini]\nbase_url = \"{}/\"\nmax_output_tokens = 2048\n",
            server.uri()
        ),
    )
    .unwrap();

    let config = BodycodeConfig::load_from(&path).unwrap().unwrap();
    let key = config.resolve_api_key().unwrap();
    assert_eq!(key.expose_secret(), TEST_KEY);

    let models = config.models();
    assert_eq!(models.compatibility.as_str(), "gemini-2.5-pro");
    assert_eq!(models.validation.as_str(), "gemini-3-flash-preview");

    let api = config.api_config(key);
    assert_eq!(api.base_url(), server.uri());
    let client = GeminiClient::with_http_client(api, reqwest::Client::new());
    let mut app = App::new(GeminiTransport::new(client, models));

    let result = app.check_compatibility(Some(png()), "칼슘").await.unwrap();
    assert_eq!(result.score(), 40);

    let bodies = request_bodies(&server, &generate_path("gemini-2.5-pro")).await;
    assert_eq!(bodies[0]["generationConfig"]["maxOutputTokens"], 2048);
}
