//! Document gate and compatibility scoring over HTTP.

use bodycode_engine::{AnalysisError, CompatibilityGrade, GeminiTransport, ModelSettings, validate};
use serde_json::json;
use wiremock::MockServer;

use crate::common::{
    app_for, client_for, generate_path, mount_generate, mount_status, png, request_bodies,
};

const VALIDATION_MODEL: &str = "gemini-3-flash-preview";
const COMPATIBILITY_MODEL: &str = "gemini-3-pro-image-preview";

fn transport(server: &MockServer) -> GeminiTransport {
    GeminiTransport::new(client_for(server), ModelSettings::default())
}

#[tokio::test]
async fn gate_accepts_yes_and_sends_prompt_then_image() {
    let server = MockServer::start().await;
    mount_generate(&server, VALIDATION_MODEL, "YES\n").await;

    assert!(validate(Some(&transport(&server)), &png()).await);

    let bodies = request_bodies(&server, &generate_path(VALIDATION_MODEL)).await;
    let parts = &bodies[0]["contents"][0]["parts"];
    assert!(parts[0]["text"].as_str().unwrap().contains("\"YES\" 또는 \"NO\""));
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
    assert!(bodies[0].get("system_instruction").is_none());
    assert!(bodies[0]["generationConfig"].get("responseMimeType").is_none());
}

#[tokio::test]
async fn gate_rejects_other_replies() {
    let server = MockServer::start().await;
    mount_generate(&server, VALIDATION_MODEL, "NO").await;
    assert!(!validate(Some(&transport(&server)), &png()).await);
}

#[tokio::test]
async fn gate_fails_closed_on_http_error() {
    let server = MockServer::start().await;
    mount_status(
        &server,
        generate_path(VALIDATION_MODEL),
        400,
        json!({"error": {"code": 400, "message": "API key not valid"}}),
    )
    .await;
    assert!(!validate(Some(&transport(&server)), &png()).await);
    assert!(!validate::<GeminiTransport>(None, &png()).await);
}

#[tokio::test]
async fn compatibility_requests_json_and_parses_fenced_reply() {
    let server = MockServer::start().await;
    mount_generate(
        &server,
        COMPATIBILITY_MODEL,
        "```json\n{\"score\": 85, \"explanation\": \"함께 복용해도 좋습니다.\"}\n```",
    )
    .await;

    let mut app = app_for(&server);
    let result = app
        .check_compatibility(Some(png()), "오메가3, 비타민D")
        .await
        .unwrap();

    assert_eq!(result.score(), 85);
    assert_eq!(result.grade(), CompatibilityGrade::Good);
    assert_eq!(result.explanation(), "함께 복용해도 좋습니다.");
    assert_eq!(app.compatibility(), Some(&result));

    let bodies = request_bodies(&server, &generate_path(COMPATIBILITY_MODEL)).await;
    assert_eq!(
        bodies[0]["generationConfig"]["responseMimeType"],
        "application/json"
    );
    let prompt = bodies[0]["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("오메가3, 비타민D"));
}

#[tokio::test]
async fn compatibility_reply_without_score_is_parse_error() {
    let server = MockServer::start().await;
    mount_generate(&server, COMPATIBILITY_MODEL, "{\"explanation\": \"?\"}").await;

    let mut app = app_for(&server);
    let err = app.check_compatibility(Some(png()), "").await.unwrap_err();
    assert!(matches!(err, AnalysisError::Parse(_)));
    assert!(app.compatibility().is_none());
}

#[tokio::test]
async fn compatibility_http_error_hides_api_key() {
    let server = MockServer::start().await;
    mount_status(
        &server,
        generate_path(COMPATIBILITY_MODEL),
        403,
        json!({"error": {"code": 403, "message": "key AIzaLeakedKey123 is blocked"}}),
    )
    .await;

    let mut app = app_for(&server);
    let err = app.check_compatibility(Some(png()), "").await.unwrap_err();
    match err {
        AnalysisError::Transport(detail) => {
            assert!(detail.contains("403"), "{detail}");
            assert!(!detail.contains("AIzaLeakedKey123"), "{detail}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
