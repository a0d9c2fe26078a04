//! Chat streaming against a mock Gemini endpoint.

use bodycode_types::{ModelName, Part, StreamEvent};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::MockServer;

use crate::common::{
    client_for, final_chunk, mount_status, mount_stream_once, request_bodies, stream_path,
    text_chunk,
};

const MODEL: &str = "gemini-3-flash-preview";

async fn collect(session: &bodycode_providers::gemini::ChatSession, text: &str) -> Vec<StreamEvent> {
    let (tx, mut rx) = mpsc::channel(64);
    session
        .send_message_stream(vec![Part::text(text)], tx)
        .await
        .unwrap();
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn text_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::TextDelta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn fragments_arrive_in_order_and_end_with_done() {
    let server = MockServer::start().await;
    mount_stream_once(
        &server,
        MODEL,
        &[text_chunk("### 🔬 종합"), text_chunk(" 분석\n"), final_chunk("양호합니다")],
    )
    .await;

    let session = client_for(&server).start_chat(ModelName::chat_default(), "시스템 지침");
    let events = collect(&session, "분석해주세요").await;

    assert_eq!(text_of(&events), "### 🔬 종합 분석\n양호합니다");
    assert_eq!(events.last(), Some(&StreamEvent::Done));
    assert!(events.iter().any(|e| matches!(e, StreamEvent::Usage(u) if u.output_tokens == 48)));

    let bodies = request_bodies(&server, &stream_path(MODEL)).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["system_instruction"]["parts"][0]["text"], "시스템 지침");
    assert_eq!(bodies[0]["contents"][0]["parts"][0]["text"], "분석해주세요");
}

#[tokio::test]
async fn completed_turn_is_resent_as_history() {
    let server = MockServer::start().await;
    mount_stream_once(&server, MODEL, &[final_chunk("첫 답변")]).await;
    mount_stream_once(&server, MODEL, &[final_chunk("두 번째 답변")]).await;

    let session = client_for(&server).start_chat(ModelName::chat_default(), "지침");
    collect(&session, "첫 질문").await;
    assert_eq!(session.history_len(), 2);
    collect(&session, "두 번째 질문").await;
    assert_eq!(session.history_len(), 4);

    let bodies = request_bodies(&server, &stream_path(MODEL)).await;
    let second = &bodies[1]["contents"];
    assert_eq!(second.as_array().unwrap().len(), 3);
    assert_eq!(second[0]["parts"][0]["text"], "첫 질문");
    assert_eq!(second[1]["role"], "model");
    assert_eq!(second[1]["parts"][0]["text"], "첫 답변");
    assert_eq!(second[2]["parts"][0]["text"], "두 번째 질문");
}

#[tokio::test]
async fn clear_history_starts_fresh() {
    let server = MockServer::start().await;
    mount_stream_once(&server, MODEL, &[final_chunk("답변")]).await;
    mount_stream_once(&server, MODEL, &[final_chunk("새 답변")]).await;

    let session = client_for(&server).start_chat(ModelName::chat_default(), "지침");
    collect(&session, "질문").await;
    session.clear_history();
    collect(&session, "새 질문").await;

    let bodies = request_bodies(&server, &stream_path(MODEL)).await;
    assert_eq!(bodies[1]["contents"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn http_error_becomes_error_event_and_keeps_history() {
    let server = MockServer::start().await;
    mount_status(
        &server,
        stream_path(MODEL),
        500,
        json!({"error": {"code": 500, "message": "internal"}}),
    )
    .await;

    let session = client_for(&server).start_chat(ModelName::chat_default(), "지침");
    let events = collect(&session, "질문").await;

    assert!(matches!(events.as_slice(), [StreamEvent::Error(msg)] if msg.contains("500")));
    assert_eq!(session.history_len(), 0);
}

#[tokio::test]
async fn eof_without_finish_reason_is_an_error() {
    let server = MockServer::start().await;
    mount_stream_once(&server, MODEL, &[text_chunk("중간까지")]).await;

    let session = client_for(&server).start_chat(ModelName::chat_default(), "지침");
    let events = collect(&session, "질문").await;

    assert_eq!(text_of(&events), "중간까지");
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Error(msg)) if msg.contains("closed before stream completed")
    ));
    assert_eq!(session.history_len(), 0);
}

#[tokio::test]
async fn safety_stop_reports_error_after_partial_text() {
    let server = MockServer::start().await;
    let blocked = json!({
        "candidates": [{
            "content": {"parts": [{"text": "부분"}]},
            "finishReason": "SAFETY"
        }]
    });
    mount_stream_once(&server, MODEL, &[blocked]).await;

    let session = client_for(&server).start_chat(ModelName::chat_default(), "지침");
    let events = collect(&session, "질문").await;

    assert_eq!(text_of(&events), "부분");
    assert!(matches!(events.last(), Some(StreamEvent::Error(_))));
    assert_eq!(session.history_len(), 0);
}
