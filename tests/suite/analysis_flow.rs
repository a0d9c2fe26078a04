//! Full analysis sessions through the engine and a mock Gemini server.

use bodycode_engine::{
    AdditionalInfo, AnalysisCategory, AnalysisError, FOLLOW_UP_ERROR_TEXT, StressLevel,
    TurnOutcome, View,
};
use bodycode_types::Role;
use serde_json::json;
use wiremock::MockServer;

use crate::common::{
    app_for, final_chunk, generate_path, mount_generate, mount_status, mount_stream_once, png,
    request_bodies, stream_path, text_chunk,
};

const MODEL: &str = "gemini-3-flash-preview";

const ANALYSIS: &str = "### 🔬 종합 분석\n체지방률이 다소 높습니다.\n\
### 🧠 장-뇌 축 관점 해설\n스트레스가 장 환경에 영향을 줍니다.\n\
### 💊 추천 영양 성분\n- **프로바이오틱스:** 장내 균형\n- **마그네슘:** 긴장 완화\n\
### 오늘의 장-뇌 축 팁\n물을 충분히 드세요.";

#[tokio::test]
async fn analysis_then_follow_up_over_one_chat() {
    let server = MockServer::start().await;
    mount_generate(&server, MODEL, "YES").await;
    let (head, tail) = ANALYSIS.split_at(ANALYSIS.find("### 🧠").unwrap());
    mount_stream_once(&server, MODEL, &[text_chunk(head), final_chunk(tail)]).await;
    mount_stream_once(&server, MODEL, &[final_chunk("하루 2회 복용하세요.")]).await;

    let mut app = app_for(&server);
    app.set_image(png());
    app.set_additional_info(AdditionalInfo {
        stress: StressLevel::High,
        notes: "혈압약 복용 중".to_string(),
        ..AdditionalInfo::default()
    });

    app.start_analysis().await.unwrap();
    assert_eq!(app.view(), View::Chatting);
    assert_eq!(app.finish_turn().await, Some(TurnOutcome::AnalysisCompleted));

    let document = app.analysis().unwrap();
    assert_eq!(
        document.get(AnalysisCategory::Overview),
        Some("체지방률이 다소 높습니다.")
    );
    assert_eq!(document.tip(), Some("물을 충분히 드세요."));
    assert_eq!(app.supplements(), ["프로바이오틱스", "마그네슘"]);
    assert!(!app.reminders().is_empty());

    app.send_follow_up("  프로바이오틱스는 언제 먹나요?  ").unwrap();
    assert_eq!(app.finish_turn().await, Some(TurnOutcome::ReplyCompleted));

    let follow_ups = app.follow_ups();
    assert_eq!(follow_ups.len(), 2);
    assert_eq!(follow_ups[0].role, Role::User);
    assert_eq!(follow_ups[0].text, "프로바이오틱스는 언제 먹나요?");
    assert_eq!(follow_ups[1].text, "하루 2회 복용하세요.");

    let bodies = request_bodies(&server, &stream_path(MODEL)).await;
    assert_eq!(bodies.len(), 2);
    let first = &bodies[0]["contents"][0]["parts"];
    let request_text = first[0]["text"].as_str().unwrap();
    assert!(request_text.contains("높음"));
    assert!(request_text.contains("혈압약 복용 중"));
    assert_eq!(first[1]["inlineData"]["mimeType"], "image/png");
    assert!(
        bodies[0]["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("### 💊 추천 영양 성분")
    );

    // The follow-up carries the analysis exchange as history.
    let second = bodies[1]["contents"].as_array().unwrap();
    assert_eq!(second.len(), 3);
    assert_eq!(second[1]["parts"][0]["text"], ANALYSIS);
    assert_eq!(second[2]["parts"][0]["text"], "프로바이오틱스는 언제 먹나요?");
}

#[tokio::test]
async fn rejected_image_never_reaches_chat() {
    let server = MockServer::start().await;
    mount_generate(&server, MODEL, "NO").await;

    let mut app = app_for(&server);
    app.set_image(png());
    let err = app.start_analysis().await.unwrap_err();

    assert_eq!(err, AnalysisError::ValidationRejected);
    assert_eq!(app.error(), Some(&AnalysisError::ValidationRejected));
    assert!(app.image().is_none());
    assert!(app.turns().is_empty());
    assert!(request_bodies(&server, &stream_path(MODEL)).await.is_empty());
}

#[tokio::test]
async fn failed_analysis_returns_to_upload_screen() {
    let server = MockServer::start().await;
    mount_generate(&server, MODEL, "YES").await;
    mount_status(
        &server,
        stream_path(MODEL),
        503,
        json!({"error": {"message": "The model is overloaded."}}),
    )
    .await;

    let mut app = app_for(&server);
    app.set_image(png());
    app.start_analysis().await.unwrap();

    let outcome = app.finish_turn().await;
    assert!(matches!(
        outcome,
        Some(TurnOutcome::AnalysisFailed(AnalysisError::Transport(ref detail)))
            if detail.contains("overloaded")
    ));
    assert_eq!(app.view(), View::PreAnalysis);
    assert!(app.turns().is_empty());
    assert!(app.image().is_some());
    assert!(matches!(app.error(), Some(AnalysisError::Transport(_))));
}

#[tokio::test]
async fn failed_follow_up_keeps_analysis_and_history() {
    let server = MockServer::start().await;
    mount_generate(&server, MODEL, "YES").await;
    mount_stream_once(&server, MODEL, &[final_chunk(ANALYSIS)]).await;
    mount_stream_once(&server, MODEL, &[text_chunk("중간에 끊긴")]).await;

    let mut app = app_for(&server);
    app.set_image(png());
    app.start_analysis().await.unwrap();
    app.finish_turn().await;

    app.send_follow_up("질문").unwrap();
    assert!(matches!(
        app.finish_turn().await,
        Some(TurnOutcome::ReplyFailed(_))
    ));
    assert_eq!(app.follow_ups()[1].text, FOLLOW_UP_ERROR_TEXT);
    assert!(app.analysis().unwrap().is_recognized());
    assert_eq!(app.transport().unwrap().history_len(), 2);
}

#[tokio::test]
async fn reset_forgets_chat_history() {
    let server = MockServer::start().await;
    mount_generate(&server, MODEL, "YES").await;
    mount_stream_once(&server, MODEL, &[final_chunk(ANALYSIS)]).await;

    let mut app = app_for(&server);
    app.set_image(png());
    app.start_analysis().await.unwrap();
    app.finish_turn().await;
    assert_eq!(app.transport().unwrap().history_len(), 2);

    app.reset();
    assert_eq!(app.transport().unwrap().history_len(), 0);
    assert!(app.turns().is_empty());
    assert!(app.reminders().is_empty());
    assert_eq!(app.view(), View::PreAnalysis);
    assert_eq!(
        request_bodies(&server, &generate_path(MODEL)).await.len(),
        1
    );
}
