//! Analysis error taxonomy and transport error cleanup.
//!
//! Every failure the user can hit maps to one [`AnalysisError`] variant with a
//! fixed Korean message. Raw transport text is kept for logs only after keys and
//! terminal controls are scrubbed.

use serde_json::Value;

use bodycode_types::{sanitize_terminal_text, truncate_with_ellipsis};

/// Placeholder replacement when a follow-up question fails.
pub const FOLLOW_UP_ERROR_TEXT: &str = "죄송합니다, 답변을 생성하는 중 오류가 발생했습니다.";

/// Notice shown under every analysis.
pub const MEDICAL_DISCLAIMER: &str =
    "이 분석은 정보 제공 목적으로, 의학적 진단을 대체할 수 없습니다. 정확한 진단은 전문가와 상의하세요.";

const MAX_DETAIL_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// No API key, or the transport could not be created.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no health data image selected")]
    NoImage,
    #[error("no supplement image selected")]
    NoSupplementImage,
    #[error("no chat session available")]
    NoSession,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("image is not a health data document")]
    ValidationRejected,
    #[error("could not parse compatibility reply: {0}")]
    Parse(String),
}

impl AnalysisError {
    /// Builds a [`AnalysisError::Transport`] from raw provider text.
    #[must_use]
    pub fn transport(raw: &str) -> Self {
        Self::Transport(describe_transport_error(raw))
    }

    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => {
                "API 키가 설정되지 않아 분석 기능을 사용할 수 없습니다. GEMINI_API_KEY 환경 변수나 설정 파일을 확인해주세요."
            }
            Self::NoImage => "분석할 건강 데이터 이미지를 먼저 업로드해주세요.",
            Self::NoSupplementImage => "궁합을 확인할 영양제 이미지를 업로드해주세요.",
            Self::NoSession => "AI 세션이 준비되지 않았습니다. API 키 설정을 확인해주세요.",
            Self::Transport(_) | Self::EmptyResponse => {
                "분석 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요."
            }
            Self::ValidationRejected => {
                "건강 데이터 문서(인바디 결과지, 건강검진 결과표 등) 이미지가 아닌 것 같습니다. 다른 이미지를 업로드해주세요."
            }
            Self::Parse(_) => {
                "성분 궁합 분석에 실패했습니다. 이미지나 입력값을 확인하고 다시 시도해주세요."
            }
        }
    }

    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Transport(detail) if is_auth_error(detail))
    }
}

#[must_use]
pub fn split_api_error(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("API error ")?;
    let (status, body) = rest.split_once(": ")?;
    Some((status.trim().to_string(), body.trim().to_string()))
}

/// Pulls `error.message` out of a Gemini JSON error body.
pub fn extract_error_message(raw: &str) -> Option<String> {
    let body = split_api_error(raw).map_or_else(|| raw.trim().to_string(), |(_, body)| body);
    let payload: Value = serde_json::from_str(&body).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| {
            // Some proxies wrap the body in a single-element array.
            payload.pointer("/0/error/message").and_then(Value::as_str)
        })
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .map(ToString::to_string)
}

#[must_use]
pub fn is_auth_error(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    let mentions_key = lower.contains("api key") || lower.contains("api_key");
    let auth_words = lower.contains("invalid")
        || lower.contains("not valid")
        || lower.contains("missing")
        || lower.contains("expired");

    lower.contains("api_key_invalid")
        || lower.contains("permission_denied")
        || (mentions_key && auth_words)
        || lower.contains("401")
        || lower.contains("403")
}

/// Short single-line description of a transport failure, safe to log or display.
#[must_use]
pub fn describe_transport_error(raw: &str) -> String {
    let trimmed = raw.trim();
    let message = match split_api_error(trimmed) {
        Some((status, body)) => {
            let detail = extract_error_message(&body).unwrap_or(body);
            format!("HTTP {status}: {detail}")
        }
        None => extract_error_message(trimmed).unwrap_or_else(|| trimmed.to_string()),
    };
    let redacted = redact_api_keys(&message);
    let clean = sanitize_terminal_text(&redacted);
    let single_line = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_with_ellipsis(&single_line, MAX_DETAIL_CHARS)
}

/// `AIza...` → `AIza***`.
#[must_use]
pub fn redact_api_keys(raw: &str) -> String {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("AIza") {
        output.push_str(&rest[..start]);
        output.push_str("AIza***");
        let key = &rest[start + 4..];
        let end = key.find(is_key_delimiter).unwrap_or(key.len());
        rest = &key[end..];
    }
    output.push_str(rest);
    output
}

fn is_key_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '"' | '\'' | ',' | '}' | ']' | ')' | '\\' | '&')
}
