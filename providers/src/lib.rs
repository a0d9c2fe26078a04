//! Gemini client with streaming support.
//!
//! # Architecture
//!
//! - [`gemini::GeminiClient`] - API handle: credentials, endpoint, HTTP client, retry policy
//! - [`gemini::ChatSession`] - stateful chat with a fixed system instruction; history
//!   grows only when a turn completes successfully
//! - [`gemini::GeminiClient::generate_content`] - one-shot, non-streamed request used for
//!   image classification and JSON answers
//!
//! Streaming calls emit events through a [`tokio::sync::mpsc::Sender<StreamEvent>`]
//! channel so the caller can render text as it arrives.
//!
//! # Streaming Events
//!
//! | Event | Description |
//! |-------|-------------|
//! | `TextDelta` | Incremental text content from the model |
//! | `Usage` | Token consumption metrics |
//! | `Done` | Stream completed successfully |
//! | `Error` | Stream terminated with an error |
//!
//! # Error Handling
//!
//! API and protocol errors during streaming are delivered as `StreamEvent::Error`
//! rather than `Result::Err`, so text received before the failure is kept. Low-level
//! failures while reading the response body may still return `Err`.

pub mod gemini;
pub mod retry;
pub mod sse_types;

pub(crate) use anyhow::Result;
pub(crate) use bodycode_types::{ApiKey, ApiUsage, StreamEvent};
use std::sync::OnceLock;
use std::time::Duration;
pub(crate) use tokio::sync::mpsc;

pub use bodycode_types;

/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

// reqwest only exposes the keepalive idle time; interval/retries use platform defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

const MAX_SSE_PARSE_ERRORS: usize = 3;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared HTTPS-only client. Redirects are refused so the API key never follows one.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(concat!("bodycode/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

/// Join the `data:` lines of one event; `None` when the event has none.
fn extract_sse_data(event: &str) -> Option<String> {
    let mut lines = event
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .peekable();

    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}

#[derive(Debug)]
pub(crate) enum SseParseAction {
    /// Continue processing, no event to emit
    Continue,
    /// Emit these events and continue
    Emit(Vec<StreamEvent>),
    /// Stream finished normally (finishReason STOP / MAX_TOKENS)
    Done,
    Error(String),
}

pub(crate) trait SseParser {
    fn parse(&mut self, json: &serde_json::Value) -> SseParseAction;
}

pub(crate) async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Drive an SSE response through `parser`, forwarding events to `tx`.
///
/// - idle timeout between chunks
/// - 4 MiB cap on buffered, undelimited bytes
/// - invalid UTF-8 is terminal
/// - three consecutive malformed JSON payloads are terminal
/// - EOF without a completion signal is reported as an error
pub(crate) async fn process_sse_stream<P: SseParser>(
    response: reqwest::Response,
    parser: &mut P,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: Duration,
) -> Result<()> {
    use futures_util::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parse_errors = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            let _ = send_event(tx, StreamEvent::Error("Stream idle timeout".to_string())).await;
            return Ok(());
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            let _ = send_event(
                tx,
                StreamEvent::Error("SSE buffer exceeded maximum size (4 MiB)".to_string()),
            )
            .await;
            return Ok(());
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }

            let Ok(event) = std::str::from_utf8(&event) else {
                let _ = send_event(
                    tx,
                    StreamEvent::Error("Received invalid UTF-8 from SSE stream".to_string()),
                )
                .await;
                return Ok(());
            };

            let Some(data) = extract_sse_data(event) else {
                continue;
            };

            let json = match serde_json::from_str::<serde_json::Value>(&data) {
                Ok(json) => {
                    parse_errors = 0;
                    json
                }
                Err(e) => {
                    parse_errors = parse_errors.saturating_add(1);
                    tracing::warn!(%e, payload_bytes = data.len(), "Invalid SSE JSON payload");
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        let _ = send_event(
                            tx,
                            StreamEvent::Error(format!("Invalid stream payload: {e}")),
                        )
                        .await;
                        return Ok(());
                    }
                    continue;
                }
            };

            match parser.parse(&json) {
                SseParseAction::Continue => {}
                SseParseAction::Emit(events) => {
                    for event in events {
                        let is_terminal =
                            matches!(&event, StreamEvent::Done | StreamEvent::Error(_));
                        if !send_event(tx, event).await || is_terminal {
                            return Ok(());
                        }
                    }
                }
                SseParseAction::Done => {
                    let _ = send_event(tx, StreamEvent::Done).await;
                    return Ok(());
                }
                SseParseAction::Error(msg) => {
                    let _ = send_event(tx, StreamEvent::Error(msg)).await;
                    return Ok(());
                }
            }
        }
    }

    let _ = send_event(
        tx,
        StreamEvent::Error("Connection closed before stream completed".to_string()),
    )
    .await;
    Ok(())
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[derive(Debug)]
pub(crate) enum ApiResponse {
    Success(reqwest::Response),
    StreamTerminated,
}

/// Describe a failed [`retry::RetryOutcome`], or pass the successful response through.
pub(crate) async fn outcome_into_response(
    outcome: retry::RetryOutcome,
) -> std::result::Result<reqwest::Response, String> {
    match outcome {
        retry::RetryOutcome::Success(response) => Ok(response),
        retry::RetryOutcome::HttpError(response) => {
            let status = response.status();
            let body = read_capped_error_body(response).await;
            Err(format!("API error {status}: {body}"))
        }
        retry::RetryOutcome::ConnectionError { attempts, source } => Err(format!(
            "Request failed after {attempts} attempts: {source}"
        )),
        retry::RetryOutcome::NonRetryable(e) => Err(format!("Request failed: {e}")),
    }
}

pub(crate) async fn handle_response(
    outcome: retry::RetryOutcome,
    tx: &mpsc::Sender<StreamEvent>,
) -> ApiResponse {
    match outcome_into_response(outcome).await {
        Ok(response) => ApiResponse::Success(response),
        Err(message) => {
            let _ = send_event(tx, StreamEvent::Error(message)).await;
            ApiResponse::StreamTerminated
        }
    }
}

/// Credentials and endpoint tuning shared by every Gemini call.
///
/// ```rust
/// use bodycode_providers::ApiConfig;
/// use bodycode_types::ApiKey;
/// use std::time::Duration;
///
/// let key = ApiKey::new("test-key").unwrap();
/// let config = ApiConfig::new(key)
///     .with_stream_idle_timeout(Duration::from_secs(30))
///     .with_max_output_tokens(4096);
/// assert_eq!(config.max_output_tokens(), 4096);
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    api_key: ApiKey,
    base_url: String,
    stream_idle_timeout: Duration,
    request_timeout: Duration,
    max_output_tokens: u32,
}

impl ApiConfig {
    #[must_use]
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: GEMINI_API_BASE_URL.to_string(),
            stream_idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.stream_idle_timeout = timeout;
        }
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.request_timeout = timeout;
        }
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        if tokens > 0 {
            self.max_output_tokens = tokens;
        }
        self
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn stream_idle_timeout(&self) -> Duration {
        self.stream_idle_timeout
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub const fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiConfig, ApiKey, drain_next_sse_event, extract_sse_data, find_sse_event_boundary};
    use std::time::Duration;

    #[test]
    fn api_config_normalizes_base_url_and_ignores_zero_values() {
        let config = ApiConfig::new(ApiKey::new("k").unwrap())
            .with_base_url("http://127.0.0.1:9999/v1beta/")
            .with_stream_idle_timeout(Duration::ZERO)
            .with_max_output_tokens(0);
        assert_eq!(config.base_url(), "http://127.0.0.1:9999/v1beta");
        assert_eq!(config.stream_idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_output_tokens(), 8192);
    }

    #[test]
    fn api_config_debug_hides_key() {
        let config = ApiConfig::new(ApiKey::new("AIzaSecret").unwrap());
        assert!(!format!("{config:?}").contains("AIzaSecret"));
    }

    mod sse_boundary {
        use super::find_sse_event_boundary;

        #[test]
        fn finds_lf_boundary() {
            assert_eq!(find_sse_event_boundary(b"data: a\n\ndata: b"), Some((7, 2)));
        }

        #[test]
        fn finds_crlf_boundary() {
            assert_eq!(find_sse_event_boundary(b"data: a\r\n\r\ndata: b"), Some((7, 4)));
        }

        #[test]
        fn earliest_boundary_wins() {
            assert_eq!(find_sse_event_boundary(b"data: a\n\ndata: b\r\n\r\n"), Some((7, 2)));
            assert_eq!(find_sse_event_boundary(b"data: a\r\n\r\ndata: b\n\n"), Some((7, 4)));
        }

        #[test]
        fn no_boundary_in_partial_event() {
            assert_eq!(find_sse_event_boundary(b"data: {\"candidates\"\n"), None);
            assert_eq!(find_sse_event_boundary(b""), None);
        }
    }

    mod sse_drain {
        use super::drain_next_sse_event;

        #[test]
        fn drains_events_in_order() {
            let mut buffer = b"data: 1\n\ndata: 2\r\n\r\ndata: 3".to_vec();
            assert_eq!(drain_next_sse_event(&mut buffer), Some(b"data: 1".to_vec()));
            assert_eq!(drain_next_sse_event(&mut buffer), Some(b"data: 2".to_vec()));
            assert_eq!(drain_next_sse_event(&mut buffer), None);
            assert_eq!(buffer, b"data: 3");
        }

        #[test]
        fn leading_blank_line_is_an_empty_event() {
            let mut buffer = b"\n\ndata: after\n\n".to_vec();
            assert_eq!(drain_next_sse_event(&mut buffer), Some(Vec::new()));
            assert_eq!(buffer, b"data: after\n\n");
        }
    }

    mod sse_extract {
        use super::extract_sse_data;

        #[test]
        fn single_line_with_and_without_space() {
            assert_eq!(extract_sse_data("data: hello"), Some("hello".to_string()));
            assert_eq!(extract_sse_data("data:hello"), Some("hello".to_string()));
        }

        #[test]
        fn multiline_data_is_joined() {
            assert_eq!(
                extract_sse_data("data: line1\r\ndata: line2\ndata: line3\r"),
                Some("line1\nline2\nline3".to_string())
            );
        }

        #[test]
        fn other_fields_are_ignored() {
            assert_eq!(
                extract_sse_data("event: message\nid: 1\ndata: {\"a\": 1}\nretry: 1000"),
                Some("{\"a\": 1}".to_string())
            );
            assert_eq!(extract_sse_data("event: ping"), None);
        }

        #[test]
        fn empty_data_is_present() {
            assert_eq!(extract_sse_data("data: "), Some(String::new()));
        }
    }
}
