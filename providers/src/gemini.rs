//! Google Gemini API client.
//!
//! Streams from `{base}/models/{model}:streamGenerateContent?alt=sse` and answers
//! one-shot requests from `{base}/models/{model}:generateContent`.
//!
//! The request body mixes casing conventions: `system_instruction` is snake_case
//! while `generationConfig`, `inlineData` and `responseMimeType` are camelCase.

use crate::{
    ApiConfig, ApiResponse, ApiUsage, Result, SseParseAction, SseParser, StreamEvent,
    handle_response, http_client, mpsc, outcome_into_response, process_sse_stream,
    retry::{RetryConfig, send_with_retry},
    sse_types as typed,
};
use bodycode_types::{ModelName, Part, Role};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};

/// Handle to the Gemini API.
///
/// Cloning is cheap: the HTTP client is reference counted.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: ApiConfig,
    retry: RetryConfig,
}

/// One-shot request parameters.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub model: &'a ModelName,
    pub parts: &'a [Part],
    /// e.g. `application/json` to ask for a bare JSON answer.
    pub response_mime_type: Option<&'a str>,
}

impl GeminiClient {
    /// Client on the shared hardened (HTTPS-only) connection pool.
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self::with_http_client(config, http_client().clone())
    }

    /// Client on a caller-supplied `reqwest::Client`, e.g. one that can reach a local
    /// mock server over plain HTTP.
    #[must_use]
    pub fn with_http_client(config: ApiConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            config,
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Open a chat session. No network traffic happens until the first message.
    #[must_use]
    pub fn start_chat(&self, model: ModelName, system_instruction: impl Into<String>) -> ChatSession {
        ChatSession {
            client: self.clone(),
            model,
            system_instruction: system_instruction.into(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn endpoint(&self, model: &ModelName, method: &str) -> String {
        format!("{}/models/{}:{method}", self.config.base_url(), model.as_str())
    }

    /// Send a single non-streamed request and return the first candidate's text.
    pub async fn generate_content(&self, request: GenerateRequest<'_>) -> Result<String> {
        let url = self.endpoint(request.model, "generateContent");
        let contents = vec![user_content(request.parts)];
        let body = build_request_body(
            &contents,
            None,
            self.config.max_output_tokens(),
            request.response_mime_type,
        );
        let api_key = self.config.api_key();

        let outcome = send_with_retry(
            || {
                self.http
                    .post(&url)
                    .header("x-goog-api-key", api_key)
                    .json(&body)
            },
            Some(self.config.request_timeout()),
            &self.retry,
        )
        .await;

        let response = outcome_into_response(outcome)
            .await
            .map_err(anyhow::Error::msg)?;
        let payload: typed::Response = response.json().await?;

        if let Some(error) = &payload.error {
            anyhow::bail!("API error: {}", error.message_or_default());
        }
        if let Some(reason) = blocked_reason(&payload) {
            anyhow::bail!("Prompt blocked: {reason}");
        }

        let text = payload.first_text();
        if text.is_empty()
            && let Some(message) = payload
                .candidates
                .as_deref()
                .and_then(<[typed::Candidate]>::first)
                .and_then(|candidate| candidate.finish_reason.as_deref())
                .and_then(|reason| typed::FinishReason::parse(reason).error_message())
        {
            anyhow::bail!("{message}");
        }
        Ok(text)
    }
}

/// Stateful Gemini conversation.
///
/// The history lives client-side and is resent with every message. A turn is
/// committed only after its stream finishes successfully with non-blank text, so
/// failed or empty turns never pollute later requests.
#[derive(Debug, Clone)]
pub struct ChatSession {
    client: GeminiClient,
    model: ModelName,
    system_instruction: String,
    history: Arc<Mutex<Vec<Value>>>,
}

impl ChatSession {
    #[must_use]
    pub fn model(&self) -> &ModelName {
        &self.model
    }

    /// Number of committed `contents` entries (two per successful turn).
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forget earlier turns; the system instruction is kept.
    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Stream the reply to `parts` into `tx`.
    ///
    /// Failures are reported as a final `StreamEvent::Error`; the `Err` return is
    /// reserved for transport errors while reading the body.
    pub async fn send_message_stream(
        &self,
        parts: Vec<Part>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let config = &self.client.config;
        let url = format!(
            "{}?alt=sse",
            self.client.endpoint(&self.model, "streamGenerateContent")
        );

        let user = user_content(&parts);
        let mut contents = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        contents.push(user.clone());

        let body = build_request_body(
            &contents,
            Some(&self.system_instruction),
            config.max_output_tokens(),
            None,
        );
        let api_key = config.api_key();

        tracing::debug!(
            model = %self.model,
            history_entries = contents.len() - 1,
            "Opening Gemini stream"
        );

        // Streaming requests have no total timeout; the SSE idle timeout applies instead.
        let outcome = send_with_retry(
            || {
                self.client
                    .http
                    .post(&url)
                    .header("x-goog-api-key", api_key)
                    .json(&body)
            },
            None,
            &self.client.retry,
        )
        .await;

        let response = match handle_response(outcome, &tx).await {
            ApiResponse::Success(response) => response,
            ApiResponse::StreamTerminated => return Ok(()),
        };

        let mut parser = GeminiParser::new(PendingTurn {
            history: Arc::clone(&self.history),
            user,
        });
        process_sse_stream(response, &mut parser, &tx, config.stream_idle_timeout()).await
    }
}

fn user_content(parts: &[Part]) -> Value {
    json!({
        "role": Role::User.as_wire(),
        "parts": parts.iter().map(Part::to_json).collect::<Vec<_>>(),
    })
}

fn model_content(text: &str) -> Value {
    json!({
        "role": Role::Assistant.as_wire(),
        "parts": [{ "text": text }],
    })
}

pub(crate) fn build_request_body(
    contents: &[Value],
    system_instruction: Option<&str>,
    max_output_tokens: u32,
    response_mime_type: Option<&str>,
) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("contents".into(), json!(contents));

    if let Some(instruction) = system_instruction
        && !instruction.trim().is_empty()
    {
        body.insert(
            "system_instruction".into(),
            json!({ "parts": [{ "text": instruction }] }),
        );
    }

    let mut generation = serde_json::Map::new();
    generation.insert("maxOutputTokens".into(), json!(max_output_tokens));
    generation.insert("temperature".into(), json!(1.0));
    if let Some(mime) = response_mime_type {
        generation.insert("responseMimeType".into(), json!(mime));
    }
    body.insert("generationConfig".into(), Value::Object(generation));

    Value::Object(body)
}

fn blocked_reason(response: &typed::Response) -> Option<&str> {
    response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
}

// ========================================================================
// Gemini SSE Parser
// ========================================================================

/// User content waiting to be committed together with the model's reply.
struct PendingTurn {
    history: Arc<Mutex<Vec<Value>>>,
    user: Value,
}

struct GeminiParser {
    reply: String,
    pending: Option<PendingTurn>,
}

impl GeminiParser {
    fn new(pending: PendingTurn) -> Self {
        Self {
            reply: String::new(),
            pending: Some(pending),
        }
    }

    /// Commit before `Done` is forwarded, so a follow-up sent right after sees it.
    fn commit(&mut self) {
        if self.reply.trim().is_empty() {
            tracing::debug!("Gemini reply was blank; history unchanged");
            return;
        }
        if let Some(pending) = self.pending.take() {
            let mut history = pending
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            history.push(pending.user);
            history.push(model_content(&self.reply));
        }
    }
}

impl SseParser for GeminiParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let response: typed::Response = match serde_json::from_value(json.clone()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%e, "Failed to parse Gemini SSE event");
                return SseParseAction::Continue;
            }
        };

        if let Some(error) = &response.error {
            return SseParseAction::Error(error.message_or_default().to_string());
        }
        if let Some(reason) = blocked_reason(&response) {
            return SseParseAction::Error(format!("Prompt blocked: {reason}"));
        }

        let mut events = Vec::new();
        let mut finish_action: Option<SseParseAction> = None;

        if let Some(usage) = &response.usage_metadata {
            events.push(StreamEvent::Usage(ApiUsage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            }));
        }

        for candidate in response.candidates.into_iter().flatten() {
            // Text before the finish reason: the final chunk often carries both.
            let parts = candidate.content.and_then(|content| content.parts);
            for part in parts.into_iter().flatten() {
                if part.thought {
                    continue;
                }
                if let Some(text) = part.text
                    && !text.is_empty()
                {
                    self.reply.push_str(&text);
                    events.push(StreamEvent::TextDelta(text));
                }
            }

            if let Some(reason) = candidate.finish_reason {
                let reason = typed::FinishReason::parse(&reason);
                if reason.is_success() {
                    finish_action = Some(SseParseAction::Done);
                } else if let Some(msg) = reason.error_message() {
                    finish_action = Some(SseParseAction::Error(msg.to_string()));
                }
            }
        }

        match finish_action {
            Some(SseParseAction::Done) => {
                self.commit();
                events.push(StreamEvent::Done);
                SseParseAction::Emit(events)
            }
            Some(SseParseAction::Error(msg)) => {
                events.push(StreamEvent::Error(msg));
                SseParseAction::Emit(events)
            }
            _ if events.is_empty() => SseParseAction::Continue,
            _ => SseParseAction::Emit(events),
        }
    }
}
