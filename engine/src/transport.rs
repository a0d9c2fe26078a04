//! Boundary between the application state machine and the model service.

use std::future::Future;

use tokio::sync::mpsc;

use bodycode_providers::gemini::{ChatSession, GeminiClient, GenerateRequest};
use bodycode_types::{ModelName, Part, StreamEvent};

use crate::config::ModelSettings;
use crate::prompts::system_instruction;

/// What a one-shot request is for. Each purpose may use its own model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// YES/NO health document check.
    Validation,
    /// Supplement score as JSON.
    Compatibility,
}

/// Model access used by [`crate::App`].
///
/// `stream_turn` talks to the stateful analysis chat; `generate` is stateless.
pub trait Transport: Send + Sync + 'static {
    /// Stream the reply to `parts` into `tx`, ending with `Done` or `Error`.
    ///
    /// An `Err` return means the request failed before any terminal event was
    /// sent; the caller reports it as a stream error.
    fn stream_turn(
        &self,
        parts: Vec<Part>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Single request, whole reply as text.
    fn generate(
        &self,
        purpose: Purpose,
        parts: Vec<Part>,
    ) -> impl Future<Output = anyhow::Result<String>> + Send;

    /// Forget the chat history so the next turn starts a new conversation.
    fn clear_history(&self);
}

/// [`Transport`] backed by the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    client: GeminiClient,
    chat: ChatSession,
    validation_model: ModelName,
    compatibility_model: ModelName,
}

impl GeminiTransport {
    #[must_use]
    pub fn new(client: GeminiClient, models: ModelSettings) -> Self {
        let chat = client.start_chat(models.chat, system_instruction());
        Self {
            client,
            chat,
            validation_model: models.validation,
            compatibility_model: models.compatibility,
        }
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.chat.history_len()
    }
}

impl Transport for GeminiTransport {
    async fn stream_turn(
        &self,
        parts: Vec<Part>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> anyhow::Result<()> {
        self.chat.send_message_stream(parts, tx).await
    }

    async fn generate(&self, purpose: Purpose, parts: Vec<Part>) -> anyhow::Result<String> {
        let (model, response_mime_type) = match purpose {
            Purpose::Validation => (&self.validation_model, None),
            Purpose::Compatibility => (&self.compatibility_model, Some("application/json")),
        };
        tracing::debug!(?purpose, %model, "Sending one-shot request");
        self.client
            .generate_content(GenerateRequest {
                model,
                parts: &parts,
                response_mime_type,
            })
            .await
    }

    fn clear_history(&self) {
        self.chat.clear_history();
    }
}
