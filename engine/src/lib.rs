//! Core engine for BodyCode: analysis state machine and orchestration.
//!
//! This crate holds the [`App`] state without terminal dependencies. The model
//! service sits behind [`Transport`]; streamed replies run in a spawned task and
//! reach the engine only through a channel, so the engine itself never blocks.

use std::sync::Arc;

use futures_util::future::{AbortHandle, Abortable};
use tokio::sync::mpsc;

pub use bodycode_providers::{self, ApiConfig};
pub use bodycode_types::{
    AnalysisCategory, AnalysisDocument, ApiKey, ApiUsage, CompatibilityGrade,
    CompatibilityResult, InlineImage, ModelName, Part, Role, Section, StreamEvent, Turn,
    sanitize_terminal_text,
};

pub mod config;
pub use config::{BodycodeConfig, ConfigError, ModelSettings};

mod compatibility;
pub use compatibility::{parse_compatibility, strip_code_fence};

mod conversation;
pub use conversation::{Conversation, StaleTicket, TurnTicket};

mod errors;
pub use errors::{AnalysisError, FOLLOW_UP_ERROR_TEXT, MEDICAL_DISCLAIMER, describe_transport_error};

mod image;
pub use image::{ImageError, encode_image, load_image, mime_type_for};

pub mod prompts;
pub use prompts::{AdditionalInfo, BowelRegularity, SleepQuality, StressLevel};

mod reminders;
pub use reminders::{DoseTime, ReminderPlan};

mod stream;
pub use stream::{StreamState, append_fragment};
use stream::{ActiveStream, DISCONNECTED_ERROR, STREAM_EVENT_CHANNEL_CAPACITY};

mod transport;
pub use transport::{GeminiTransport, Purpose, Transport};

mod validation;
pub use validation::{interpret_verdict, validate};


/// Upper bound on events handled per [`App::process_stream_events`] call.
const STREAM_EVENT_BUDGET: usize = 512;

/// Which screen the conversation belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Image upload and lifestyle form.
    PreAnalysis,
    /// Analysis sections plus follow-up chat.
    Chatting,
}

/// How a streamed turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    AnalysisCompleted,
    /// The log was rolled back and the error is shown on the upload screen.
    AnalysisFailed(AnalysisError),
    ReplyCompleted,
    /// The placeholder now holds [`FOLLOW_UP_ERROR_TEXT`].
    ReplyFailed(AnalysisError),
}

impl TurnOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AnalysisCompleted | Self::ReplyCompleted)
    }
}

/// Observable effect of one stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// Sanitized text appended to the open turn.
    Delta(String),
    Finished(TurnOutcome),
}

/// Analysis session state.
#[derive(Debug)]
pub struct App<T: Transport = GeminiTransport> {
    transport: Result<Arc<T>, AnalysisError>,
    conversation: Conversation,
    view: View,
    stream: Option<ActiveStream>,
    image: Option<InlineImage>,
    additional_info: AdditionalInfo,
    error: Option<AnalysisError>,
    compatibility: Option<CompatibilityResult>,
    reminders: ReminderPlan,
    last_usage: Option<ApiUsage>,
}

impl App<GeminiTransport> {
    /// Create the Gemini session from `config`.
    ///
    /// Without an API key the app still starts. Every analysis operation then
    /// fails with [`AnalysisError::NoSession`] and [`App::disabled_reason`]
    /// holds the [`AnalysisError::Configuration`] cause.
    #[must_use]
    pub fn from_config(config: Option<&BodycodeConfig>) -> Self {
        let default_config = BodycodeConfig::default();
        let config = config.unwrap_or(&default_config);
        let Some(key) = config.resolve_api_key() else {
            tracing::warn!("No Gemini API key configured; analysis is disabled");
            return Self::disabled(AnalysisError::Configuration(
                "no Gemini API key configured".to_string(),
            ));
        };
        let models = config.models();
        tracing::info!(
            chat_model = %models.chat,
            validation_model = %models.validation,
            compatibility_model = %models.compatibility,
            "Gemini session ready"
        );
        let client = bodycode_providers::gemini::GeminiClient::new(config.api_config(key));
        Self::new(GeminiTransport::new(client, models))
    }
}

impl<T: Transport> App<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_session(Ok(Arc::new(transport)))
    }

    /// App without a session. Analysis features fail with
    /// [`AnalysisError::NoSession`]; `reason` is kept for diagnostics.
    #[must_use]
    pub fn disabled(reason: AnalysisError) -> Self {
        Self::with_session(Err(reason))
    }

    fn with_session(transport: Result<Arc<T>, AnalysisError>) -> Self {
        Self {
            transport,
            conversation: Conversation::new(),
            view: View::PreAnalysis,
            stream: None,
            image: None,
            additional_info: AdditionalInfo::default(),
            error: None,
            compatibility: None,
            reminders: ReminderPlan::default(),
            last_usage: None,
        }
    }

    fn session(&self) -> Result<Arc<T>, AnalysisError> {
        self.transport.as_ref().map(Arc::clone).map_err(|reason| {
            tracing::warn!(%reason, "No chat session available");
            AnalysisError::NoSession
        })
    }

    /// Why the session could not be created, if it was not.
    #[must_use]
    pub fn disabled_reason(&self) -> Option<&AnalysisError> {
        self.transport.as_ref().err()
    }

    #[must_use]
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_deref().ok()
    }

    // ---- upload side ----

    /// Select the health data image. Clears any previous error.
    pub fn set_image(&mut self, image: InlineImage) {
        self.image = Some(image);
        self.error = None;
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    #[must_use]
    pub fn image(&self) -> Option<&InlineImage> {
        self.image.as_ref()
    }

    pub fn set_additional_info(&mut self, info: AdditionalInfo) {
        self.additional_info = info;
    }

    #[must_use]
    pub fn additional_info(&self) -> &AdditionalInfo {
        &self.additional_info
    }

    // ---- observable state ----

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        self.conversation.turns()
    }

    /// Turns after the initial analysis exchange.
    #[must_use]
    pub fn follow_ups(&self) -> &[Turn] {
        self.conversation.follow_ups()
    }

    /// A streamed turn is in flight; input should be disabled.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.stream.is_some()
    }

    #[must_use]
    pub fn is_chatting(&self) -> bool {
        self.view == View::Chatting
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    #[must_use]
    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn stream_state(&self) -> Option<&StreamState> {
        self.stream.as_ref().map(ActiveStream::state)
    }

    /// Token usage reported by the last finished turn.
    #[must_use]
    pub fn last_usage(&self) -> Option<ApiUsage> {
        self.last_usage
    }

    /// Sections of the initial analysis, re-parsed from its current text.
    ///
    /// Available while the analysis is still streaming.
    #[must_use]
    pub fn analysis(&self) -> Option<AnalysisDocument> {
        let turn = self.conversation.turns().get(1)?;
        turn.is_assistant()
            .then(|| AnalysisDocument::parse(&turn.text))
    }

    #[must_use]
    pub fn supplements(&self) -> Vec<String> {
        self.analysis()
            .map(|document| document.supplements())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn compatibility(&self) -> Option<&CompatibilityResult> {
        self.compatibility.as_ref()
    }

    #[must_use]
    pub fn reminders(&self) -> &ReminderPlan {
        &self.reminders
    }

    pub fn reminders_mut(&mut self) -> &mut ReminderPlan {
        &mut self.reminders
    }

    // ---- operations ----

    /// Validate the selected image and start streaming its analysis.
    ///
    /// No-op while a turn is streaming. A rejected image is cleared.
    pub async fn start_analysis(&mut self) -> Result<(), AnalysisError> {
        if self.is_loading() {
            tracing::debug!("Ignoring analysis request while a turn is streaming");
            return Ok(());
        }
        let result = self.try_start_analysis().await;
        if let Err(e) = &result {
            self.error = Some(e.clone());
        }
        result
    }

    async fn try_start_analysis(&mut self) -> Result<(), AnalysisError> {
        let image = self.image.clone().ok_or(AnalysisError::NoImage)?;
        let transport = self.session()?;
        self.error = None;

        if !validation::validate(Some(&*transport), &image).await {
            self.image = None;
            self.conversation.reset();
            transport.clear_history();
            self.reminders.clear();
            self.view = View::PreAnalysis;
            return Err(AnalysisError::ValidationRejected);
        }

        transport.clear_history();
        self.reminders.clear();
        let ticket = self.conversation.start_over(prompts::INITIAL_USER_TEXT);
        self.view = View::Chatting;

        let parts = vec![
            Part::text(prompts::analysis_request(&self.additional_info)),
            Part::InlineData(image),
        ];
        tracing::info!("Starting health data analysis");
        self.spawn_stream(transport, ticket, parts);
        Ok(())
    }

    /// Ask a follow-up question in the current analysis chat.
    ///
    /// No-op for blank text, while a turn is streaming, or before an analysis.
    pub fn send_follow_up(&mut self, text: &str) -> Result<(), AnalysisError> {
        let text = text.trim();
        if text.is_empty() || self.is_loading() {
            return Ok(());
        }
        let transport = self.session()?;
        if !self.is_chatting() {
            tracing::debug!("Ignoring follow-up before an analysis exists");
            return Ok(());
        }
        let Some(ticket) = self.conversation.begin_turn(text) else {
            return Ok(());
        };
        self.spawn_stream(transport, ticket, vec![Part::text(text)]);
        Ok(())
    }

    fn spawn_stream(&mut self, transport: Arc<T>, ticket: TurnTicket, parts: Vec<Part>) {
        let (tx, rx) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        self.stream = Some(ActiveStream::new(ticket, rx, abort_handle));

        let task = async move {
            if let Err(e) = transport.stream_turn(parts, tx.clone()).await {
                tracing::warn!("Streaming request failed: {e}");
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
        };

        tokio::spawn(async move {
            let _ = Abortable::new(task, abort_registration).await;
        });
    }

    /// Apply queued stream events without waiting.
    ///
    /// Returns the outcome if the turn ended during this call.
    pub fn process_stream_events(&mut self) -> Option<TurnOutcome> {
        for _ in 0..STREAM_EVENT_BUDGET {
            let event = self.stream.as_mut()?.try_next()?;
            if let Some(StreamUpdate::Finished(outcome)) = self.handle_event(event) {
                return Some(outcome);
            }
        }
        None
    }

    /// Wait for the next visible change of the open turn.
    ///
    /// `None` when no turn is streaming.
    pub async fn next_stream_update(&mut self) -> Option<StreamUpdate> {
        loop {
            let event = self.stream.as_mut()?.next().await;
            if let Some(update) = self.handle_event(event) {
                return Some(update);
            }
        }
    }

    /// Drive the open turn to its end.
    pub async fn finish_turn(&mut self) -> Option<TurnOutcome> {
        while let Some(update) = self.next_stream_update().await {
            if let StreamUpdate::Finished(outcome) = update {
                return Some(outcome);
            }
        }
        None
    }

    // The raw buffer is sanitized as a whole so an escape sequence split
    // across fragments is still stripped.
    fn handle_event(&mut self, event: StreamEvent) -> Option<StreamUpdate> {
        let stream = self.stream.as_mut()?;
        let is_text = matches!(event, StreamEvent::TextDelta(_));
        let shown_before = sanitize_terminal_text(stream.state().partial()).len();
        stream.apply(event);

        if stream.state().is_terminal() {
            let finished = self.stream.take()?;
            return Some(StreamUpdate::Finished(self.finish_stream(finished)));
        }
        if !is_text {
            return None;
        }

        let ticket = stream.ticket();
        let shown = sanitize_terminal_text(stream.state().partial()).into_owned();
        let delta = shown.get(shown_before..).unwrap_or_default().to_owned();
        if self.conversation.update(ticket, shown).is_err() {
            tracing::debug!("Dropping fragment for a superseded turn");
            return None;
        }
        (!delta.is_empty()).then_some(StreamUpdate::Delta(delta))
    }

    fn finish_stream(&mut self, stream: ActiveStream) -> TurnOutcome {
        let ticket = stream.ticket();
        self.last_usage = Some(stream.usage());
        let failure = match stream.into_state() {
            StreamState::Completed { text, .. }
                if !sanitize_terminal_text(&text).trim().is_empty() =>
            {
                None
            }
            StreamState::Completed { .. } => Some(AnalysisError::EmptyResponse),
            StreamState::Failed { error, .. } => Some(AnalysisError::transport(&error)),
            StreamState::AwaitingStream(_) | StreamState::Streaming { .. } => {
                Some(AnalysisError::transport(DISCONNECTED_ERROR))
            }
        };

        match (ticket.is_initial_analysis(), failure) {
            (true, None) => {
                if self.conversation.complete(ticket).is_err() {
                    tracing::debug!("Analysis finished for a superseded turn");
                }
                let supplements = self.supplements();
                tracing::info!(supplements = supplements.len(), "Analysis completed");
                self.reminders = ReminderPlan::from_supplements(supplements);
                TurnOutcome::AnalysisCompleted
            }
            (false, None) => {
                if self.conversation.complete(ticket).is_err() {
                    tracing::debug!("Reply finished for a superseded turn");
                }
                TurnOutcome::ReplyCompleted
            }
            (true, Some(error)) => {
                tracing::warn!("Analysis failed: {error}");
                if self.conversation.rollback(ticket).is_err() {
                    tracing::debug!("Analysis failed for a superseded turn");
                }
                self.view = View::PreAnalysis;
                self.error = Some(error.clone());
                TurnOutcome::AnalysisFailed(error)
            }
            (false, Some(error)) => {
                tracing::warn!("Follow-up failed: {error}");
                if self
                    .conversation
                    .fail_with_message(ticket, FOLLOW_UP_ERROR_TEXT)
                    .is_err()
                {
                    tracing::debug!("Follow-up failed for a superseded turn");
                }
                TurnOutcome::ReplyFailed(error)
            }
        }
    }

    /// Start over: abort any stream and forget the conversation.
    pub fn reset(&mut self) {
        if let Some(stream) = self.stream.take() {
            tracing::info!("Aborting in-flight stream on reset");
            stream.abort();
        }
        self.conversation.reset();
        if let Ok(transport) = &self.transport {
            transport.clear_history();
        }
        self.image = None;
        self.additional_info = AdditionalInfo::default();
        self.error = None;
        self.compatibility = None;
        self.reminders.clear();
        self.last_usage = None;
        self.view = View::PreAnalysis;
    }

    /// Score a supplement image against `current_supplements`.
    ///
    /// The previous result is cleared first.
    pub async fn check_compatibility(
        &mut self,
        image: Option<InlineImage>,
        current_supplements: &str,
    ) -> Result<CompatibilityResult, AnalysisError> {
        self.compatibility = None;
        let image = image.ok_or(AnalysisError::NoSupplementImage)?;
        let transport = self.session()?;
        let result = compatibility::check(&*transport, image, current_supplements).await?;
        tracing::info!(score = result.score(), "Compatibility checked");
        self.compatibility = Some(result.clone());
        Ok(result)
    }
}
