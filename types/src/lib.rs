//! Core domain types for BodyCode.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application: the section parser,
//! the conversation turn model, request parts and the stream event vocabulary shared by
//! the provider and the engine.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod analysis;
mod compatibility;
mod content;
mod message;
mod sanitize;
mod text;

pub use analysis::{AnalysisCategory, AnalysisDocument, Section, extract_supplements};
pub use compatibility::{CompatibilityGrade, CompatibilityResult, ScoreOutOfRange};
pub use content::{InlineImage, Part};
pub use message::{Role, Turn};
pub use sanitize::sanitize_terminal_text;
pub use text::truncate_with_ellipsis;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Model Names
// ============================================================================

/// Model used for the analysis chat and follow-up questions.
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
/// Model used by the document validation gate.
pub const DEFAULT_VALIDATION_MODEL: &str = "gemini-3-flash-preview";
/// Model used for supplement compatibility checks (image + JSON output).
pub const DEFAULT_COMPATIBILITY_MODEL: &str = "gemini-3-pro-image-preview";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelParseError {
    #[error("model name cannot be empty")]
    Empty,
    #[error("Gemini model must start with gemini- (got {0})")]
    GeminiPrefix(String),
    #[error("model name must not contain whitespace or '/' (got {0})")]
    InvalidCharacters(String),
}

/// Validated Gemini model identifier, safe to splice into a request path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelName(String);

impl ModelName {
    pub fn parse(raw: &str) -> Result<Self, ModelParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelParseError::Empty);
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ModelParseError::InvalidCharacters(trimmed.to_string()));
        }
        if !trimmed.to_ascii_lowercase().starts_with("gemini-") {
            return Err(ModelParseError::GeminiPrefix(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn chat_default() -> Self {
        Self(DEFAULT_CHAT_MODEL.to_string())
    }

    #[must_use]
    pub fn validation_default() -> Self {
        Self(DEFAULT_VALIDATION_MODEL.to_string())
    }

    #[must_use]
    pub fn compatibility_default() -> Self {
        Self(DEFAULT_COMPATIBILITY_MODEL.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModelName {
    type Error = ModelParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModelName> for String {
    fn from(value: ModelName) -> Self {
        value.0
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// API Key
// ============================================================================

/// Gemini API key.
///
/// `Debug` is manually implemented to redact the key value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank keys so "configured but empty" behaves like "missing".
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(<redacted>)")
    }
}

// ============================================================================
// Streaming Events
// ============================================================================

/// Token consumption reported by the model service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Events emitted by the transport while a completion streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text content delta.
    TextDelta(String),
    /// Token usage metrics.
    Usage(ApiUsage),
    /// Stream completed.
    Done,
    /// Error occurred; text received so far remains valid.
    Error(String),
}
