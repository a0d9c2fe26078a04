//! Supplement compatibility scoring.

use serde::Deserialize;
use serde_json::Value;

use bodycode_types::{CompatibilityResult, InlineImage, Part};

use crate::errors::AnalysisError;
use crate::prompts::compatibility_prompt;
use crate::transport::{Purpose, Transport};

#[derive(Debug, Deserialize)]
struct RawCompatibility {
    score: Value,
    explanation: String,
}

/// Remove a surrounding markdown code fence, tagged `json` or not.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse the model's JSON reply.
pub fn parse_compatibility(raw: &str) -> Result<CompatibilityResult, AnalysisError> {
    let body = strip_code_fence(raw);
    let parsed: RawCompatibility =
        serde_json::from_str(body).map_err(|e| AnalysisError::Parse(e.to_string()))?;
    let score = match &parsed.score {
        Value::Number(n) => n.as_f64(),
        // Tolerate "85" but not "85점".
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AnalysisError::Parse(format!("score is not a number: {}", parsed.score)))?;
    CompatibilityResult::new(score, parsed.explanation.trim())
        .map_err(|e| AnalysisError::Parse(e.to_string()))
}

/// Score `image` against the supplements the user already takes.
pub async fn check<T: Transport>(
    transport: &T,
    image: InlineImage,
    current_supplements: &str,
) -> Result<CompatibilityResult, AnalysisError> {
    let parts = vec![
        Part::text(compatibility_prompt(current_supplements)),
        Part::InlineData(image),
    ];
    let reply = transport
        .generate(Purpose::Compatibility, parts)
        .await
        .map_err(|e| {
            tracing::warn!("Compatibility request failed: {e}");
            AnalysisError::transport(&e.to_string())
        })?;
    parse_compatibility(&reply).inspect_err(|e| {
        tracing::warn!("Unusable compatibility reply: {e}");
    })
}
