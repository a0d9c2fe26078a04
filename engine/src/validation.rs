//! Health-document gate run before every analysis.

use bodycode_types::{InlineImage, Part};

use crate::prompts::VALIDATION_PROMPT;
use crate::transport::{Purpose, Transport};

/// Only an exact `YES` (after trimming, any case) accepts the image.
#[must_use]
pub fn interpret_verdict(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case("YES")
}

/// Ask the model whether `image` is a health data document.
///
/// Fails closed: no transport, a transport error or any other reply is `false`.
pub async fn validate<T: Transport>(transport: Option<&T>, image: &InlineImage) -> bool {
    let Some(transport) = transport else {
        tracing::warn!("Skipping document validation: no transport configured");
        return false;
    };
    let parts = vec![
        Part::text(VALIDATION_PROMPT),
        Part::InlineData(image.clone()),
    ];
    match transport.generate(Purpose::Validation, parts).await {
        Ok(reply) => {
            let accepted = interpret_verdict(&reply);
            if !accepted {
                tracing::info!(
                    reply = %reply.trim(),
                    mime_type = %image.mime_type,
                    "Image rejected as health document"
                );
            }
            accepted
        }
        Err(e) => {
            tracing::warn!("Document validation failed: {e}");
            false
        }
    }
}
