//! Input validation for idea submissions.
//!
//! Every submission is checked before an execution is created: the idea text
//! must be within length bounds and must not carry text structured as a
//! directive to the models downstream.

use tracing::warn;

use crate::ForgeError;

/// Minimum idea length, in characters, after trimming.
pub const MIN_IDEA_CHARS: usize = 10;

/// Maximum idea length, in characters, after trimming.
pub const MAX_IDEA_CHARS: usize = 2000;

/// Lower-cased fragments that mark an attempt to steer the stage prompts.
const INJECTION_MARKERS: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous",
    "ignore the above",
    "disregard previous",
    "disregard all prior",
    "forget your instructions",
    "you are now a ",
    "you are now an ",
    "new instructions:",
    "system prompt",
    "reveal your prompt",
    "<|im_start|>",
    "<|endoftext|>",
    "</system>",
    "<system>",
    "[inst]",
    "### instruction",
];

/// Validates raw idea text, returning the trimmed text on success.
///
/// Produces [`ForgeError::InvalidInput`] for length violations and
/// [`ForgeError::InjectionDetected`] for suspicious content.
pub fn validate_idea_text(text: &str) -> Result<&str, ForgeError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars < MIN_IDEA_CHARS {
        return Err(ForgeError::InvalidInput {
            field: "idea_text".into(),
            message: format!("must be at least {MIN_IDEA_CHARS} characters (got {chars})"),
        });
    }
    if chars > MAX_IDEA_CHARS {
        return Err(ForgeError::InvalidInput {
            field: "idea_text".into(),
            message: format!("must be at most {MAX_IDEA_CHARS} characters (got {chars})"),
        });
    }
    check_injection("idea_text", trimmed)?;
    Ok(trimmed)
}

/// Rejects `text` if it contains a known prompt-injection marker.
pub fn check_injection(source: &str, text: &str) -> Result<(), ForgeError> {
    let lowered = text.to_lowercase();
    if let Some(marker) = INJECTION_MARKERS.iter().find(|m| lowered.contains(*m)) {
        warn!(field = source, marker = *marker, "prompt injection marker in submission");
        return Err(ForgeError::InjectionDetected {
            source_document: source.to_string(),
            offending_text: (*marker).to_string(),
        });
    }
    Ok(())
}
