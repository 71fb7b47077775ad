//! One-line failure messages for `error:` responses.

use std::any::Any;

use questioner_shared::{EngineFailure, QuestionerError};

/// Longest message sent after `error:`, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Cause chains deeper than this are cut off.
const MAX_DEPTH: usize = 64;

struct Layer<'a> {
    kind: &'a str,
    message: Option<String>,
    location: Option<&'a str>,
}

impl Layer<'_> {
    fn text(&self) -> &str {
        match self.message.as_deref().map(str::trim) {
            Some(message) if !message.is_empty() => message,
            _ => self.kind.trim(),
        }
    }
}

fn layers(error: &QuestionerError) -> Vec<Layer<'_>> {
    match error {
        QuestionerError::Engine(failure) => {
            std::iter::successors(Some(failure), |failure| failure.cause.as_deref())
                .take(MAX_DEPTH)
                .map(|failure| Layer {
                    kind: failure.kind.as_str(),
                    message: failure.message.clone(),
                    location: failure.location.as_deref(),
                })
                .collect()
        }
        other => vec![Layer {
            kind: other.kind(),
            message: Some(other.to_string()),
            location: None,
        }],
    }
}

/// Build the message for an `error:` response.
///
/// Each cause contributes its message, or its kind when the message is blank,
/// joined outermost first with `" -> "`. Newlines are flattened and the result
/// is cut to [`MAX_MESSAGE_CHARS`]. A chain with nothing usable falls back to
/// `"<kind> at <location>"` of the innermost cause.
pub fn failure_message(error: &QuestionerError) -> String {
    let layers = layers(error);
    let joined = layers
        .iter()
        .map(Layer::text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" -> ");
    let flattened = joined.replace("\r\n", " ").replace(['\n', '\r'], " ");

    let message = if flattened.trim().is_empty() {
        fallback(layers.last())
    } else {
        flattened
    };
    message.chars().take(MAX_MESSAGE_CHARS).collect()
}

fn fallback(innermost: Option<&Layer<'_>>) -> String {
    let kind = innermost
        .map(|layer| layer.kind.trim())
        .filter(|kind| !kind.is_empty())
        .unwrap_or("UnknownError");
    let location = innermost
        .and_then(|layer| layer.location)
        .unwrap_or("unknown location");
    format!("{kind} at {location}")
}

/// Turn a panic payload from an engine call into a failure.
pub fn panic_failure(payload: Box<dyn Any + Send>) -> EngineFailure {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    EngineFailure {
        kind: "Panic".into(),
        message,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_cause_chain_outermost_first() {
        let failure = EngineFailure::new("ValidationFailed", "question add-one failed")
            .caused_by(EngineFailure::new("SolutionFailed", "incorrect"));
        assert_eq!(
            failure_message(&failure.into()),
            "question add-one failed -> incorrect"
        );
    }

    #[test]
    fn blank_messages_fall_back_to_kind() {
        let inner = EngineFailure {
            kind: "NullPointerException".into(),
            message: Some("  ".into()),
            ..Default::default()
        };
        let failure = EngineFailure::new("RuntimeException", "wrapper").caused_by(inner);
        assert_eq!(
            failure_message(&failure.into()),
            "wrapper -> NullPointerException"
        );
    }

    #[test]
    fn newlines_are_flattened() {
        let failure = EngineFailure::new("CompileError", "line one\nline two\r\nline three");
        assert_eq!(
            failure_message(&failure.into()),
            "line one line two line three"
        );
    }

    #[test]
    fn long_messages_are_truncated() {
        let failure = EngineFailure::new("Big", "é".repeat(3000));
        let message = failure_message(&failure.into());
        assert_eq!(message.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn nothing_usable_reports_origin() {
        let failure = EngineFailure {
            kind: String::new(),
            location: Some("Validator.kt:42".into()),
            ..Default::default()
        };
        assert_eq!(
            failure_message(&failure.into()),
            "UnknownError at Validator.kt:42"
        );
    }

    #[test]
    fn non_engine_errors_use_display() {
        let err = QuestionerError::validation("missing file");
        assert_eq!(failure_message(&err), "validation error: missing file");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let failure = panic_failure(Box::new("boom"));
        assert_eq!(failure.kind, "Panic");
        assert_eq!(failure.message.as_deref(), Some("boom"));

        let failure = panic_failure(Box::new(String::from("owned boom")));
        assert_eq!(failure.message.as_deref(), Some("owned boom"));

        let failure = panic_failure(Box::new(7_u8));
        assert_eq!(failure_message(&failure.into()), "Panic");
    }
}
