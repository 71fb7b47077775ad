//! JSON-lines messages exchanged with an engine bridge process.
//!
//! The bridge announces itself with `{"type":"ready"}`, then answers each
//! `request` with a `result` or `error` carrying the same `id`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use questioner_shared::{EngineFailure, Language, Question, ValidatorOptions};

/// A single engine operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineCall<'a> {
    Warm,
    Validate {
        path: &'a Path,
        options: &'a ValidatorOptions,
    },
    Calibrate {
        path: &'a Path,
        options: &'a ValidatorOptions,
    },
    Template {
        language: Language,
        template: &'a str,
        contents: &'a str,
    },
    StripComments {
        language: Language,
        contents: &'a str,
    },
    StripAssertionMessages {
        language: Language,
        contents: &'a str,
    },
    BadWords {
        language: Language,
        contents: &'a str,
    },
    Format {
        language: Language,
        contents: &'a str,
    },
    Test {
        question: &'a Question,
        language: Language,
        contents: &'a str,
    },
}

impl EngineCall<'_> {
    /// Operation name, for logging.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Validate { .. } => "validate",
            Self::Calibrate { .. } => "calibrate",
            Self::Template { .. } => "template",
            Self::StripComments { .. } => "strip_comments",
            Self::StripAssertionMessages { .. } => "strip_assertion_messages",
            Self::BadWords { .. } => "bad_words",
            Self::Format { .. } => "format",
            Self::Test { .. } => "test",
        }
    }
}

/// Message written to the bridge's stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum RequestMessage<'a> {
    Request { id: String, call: EngineCall<'a> },
    Shutdown,
}

/// Message read from the bridge's stdout.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponseMessage {
    Ready,
    Result {
        id: String,
        #[serde(default)]
        result: serde_json::Value,
    },
    Error {
        id: String,
        error: EngineFailure,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_message_serializes_correctly() {
        let msg = RequestMessage::Request {
            id: "req-1".into(),
            call: EngineCall::Format {
                language: Language::Kotlin,
                contents: "fun main() {}",
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"request""#));
        assert!(json.contains(r#""id":"req-1""#));
        assert!(json.contains(r#""op":"format""#));
        assert!(json.contains(r#""language":"kotlin""#));
    }

    #[test]
    fn unit_call_serializes_with_op_only() {
        let msg = RequestMessage::Request {
            id: "req-7".into(),
            call: EngineCall::Warm,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"request","id":"req-7","call":{"op":"warm"}}"#);
    }

    #[test]
    fn validate_call_carries_options() {
        let options = ValidatorOptions::default();
        let call = EngineCall::Validate {
            path: Path::new("src/main/java/AddOne.java"),
            options: &options,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["op"], "validate");
        assert_eq!(json["path"], "src/main/java/AddOne.java");
        assert_eq!(json["options"]["maxMutationCount"], 256);
        assert_eq!(call.op(), "validate");
    }

    #[test]
    fn shutdown_message_serializes_correctly() {
        let json = serde_json::to_string(&RequestMessage::Shutdown).unwrap();
        assert_eq!(json, r#"{"type":"shutdown"}"#);
    }

    #[test]
    fn response_message_deserializes_ready() {
        let msg: ResponseMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(matches!(msg, ResponseMessage::Ready));
    }

    #[test]
    fn response_message_deserializes_unit_result() {
        let msg: ResponseMessage = serde_json::from_str(r#"{"type":"result","id":"req-1"}"#).unwrap();
        match msg {
            ResponseMessage::Result { id, result } => {
                assert_eq!(id, "req-1");
                assert!(result.is_null());
            }
            _ => panic!("expected Result"),
        }
    }

    #[test]
    fn response_message_deserializes_error() {
        let json = r#"{"type":"error","id":"req-2","error":{"kind":"CachePoisonedException","message":"bad cache","poisoned":true}}"#;
        let msg: ResponseMessage = serde_json::from_str(json).unwrap();
        match msg {
            ResponseMessage::Error { id, error } => {
                assert_eq!(id, "req-2");
                assert_eq!(error.kind, "CachePoisonedException");
                assert!(error.poisoned);
            }
            _ => panic!("expected Error"),
        }
    }
}
