//! Error types for the questioner workspace.
//!
//! Library crates use [`QuestionerError`] via `thiserror`.
//! App crates (cli/validation-server) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for all questioner operations.
#[derive(Debug, thiserror::Error)]
pub enum QuestionerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A failure reported by the grading engine itself.
    #[error(transparent)]
    Engine(#[from] EngineFailure),

    /// Transport-level failure talking to the grading engine bridge.
    #[error("bridge error: {0}")]
    Bridge(String),

    /// A validation server could not be reached or answered unexpectedly.
    #[error("client error: {0}")]
    Client(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A write was rejected by a unique index. Callers treat this as benign.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON or other structured-data parse error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad request, missing template markers, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// An API was called with arguments that can never be valid.
    #[error("misuse: {message}")]
    Misuse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuestionerError>;

impl QuestionerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a misuse (programmer error) from any displayable message.
    pub fn misuse(msg: impl Into<String>) -> Self {
        Self::Misuse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short name of the error kind, used when a failure has no message.
    pub fn kind(&self) -> &str {
        match self {
            Self::Config { .. } => "ConfigError",
            Self::Engine(failure) => failure.kind.as_str(),
            Self::Bridge(_) => "BridgeError",
            Self::Client(_) => "ClientError",
            Self::Storage(_) => "StorageError",
            Self::Duplicate(_) => "DuplicateRecord",
            Self::Io { .. } => "IoError",
            Self::Parse { .. } => "ParseError",
            Self::Validation { .. } => "ValidationError",
            Self::Misuse { .. } => "MisuseError",
        }
    }

    /// Whether this error is a unique-index rejection.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Whether the engine reported its own state as permanently corrupted.
    pub fn is_poisoned(&self) -> bool {
        matches!(self, Self::Engine(failure) if failure.poisoned)
    }
}

// ---------------------------------------------------------------------------
// EngineFailure
// ---------------------------------------------------------------------------

/// A failure raised inside the grading engine, as reported over the bridge.
///
/// Engine failures form a cause chain like the exceptions they were built
/// from: `cause` points at the failure that triggered this one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFailure {
    /// Exception or failure class name (e.g. `IllegalStateException`).
    pub kind: String,
    /// Human-readable message, possibly empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Origin of the failure as `file:line`, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// The engine cannot recover without a restart.
    #[serde(default)]
    pub poisoned: bool,
    /// The failure that caused this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<EngineFailure>>,
}

impl EngineFailure {
    /// Create a failure with a kind and message and no cause.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Attach a cause.
    pub fn caused_by(mut self, cause: EngineFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl std::fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message.as_deref().unwrap_or(""))
    }
}

impl std::error::Error for EngineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
