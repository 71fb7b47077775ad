//! Access to the external grading engine.
//!
//! Everything the rest of the workspace needs from the engine goes through the
//! [`GradingEngine`] trait. [`BridgeEngine`] implements it by talking to a pool
//! of engine subprocesses over a JSON-lines protocol; tests substitute fakes.

mod bridge;
pub mod protocol;

use std::collections::BTreeSet;
use std::path::Path;

use questioner_shared::{Language, Question, Result, TestResults, ValidatorOptions};

pub use bridge::BridgeEngine;
pub use protocol::EngineCall;

/// Operations provided by the grading engine.
///
/// Calls are blocking. Async callers that must not stall the runtime run them
/// on the blocking pool.
pub trait GradingEngine: Send + Sync {
    /// Load classes and caches so the first real request is fast.
    fn warm(&self) -> Result<()>;

    /// Verify the test suite of the question file at `path`.
    fn validate(&self, path: &Path, options: &ValidatorOptions) -> Result<()>;

    /// Derive grading thresholds for the question file at `path`.
    fn calibrate(&self, path: &Path, options: &ValidatorOptions) -> Result<()>;

    /// Merge `contents` into `template`. `contents` is already wrapped in
    /// template markers.
    fn template(&self, language: Language, template: &str, contents: &str) -> Result<String>;

    /// Remove all comments.
    fn strip_comments(&self, language: Language, contents: &str) -> Result<String>;

    /// Remove message arguments from assertion statements.
    fn strip_assertion_messages(&self, language: Language, contents: &str) -> Result<String>;

    /// Set of identifier and literal words appearing in `contents`.
    fn bad_words(&self, language: Language, contents: &str) -> Result<BTreeSet<String>>;

    /// Reformat with the language's canonical formatter.
    fn format(&self, language: Language, contents: &str) -> Result<String>;

    /// Run the question's official tests against `contents`.
    fn test(&self, question: &Question, language: Language, contents: &str)
    -> Result<TestResults>;
}
