//! Shared types, error model, and configuration for the questioner workspace.
//!
//! This crate is the foundation depended on by all other questioner crates.
//! It provides:
//! - [`QuestionerError`] and [`EngineFailure`], the unified error types
//! - Domain types ([`Question`], [`Candidate`], [`Solution`], [`Coordinates`])
//! - The grading report model ([`TestResults`] and friends)
//! - Configuration ([`AppConfig`], [`ServerConfig`], [`EngineConfig`], config loading)

pub mod config;
pub mod error;
pub mod results;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ENGINE_CMD_ENV, EngineConfig, EngineSection, FeedbackSection, ServerConfig,
    ServerSection, StumperSection, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from,
};
pub use error::{EngineFailure, QuestionerError, Result};
pub use results::{Step, TestResults};
pub use types::{
    Candidate, Coordinates, Hashes, Language, PIPELINE_VERSION, PublishedMetadata, Question,
    Solution, Submission, ValidationRecord, ValidatorOptions, content_hash,
};
