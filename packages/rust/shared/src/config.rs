//! Application configuration for questioner.
//!
//! User config lives at `~/.questioner/questioner.toml`.
//! CLI arguments override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuestionerError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "questioner.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".questioner";

/// Environment variable that replaces `[engine] command`.
pub const ENGINE_CMD_ENV: &str = "QUESTIONER_ENGINE_CMD";

// ---------------------------------------------------------------------------
// Config structs (matching questioner.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Validation server settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Grading engine bridge settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Solution corpus settings.
    #[serde(default)]
    pub stumper: StumperSection,

    /// Feedback rendering defaults.
    #[serde(default)]
    pub feedback: FeedbackSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Maximum simultaneous engine invocations.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minutes without a connection before the server exits.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,

    /// Seconds between idle checks.
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_idle_timeout_minutes() -> u64 {
    60
}
fn default_watchdog_interval_secs() -> u64 {
    60
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Program that speaks the JSON-lines bridge protocol.
    #[serde(default = "default_engine_command")]
    pub command: String,

    /// Extra arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the bridge process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

fn default_engine_command() -> String {
    "questioner-engine-bridge".into()
}

/// `[stumper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StumperSection {
    /// libSQL database holding curated solutions.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Default batch size for `stumper revalidate`.
    #[serde(default = "default_revalidate_limit")]
    pub revalidate_limit: usize,
}

impl Default for StumperSection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            revalidate_limit: default_revalidate_limit(),
        }
    }
}

fn default_database_path() -> String {
    "~/.questioner/stumper.db".into()
}
fn default_revalidate_limit() -> usize {
    100
}

/// `[feedback]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSection {
    #[serde(default = "default_success_message")]
    pub success_message: String,

    /// Spaces used to indent nested feedback blocks.
    #[serde(default = "default_indentation")]
    pub indentation: usize,
}

impl Default for FeedbackSection {
    fn default() -> Self {
        Self {
            success_message: default_success_message(),
            indentation: default_indentation(),
        }
    }
}

fn default_success_message() -> String {
    "Your code passed all tests and code quality checks.".into()
}
fn default_indentation() -> usize {
    2
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI args)
// ---------------------------------------------------------------------------

/// Runtime server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub concurrency: usize,
    pub idle_timeout: Duration,
    pub watchdog_interval: Duration,
}

impl From<&AppConfig> for ServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.server.concurrency,
            idle_timeout: Duration::from_secs(config.server.idle_timeout_minutes * 60),
            watchdog_interval: Duration::from_secs(config.server.watchdog_interval_secs),
        }
    }
}

/// Runtime engine bridge configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            command: config.engine.command.clone(),
            args: config.engine.args.clone(),
            working_dir: config.engine.working_dir.as_deref().map(expand_home),
        }
    }
}

impl EngineConfig {
    /// Apply `QUESTIONER_ENGINE_CMD` when it is set and non-empty.
    pub fn with_env_override(mut self) -> Self {
        match std::env::var(ENGINE_CMD_ENV) {
            Ok(command) if !command.trim().is_empty() => {
                tracing::debug!(%command, "engine command overridden from environment");
                self.command = command;
            }
            _ => {}
        }
        self
    }
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.questioner/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| QuestionerError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.questioner/questioner.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| QuestionerError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        QuestionerError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    if config.server.concurrency == 0 {
        return Err(QuestionerError::config("server.concurrency must be at least 1"));
    }
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| QuestionerError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| QuestionerError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| QuestionerError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
