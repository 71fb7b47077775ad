//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use questioner_engine::{BridgeEngine, GradingEngine};
use questioner_feedback::OutputOptions;
use questioner_server::{ValidationClient, ValidationResponse};
use questioner_shared::{
    AppConfig, EngineConfig, Question, Step, Submission, TestResults, expand_home, init_config,
    load_config,
};
use questioner_storage::Storage;
use questioner_stumper::{IngestOutcome, Stumper};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Questioner: grading feedback and solution corpus tools.
#[derive(Parser)]
#[command(
    name = "questioner",
    version,
    about = "Render grading feedback, curate student solutions, and drive validation servers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Render a grading report as the message a student would see.
    Feedback {
        /// TestResults JSON produced by the grading engine.
        #[arg(long)]
        results: PathBuf,

        /// The submitted source file.
        #[arg(long)]
        source: PathBuf,

        /// Message shown before the phrase on success.
        #[arg(long)]
        success_message: Option<String>,

        /// Only report these warnings (comma-separated step names).
        #[arg(long, value_delimiter = ',')]
        show_warnings: Option<Vec<String>>,

        /// Report these warnings as errors (comma-separated step names).
        #[arg(long, value_delimiter = ',')]
        treat_as_errors: Option<Vec<String>>,

        /// Warnings shown above a failing-test explanation (comma-separated step names).
        #[arg(long, value_delimiter = ',')]
        show_with_test_results: Option<Vec<String>>,

        /// Print `{error, retry, output}` as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Curated solution corpus.
    Stumper {
        #[command(subcommand)]
        action: StumperAction,
    },

    /// Talk to a running validation server.
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Stumper subcommands.
#[derive(Subcommand)]
pub(crate) enum StumperAction {
    /// Ingest one graded submission.
    Ingest {
        /// Question JSON.
        #[arg(long)]
        question: PathBuf,

        /// Submission JSON (`contents`, `language`, `originalID`).
        #[arg(long)]
        submission: PathBuf,

        /// TestResults JSON from grading the submission.
        #[arg(long)]
        results: PathBuf,

        /// Submission time (RFC 3339). Defaults to now.
        #[arg(long)]
        submitted_at: Option<String>,

        /// Database path (defaults to the configured one).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Validate stored solutions that were never validated.
    Revalidate {
        /// Directory of question JSON files.
        #[arg(long)]
        questions: PathBuf,

        /// Maximum number of solutions to check.
        #[arg(long)]
        limit: Option<usize>,

        /// Database path (defaults to the configured one).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List solutions awaiting validation.
    Pending {
        /// Maximum number of solutions to list.
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Database path (defaults to the configured one).
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Validation server client subcommands.
#[derive(Subcommand)]
pub(crate) enum ServerAction {
    /// Send one question file to the server.
    Validate {
        /// Question file path, as the server should see it.
        path: PathBuf,

        /// Port the server announced.
        #[arg(long)]
        port: u16,
    },
    /// Stop the server.
    Shutdown {
        /// Port the server announced.
        #[arg(long)]
        port: u16,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "questioner=info",
        1 => "questioner=debug",
        _ => "questioner=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Feedback {
            results,
            source,
            success_message,
            show_warnings,
            treat_as_errors,
            show_with_test_results,
            json,
        } => {
            let flags = FeedbackFlags {
                success_message,
                show_warnings,
                treat_as_errors,
                show_with_test_results,
                json,
            };
            cmd_feedback(&results, &source, flags)
        }
        Command::Stumper { action } => match action {
            StumperAction::Ingest {
                question,
                submission,
                results,
                submitted_at,
                db,
            } => {
                cmd_stumper_ingest(
                    &question,
                    &submission,
                    &results,
                    submitted_at.as_deref(),
                    db.as_deref(),
                )
                .await
            }
            StumperAction::Revalidate {
                questions,
                limit,
                db,
            } => cmd_stumper_revalidate(&questions, limit, db.as_deref()).await,
            StumperAction::Pending { limit, db } => cmd_stumper_pending(limit, db.as_deref()).await,
        },
        Command::Server { action } => match action {
            ServerAction::Validate { path, port } => cmd_server_validate(&path, port).await,
            ServerAction::Shutdown { port } => cmd_server_shutdown(port).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).wrap_err_with(|| format!("failed to parse {}", path.display()))
}

fn parse_steps(names: Option<Vec<String>>) -> Result<Option<Vec<Step>>> {
    names
        .map(|names| {
            names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(|name| name.parse::<Step>().map_err(|e| eyre!("{e}")))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()
}

fn database_path(config: &AppConfig, db: Option<&Path>) -> PathBuf {
    db.map(Path::to_path_buf)
        .unwrap_or_else(|| expand_home(&config.stumper.database_path))
}

fn engine(config: &AppConfig) -> Arc<dyn GradingEngine> {
    Arc::new(BridgeEngine::new(EngineConfig::from(config).with_env_override()))
}

/// Every `*.json` file in `dir` that parses as a question.
fn load_questions(dir: &Path) -> Result<Vec<Question>> {
    let entries =
        std::fs::read_dir(dir).wrap_err_with(|| format!("failed to read {}", dir.display()))?;
    let mut questions = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match read_json::<Question>(&path) {
            Ok(question) => questions.push(question),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable question"),
        }
    }
    Ok(questions)
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

struct FeedbackFlags {
    success_message: Option<String>,
    show_warnings: Option<Vec<String>>,
    treat_as_errors: Option<Vec<String>>,
    show_with_test_results: Option<Vec<String>>,
    json: bool,
}

fn cmd_feedback(results: &Path, source: &Path, flags: FeedbackFlags) -> Result<()> {
    let config = load_config()?;
    let results: TestResults = read_json(results)?;
    let contents = std::fs::read_to_string(source)
        .wrap_err_with(|| format!("failed to read {}", source.display()))?;

    let mut options = OutputOptions::from(&config.feedback);
    if let Some(message) = flags.success_message {
        options.success_message = message;
    }
    options.show_warnings = parse_steps(flags.show_warnings)?;
    options.treat_as_errors = parse_steps(flags.treat_as_errors)?;
    options.show_with_test_results = parse_steps(flags.show_with_test_results)?;

    let output = questioner_feedback::terminal_output(&results, &contents, &options);
    info!(error = output.error, retry = output.retry, "rendered feedback");
    if flags.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", output.output);
    }
    Ok(())
}

async fn cmd_stumper_ingest(
    question: &Path,
    submission: &Path,
    results: &Path,
    submitted_at: Option<&str>,
    db: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let question: Question = read_json(question)?;
    let submission: Submission = read_json(submission)?;
    let results: TestResults = read_json(results)?;
    let submitted_at = match submitted_at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .wrap_err_with(|| format!("invalid --submitted-at '{raw}'"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let store = Storage::open(&database_path(&config, db)).await?;
    let stumper = Stumper::new(store, engine(&config));
    let outcome = stumper
        .add_stumper_solution(submitted_at, &submission, &results, &question)
        .await?;

    match outcome {
        IngestOutcome::Skipped(reason) => println!("skipped: {reason}"),
        IngestOutcome::Duplicate => println!("duplicate"),
        IngestOutcome::Stored { valid: true } => println!("stored (valid)"),
        IngestOutcome::Stored { valid: false } => println!("stored (not valid)"),
    }
    Ok(())
}

async fn cmd_stumper_revalidate(
    questions: &Path,
    limit: Option<usize>,
    db: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let questions = load_questions(questions)?;
    if questions.is_empty() {
        return Err(eyre!("no questions found"));
    }
    let limit = limit.unwrap_or(config.stumper.revalidate_limit);

    let store = Storage::open(&database_path(&config, db)).await?;
    let stumper = Stumper::new(store, engine(&config));

    let progress = spinner(&format!("Revalidating up to {limit} solutions"));
    let summary = stumper.revalidate_pending(&questions, limit).await;
    progress.finish_and_clear();
    let summary = summary?;

    println!();
    println!("  Checked:          {}", summary.checked);
    println!("  Valid:            {}", summary.valid);
    println!("  Invalid:          {}", summary.invalid);
    println!("  Missing question: {}", summary.missing_question);
    println!("  Failed:           {}", summary.failed);
    println!();
    Ok(())
}

async fn cmd_stumper_pending(limit: usize, db: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let store = Storage::open_readonly(&database_path(&config, db)).await?;

    let total = store.count_unvalidated().await?;
    let mut pending = store.get_unvalidated(limit);
    while let Some(bound) = pending.next().await? {
        let solution = &bound.solution;
        println!(
            "{}\t{}/{}\t{}\t{}",
            solution.original_id,
            solution.coordinates.author,
            solution.coordinates.path,
            solution.coordinates.language,
            solution.submitted_at.to_rfc3339()
        );
    }
    println!("{total} pending");
    Ok(())
}

async fn cmd_server_validate(path: &Path, port: u16) -> Result<()> {
    match ValidationClient::new().send_request(port, path).await? {
        ValidationResponse::Ok => {
            println!("ok");
            Ok(())
        }
        ValidationResponse::Error(message) => Err(eyre!("{}: {message}", path.display())),
    }
}

async fn cmd_server_shutdown(port: u16) -> Result<()> {
    ValidationClient::new().shutdown(port).await?;
    println!("ok");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
