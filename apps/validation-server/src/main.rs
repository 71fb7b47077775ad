//! Validation/calibration server process.
//!
//! Started once per build by the authoring tooling. Prints `PORT:<n>` on
//! stdout once it is ready; all logging goes to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;

use questioner_engine::BridgeEngine;
use questioner_server::{Mode, ValidationServer};
use questioner_shared::{EngineConfig, ServerConfig, ValidatorOptions, load_config};

/// Run validate or calibrate requests for question files sent over TCP.
#[derive(Parser, Debug)]
#[command(name = "questioner-validation-server", version)]
struct ServerArgs {
    /// `validate` or `calibrate`.
    mode: String,

    /// Port to listen on; 0 picks a free one.
    port: u16,

    /// Project root the question files are relative to.
    root_dir: PathBuf,

    /// Falls back to 256 when absent or not a number.
    max_mutation_count: Option<String>,

    /// Falls back to 4 when absent or not a number.
    retries: Option<String>,

    /// `true` or `false`; anything else means false.
    verbose: Option<String>,

    /// Simultaneous engine calls; defaults to the configured value.
    concurrency: Option<String>,

    /// Minutes without a connection before exiting; defaults to the configured value.
    idle_timeout_minutes: Option<String>,
}

const DEFAULT_MAX_MUTATION_COUNT: u32 = 256;
const DEFAULT_RETRIES: u32 = 4;

impl ServerArgs {
    fn max_mutation_count(&self) -> u32 {
        lenient(self.max_mutation_count.as_deref()).unwrap_or(DEFAULT_MAX_MUTATION_COUNT)
    }

    fn retries(&self) -> u32 {
        lenient(self.retries.as_deref()).unwrap_or(DEFAULT_RETRIES)
    }

    fn verbose(&self) -> bool {
        matches!(self.verbose.as_deref().map(str::trim), Some("true"))
    }

    fn concurrency(&self) -> Option<usize> {
        lenient(self.concurrency.as_deref())
    }

    fn idle_timeout(&self) -> Option<Duration> {
        lenient::<u64>(self.idle_timeout_minutes.as_deref()).map(idle_timeout_from_minutes)
    }
}

/// Parse an optional positional, treating malformed values as absent.
fn lenient<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|value| value.trim().parse().ok())
}

fn idle_timeout_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        "questioner=debug"
    } else {
        "questioner=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let json = std::env::var("QUESTIONER_LOG_FORMAT").is_ok_and(|format| format == "json");

    if json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = match ServerArgs::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => {
            let _ = e.print();
            return Ok(());
        }
    };
    init_tracing(args.verbose());

    let mode: Mode = args.mode.parse()?;
    let config = load_config()?;

    let mut server_config = ServerConfig::from(&config);
    if let Some(concurrency) = args.concurrency() {
        server_config.concurrency = concurrency;
    }
    if let Some(idle_timeout) = args.idle_timeout() {
        server_config.idle_timeout = idle_timeout;
    }

    let options = ValidatorOptions {
        max_mutation_count: args.max_mutation_count(),
        retries: args.retries(),
        verbose: args.verbose(),
        root_directory: args.root_dir.clone(),
    };
    let engine = Arc::new(BridgeEngine::new(
        EngineConfig::from(&config).with_env_override(),
    ));

    let running = ValidationServer::new(mode, options, server_config, engine)
        .start(args.port)
        .await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "PORT:{}", running.port()).wrap_err("failed to announce port")?;
    stdout.flush().wrap_err("failed to announce port")?;
    drop(stdout);

    info!(%mode, port = running.port(), "accepting requests");
    running.serve().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServerArgs {
        ServerArgs::try_parse_from(args).unwrap()
    }

    #[test]
    fn optional_positionals_default() {
        let args = parse(&["server", "validate", "0", "/repo"]);
        assert_eq!(args.max_mutation_count(), 256);
        assert_eq!(args.retries(), 4);
        assert!(!args.verbose());
        assert_eq!(args.concurrency(), None);
        assert_eq!(args.idle_timeout(), None);
    }

    #[test]
    fn all_positionals_parse() {
        let args = parse(&[
            "server", "calibrate", "8123", "/repo", "64", "2", "true", "4", "30",
        ]);
        assert_eq!(args.mode, "calibrate");
        assert_eq!(args.port, 8123);
        assert_eq!(args.max_mutation_count(), 64);
        assert_eq!(args.retries(), 2);
        assert!(args.verbose());
        assert_eq!(args.concurrency(), Some(4));
        assert_eq!(args.idle_timeout(), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn malformed_optional_positionals_fall_back() {
        let args = parse(&[
            "server", "validate", "0", "/repo", "lots", "few", "yes", "many", "soon",
        ]);
        assert_eq!(args.max_mutation_count(), 256);
        assert_eq!(args.retries(), 4);
        assert!(!args.verbose());
        assert_eq!(args.concurrency(), None);
        assert_eq!(args.idle_timeout(), None);
    }

    #[test]
    fn verbose_accepts_only_exact_booleans() {
        let args = parse(&["server", "validate", "0", "/repo", "1", "1", "TRUE"]);
        assert!(!args.verbose());
        let args = parse(&["server", "validate", "0", "/repo", "1", "1", "false"]);
        assert!(!args.verbose());
    }

    #[test]
    fn huge_idle_timeout_saturates() {
        assert_eq!(
            idle_timeout_from_minutes(u64::MAX),
            Duration::from_secs(u64::MAX)
        );
        let args = parse(&[
            "server", "validate", "0", "/repo", "1", "1", "false", "1",
            "18446744073709551615",
        ]);
        assert_eq!(args.idle_timeout(), Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn missing_required_arguments_fail() {
        assert!(ServerArgs::try_parse_from(["server", "validate", "0"]).is_err());
    }
}
