//! TCP line server that runs validate or calibrate requests against the engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use questioner_engine::GradingEngine;
use questioner_shared::{QuestionerError, Result, ServerConfig, ValidatorOptions};

use crate::failure::{failure_message, panic_failure};

/// Request line that stops the server.
pub const SHUTDOWN_REQUEST: &str = "shutdown";

/// Delay between answering a terminating request and exiting.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Operation a server instance performs for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Validate,
    Calibrate,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Calibrate => "calibrate",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = QuestionerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "validate" => Ok(Self::Validate),
            "calibrate" => Ok(Self::Calibrate),
            other => Err(QuestionerError::config(format!("unknown mode '{other}'"))),
        }
    }
}

/// Lifecycle of a server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    WarmingUp,
    Accepting,
    ShuttingDown,
    Terminated,
}

/// Process termination. The default ends the process; tests record the code.
pub trait Exit: Send + Sync {
    fn exit(&self, code: i32);
}

/// [`Exit`] that calls [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Exit for ProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// State shared between the accept loop, connection workers, and the watchdog.
#[derive(Debug)]
pub struct ServerShared {
    shutting_down: AtomicBool,
    /// Epoch milliseconds of the most recently accepted connection.
    last_activity: AtomicI64,
    state: Mutex<ServerState>,
    terminated: Notify,
}

impl Default for ServerShared {
    fn default() -> Self {
        Self {
            shutting_down: AtomicBool::new(false),
            last_activity: AtomicI64::new(Utc::now().timestamp_millis()),
            state: Mutex::new(ServerState::WarmingUp),
            terminated: Notify::new(),
        }
    }
}

impl ServerShared {
    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    /// Time since the last accepted connection.
    pub fn idle_for(&self) -> Duration {
        let idle = Utc::now().timestamp_millis() - self.last_activity.load(Ordering::SeqCst);
        Duration::from_millis(u64::try_from(idle).unwrap_or(0))
    }

    /// Resolves once the server has terminated.
    pub async fn terminated(&self) {
        let notified = self.terminated.notified();
        if self.state() == ServerState::Terminated {
            return;
        }
        notified.await;
    }
}

/// Everything a connection worker needs.
struct Context {
    mode: Mode,
    options: ValidatorOptions,
    engine: Arc<dyn GradingEngine>,
    permits: Arc<Semaphore>,
    shared: Arc<ServerShared>,
    exit: Arc<dyn Exit>,
    idle_timeout: Duration,
}

impl Context {
    /// Mark the server shutting down, wait out the grace period, and exit.
    async fn shut_down(&self, code: i32) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.set_state(ServerState::ShuttingDown);
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        self.terminate(code);
    }

    /// Exit immediately.
    fn terminate(&self, code: i32) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.set_state(ServerState::Terminated);
        info!(code, "validation server terminating");
        self.exit.exit(code);
        self.shared.terminated.notify_waiters();
    }
}

/// A configured but not yet started validation server.
pub struct ValidationServer {
    mode: Mode,
    options: ValidatorOptions,
    config: ServerConfig,
    engine: Arc<dyn GradingEngine>,
    exit: Arc<dyn Exit>,
    shared: Arc<ServerShared>,
}

impl ValidationServer {
    pub fn new(
        mode: Mode,
        options: ValidatorOptions,
        config: ServerConfig,
        engine: Arc<dyn GradingEngine>,
    ) -> Self {
        Self {
            mode,
            options,
            config,
            engine,
            exit: Arc::new(ProcessExit),
            shared: Arc::new(ServerShared::default()),
        }
    }

    /// Replace the termination hook.
    pub fn with_exit(mut self, exit: Arc<dyn Exit>) -> Self {
        self.exit = exit;
        self
    }

    pub fn shared(&self) -> Arc<ServerShared> {
        Arc::clone(&self.shared)
    }

    /// Bind to `port` (0 picks a free port) and warm the engine.
    ///
    /// The returned server is ready to accept; its port is what callers
    /// should announce.
    #[instrument(skip_all, fields(mode = %self.mode, port = port))]
    pub async fn start(self, port: u16) -> Result<RunningServer> {
        if self.config.concurrency == 0 {
            return Err(QuestionerError::config("concurrency must be at least 1"));
        }
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| QuestionerError::io(format!("127.0.0.1:{port}"), e))?;
        let port = listener
            .local_addr()
            .map_err(|e| QuestionerError::io("listener", e))?
            .port();

        info!(mode = %self.mode, "validation server warming up");
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.warm())
            .await
            .map_err(|e| QuestionerError::Bridge(format!("warm-up task failed: {e}")))??;

        self.shared.touch();
        self.shared.set_state(ServerState::Accepting);
        info!(
            port,
            concurrency = self.config.concurrency,
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            "validation server ready"
        );

        Ok(RunningServer {
            listener,
            port,
            watchdog_interval: self.config.watchdog_interval,
            context: Arc::new(Context {
                mode: self.mode,
                options: self.options,
                engine: self.engine,
                permits: Arc::new(Semaphore::new(self.config.concurrency)),
                shared: self.shared,
                exit: self.exit,
                idle_timeout: self.config.idle_timeout,
            }),
        })
    }
}

/// A bound, warmed server.
pub struct RunningServer {
    listener: TcpListener,
    port: u16,
    watchdog_interval: Duration,
    context: Arc<Context>,
}

impl RunningServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shared(&self) -> Arc<ServerShared> {
        Arc::clone(&self.context.shared)
    }

    /// Accept connections until the server terminates.
    pub async fn serve(self) -> Result<()> {
        let watchdog = tokio::spawn(watchdog(Arc::clone(&self.context), self.watchdog_interval));
        let shared = Arc::clone(&self.context.shared);

        loop {
            tokio::select! {
                _ = shared.terminated() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        shared.touch();
                        debug!(%peer, "accepted connection");
                        tokio::spawn(handle_connection(stream, Arc::clone(&self.context)));
                    }
                    Err(e) => {
                        if !shared.is_shutting_down() {
                            warn!(error = %e, "failed to accept connection");
                        }
                    }
                },
            }
        }

        watchdog.abort();
        Ok(())
    }
}

/// Terminate once no connection has been accepted for the idle timeout.
async fn watchdog(context: Arc<Context>, period: Duration) {
    let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticks.tick().await;
        if context.shared.is_shutting_down() {
            return;
        }
        let idle = context.shared.idle_for();
        if idle >= context.idle_timeout {
            info!(idle_secs = idle.as_secs(), "validation server idle, shutting down");
            context.terminate(0);
            return;
        }
    }
}

#[instrument(skip_all)]
async fn handle_connection(stream: TcpStream, context: Arc<Context>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let line = match lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => return,
        Err(e) => {
            debug!(error = %e, "failed to read request");
            return;
        }
    };
    let request = line.trim();
    if request.is_empty() {
        return;
    }

    if request == SHUTDOWN_REQUEST {
        respond(&mut writer, "ok").await;
        context.shut_down(0).await;
        return;
    }

    let path = PathBuf::from(request);
    let outcome = run_request(&context, path.clone()).await;
    match outcome {
        Ok(()) => {
            info!(path = %path.display(), mode = %context.mode, "request complete");
            respond(&mut writer, "ok").await;
        }
        Err(e) => {
            let message = failure_message(&e);
            warn!(path = %path.display(), mode = %context.mode, error = %message, "request failed");
            respond(&mut writer, &format!("error:{message}")).await;
            if e.is_poisoned() {
                error!("engine state poisoned, exiting so the server can be restarted");
                context.shut_down(1).await;
            }
        }
    }
}

/// Run the engine call under a concurrency permit on the blocking pool.
async fn run_request(context: &Context, path: PathBuf) -> Result<()> {
    let permit = Arc::clone(&context.permits)
        .acquire_owned()
        .await
        .map_err(|_| QuestionerError::misuse("request semaphore closed"))?;

    let engine = Arc::clone(&context.engine);
    let options = context.options.clone();
    let mode = context.mode;
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        match mode {
            Mode::Validate => engine.validate(&path, &options),
            Mode::Calibrate => engine.calibrate(&path, &options),
        }
    });

    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(panic_failure(e.into_panic()).into()),
        Err(e) => Err(QuestionerError::Bridge(format!("engine task failed: {e}"))),
    }
}

async fn respond(writer: &mut tokio::net::tcp::OwnedWriteHalf, line: &str) {
    let mut payload = String::with_capacity(line.len() + 1);
    payload.push_str(line);
    payload.push('\n');
    if let Err(e) = writer.write_all(payload.as_bytes()).await {
        debug!(error = %e, "failed to send response");
        return;
    }
    let _ = writer.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_known_names() {
        assert_eq!("validate".parse::<Mode>().unwrap(), Mode::Validate);
        assert_eq!("calibrate".parse::<Mode>().unwrap(), Mode::Calibrate);
        let err = "grade".parse::<Mode>().unwrap_err();
        assert!(matches!(err, QuestionerError::Config { .. }));
    }

    #[test]
    fn shared_state_starts_warming_up() {
        let shared = ServerShared::default();
        assert_eq!(shared.state(), ServerState::WarmingUp);
        assert!(!shared.is_shutting_down());
        assert!(shared.idle_for() < Duration::from_secs(5));
    }

    #[test]
    fn touch_resets_idle_time() {
        let shared = ServerShared::default();
        shared
            .last_activity
            .store(Utc::now().timestamp_millis() - 120_000, Ordering::SeqCst);
        assert!(shared.idle_for() >= Duration::from_secs(120));
        shared.touch();
        assert!(shared.idle_for() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn terminated_resolves_after_termination() {
        let shared = Arc::new(ServerShared::default());
        shared.set_state(ServerState::Terminated);
        tokio::time::timeout(Duration::from_secs(1), shared.terminated())
            .await
            .expect("already terminated");
    }
}
