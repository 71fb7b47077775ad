use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use questioner_engine::GradingEngine;
use questioner_server::{
    Exit, Mode, RunningServer, ServerState, ValidationClient, ValidationResponse,
    ValidationServer,
};
use questioner_shared::{
    EngineFailure, Language, Question, QuestionerError, Result, ServerConfig, TestResults,
    ValidatorOptions,
};

/// Engine whose validate/calibrate behavior depends on the requested file name.
#[derive(Default)]
struct ScriptedEngine {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl ScriptedEngine {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn run(&self, op: &'static str, path: &Path) -> Result<()> {
        let name = path.to_string_lossy().to_string();
        self.calls.lock().unwrap().push((op, name.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match name.as_str() {
            "fails.json" => Err(EngineFailure::new("ValidationFailed", "add-one failed")
                .caused_by(EngineFailure::new("SolutionFailed", "line 1\nline 2"))
                .into()),
            "poisoned.json" => {
                let mut failure = EngineFailure::new("CachePoisonedException", "class cache corrupted");
                failure.poisoned = true;
                Err(failure.into())
            }
            "panics.json" => panic!("engine crashed"),
            _ => Ok(()),
        }
    }
}

impl GradingEngine for ScriptedEngine {
    fn warm(&self) -> Result<()> {
        self.calls.lock().unwrap().push(("warm", String::new()));
        Ok(())
    }

    fn validate(&self, path: &Path, _options: &ValidatorOptions) -> Result<()> {
        self.run("validate", path)
    }

    fn calibrate(&self, path: &Path, _options: &ValidatorOptions) -> Result<()> {
        self.run("calibrate", path)
    }

    fn template(&self, _: Language, _: &str, _: &str) -> Result<String> {
        Err(QuestionerError::misuse("not used by the server"))
    }

    fn strip_comments(&self, _: Language, _: &str) -> Result<String> {
        Err(QuestionerError::misuse("not used by the server"))
    }

    fn strip_assertion_messages(&self, _: Language, _: &str) -> Result<String> {
        Err(QuestionerError::misuse("not used by the server"))
    }

    fn bad_words(&self, _: Language, _: &str) -> Result<BTreeSet<String>> {
        Err(QuestionerError::misuse("not used by the server"))
    }

    fn format(&self, _: Language, _: &str) -> Result<String> {
        Err(QuestionerError::misuse("not used by the server"))
    }

    fn test(&self, _: &Question, _: Language, _: &str) -> Result<TestResults> {
        Err(QuestionerError::misuse("not used by the server"))
    }
}

/// Records the exit code instead of ending the test process.
#[derive(Default)]
struct RecordingExit {
    code: AtomicI32,
    calls: AtomicUsize,
}

impl RecordingExit {
    fn code(&self) -> Option<i32> {
        (self.calls.load(Ordering::SeqCst) > 0).then(|| self.code.load(Ordering::SeqCst))
    }
}

impl Exit for RecordingExit {
    fn exit(&self, code: i32) {
        self.code.store(code, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn config(concurrency: usize) -> ServerConfig {
    ServerConfig {
        concurrency,
        idle_timeout: Duration::from_secs(3600),
        watchdog_interval: Duration::from_secs(60),
    }
}

async fn start(
    mode: Mode,
    config: ServerConfig,
    engine: Arc<ScriptedEngine>,
) -> (u16, Arc<RecordingExit>, tokio::task::JoinHandle<Result<()>>, RunningServerShared) {
    let exit = Arc::new(RecordingExit::default());
    let server = ValidationServer::new(mode, ValidatorOptions::default(), config, engine)
        .with_exit(Arc::clone(&exit) as Arc<dyn Exit>);
    let running: RunningServer = server.start(0).await.expect("start server");
    let port = running.port();
    let shared = running.shared();
    let handle = tokio::spawn(running.serve());
    (port, exit, handle, shared)
}

type RunningServerShared = Arc<questioner_server::ServerShared>;

fn client() -> ValidationClient {
    ValidationClient::new().with_timeout(Duration::from_secs(10))
}

#[tokio::test]
async fn warms_up_before_accepting() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, _exit, _handle, shared) = start(Mode::Validate, config(2), Arc::clone(&engine)).await;

    assert_eq!(shared.state(), ServerState::Accepting);
    assert_ne!(port, 0);
    assert_eq!(engine.calls.lock().unwrap().first().map(|c| c.0), Some("warm"));
}

#[tokio::test]
async fn validate_mode_replies_ok() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, _exit, _handle, _shared) = start(Mode::Validate, config(2), Arc::clone(&engine)).await;

    let response = client()
        .send_request(port, Path::new("  question.json  "))
        .await
        .unwrap();
    assert_eq!(response, ValidationResponse::Ok);
    let calls = engine.calls.lock().unwrap().clone();
    assert!(calls.contains(&("validate", "question.json".to_string())));
}

#[tokio::test]
async fn calibrate_mode_calls_calibrate() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, _exit, _handle, _shared) = start(Mode::Calibrate, config(2), Arc::clone(&engine)).await;

    client().send_request(port, Path::new("q.json")).await.unwrap();
    let calls = engine.calls.lock().unwrap().clone();
    assert!(calls.contains(&("calibrate", "q.json".to_string())));
    assert!(!calls.iter().any(|(op, _)| *op == "validate"));
}

#[tokio::test]
async fn failure_reply_joins_cause_chain() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, exit, _handle, _shared) = start(Mode::Validate, config(2), engine).await;

    let response = client().send_request(port, Path::new("fails.json")).await.unwrap();
    assert_eq!(
        response,
        ValidationResponse::Error("add-one failed -> line 1 line 2".into())
    );

    // A failed request does not stop the server.
    let response = client().send_request(port, Path::new("ok.json")).await.unwrap();
    assert_eq!(response, ValidationResponse::Ok);
    assert_eq!(exit.code(), None);
}

#[tokio::test]
async fn panicking_engine_releases_its_permit() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, _exit, _handle, _shared) = start(Mode::Validate, config(1), engine).await;

    let response = client().send_request(port, Path::new("panics.json")).await.unwrap();
    assert_eq!(response, ValidationResponse::Error("engine crashed".into()));

    let response = client().send_request(port, Path::new("ok.json")).await.unwrap();
    assert_eq!(response, ValidationResponse::Ok);
}

#[tokio::test]
async fn concurrent_engine_calls_never_exceed_the_bound() {
    let engine = Arc::new(ScriptedEngine::with_delay(Duration::from_millis(150)));
    let (port, _exit, _handle, _shared) = start(Mode::Validate, config(2), Arc::clone(&engine)).await;

    let requests = (0..6).map(|i| {
        tokio::spawn(async move {
            client()
                .send_request(port, Path::new(&format!("q{i}.json")))
                .await
        })
    });
    let started = std::time::Instant::now();
    for request in requests.collect::<Vec<_>>() {
        assert_eq!(request.await.unwrap().unwrap(), ValidationResponse::Ok);
    }

    assert_eq!(engine.peak.load(Ordering::SeqCst), 2);
    // Six calls two at a time take at least three rounds.
    assert!(started.elapsed() >= Duration::from_millis(3 * 150));
}

#[tokio::test]
async fn shutdown_replies_ok_then_exits_zero() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, exit, handle, shared) = start(Mode::Validate, config(2), engine).await;

    client().shutdown(port).await.expect("shutdown acknowledged");
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();

    assert_eq!(exit.code(), Some(0));
    assert_eq!(shared.state(), ServerState::Terminated);
}

#[tokio::test]
async fn poisoned_engine_replies_then_exits_one() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, exit, handle, _shared) = start(Mode::Validate, config(2), engine).await;

    let response = client().send_request(port, Path::new("poisoned.json")).await.unwrap();
    assert_eq!(response, ValidationResponse::Error("class cache corrupted".into()));

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();
    assert_eq!(exit.code(), Some(1));
}

#[tokio::test]
async fn idle_watchdog_terminates_server() {
    let engine = Arc::new(ScriptedEngine::default());
    let config = ServerConfig {
        concurrency: 1,
        idle_timeout: Duration::from_millis(200),
        watchdog_interval: Duration::from_millis(50),
    };
    let (_port, exit, handle, shared) = start(Mode::Validate, config, engine).await;

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watchdog fires")
        .unwrap()
        .unwrap();
    assert_eq!(exit.code(), Some(0));
    assert_eq!(shared.state(), ServerState::Terminated);
}

#[tokio::test]
async fn activity_postpones_idle_shutdown() {
    let engine = Arc::new(ScriptedEngine::default());
    let config = ServerConfig {
        concurrency: 1,
        idle_timeout: Duration::from_millis(400),
        watchdog_interval: Duration::from_millis(50),
    };
    let (port, exit, _handle, _shared) = start(Mode::Validate, config, engine).await;

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        client().send_request(port, Path::new("q.json")).await.unwrap();
    }
    assert_eq!(exit.code(), None);
}

#[tokio::test]
async fn empty_request_closes_without_reply() {
    let engine = Arc::new(ScriptedEngine::default());
    let (port, _exit, _handle, _shared) = start(Mode::Validate, config(1), Arc::clone(&engine)).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(b"   \n").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert!(reply.is_empty());

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert!(reply.is_empty());

    assert!(!engine.calls.lock().unwrap().iter().any(|(op, _)| *op == "validate"));
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let engine: Arc<dyn GradingEngine> = Arc::new(ScriptedEngine::default());
    let server = ValidationServer::new(Mode::Validate, ValidatorOptions::default(), config(0), engine);
    let err = server.start(0).await.err().expect("rejected");
    assert!(matches!(err, QuestionerError::Config { .. }));
}
