//! Pooled engine bridge subprocesses.
//!
//! Each [`BridgeHandle`] owns one engine process and serves one request at a
//! time. [`BridgeEngine`] keeps idle handles in a pool and spawns a new one
//! whenever every existing handle is busy.

use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use questioner_shared::{
    EngineConfig, Language, Question, QuestionerError, Result, TestResults, ValidatorOptions,
};

use crate::GradingEngine;
use crate::protocol::{EngineCall, RequestMessage, ResponseMessage};

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

/// Handle to one spawned bridge subprocess.
struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
}

/// Outcome of one exchange; transport failures make the handle unusable.
enum Exchange {
    Ok(serde_json::Value),
    EngineError(QuestionerError),
    Broken(QuestionerError),
}

impl BridgeHandle {
    /// Spawn the bridge subprocess and wait for its ready message.
    fn spawn(config: &EngineConfig) -> Result<Self> {
        info!(cmd = %config.command, args = ?config.args, "spawning engine bridge");

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            QuestionerError::Bridge(format!(
                "failed to spawn bridge: {e}. Is `{}` installed?",
                config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| QuestionerError::Bridge("failed to capture bridge stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| QuestionerError::Bridge("failed to capture bridge stdout".into()))?;

        let mut handle = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
        };

        if let Err(e) = handle.wait_for_ready() {
            handle.discard();
            return Err(e);
        }
        Ok(handle)
    }

    fn read_message(&mut self) -> Result<ResponseMessage> {
        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| QuestionerError::Bridge(format!("bridge read error: {e}")))?;

        if line.is_empty() {
            return Err(QuestionerError::Bridge(
                "bridge closed stdout unexpectedly".into(),
            ));
        }

        serde_json::from_str(line.trim()).map_err(|e| {
            QuestionerError::Bridge(format!(
                "invalid bridge message: {e} (got: {})",
                line.chars().take(200).collect::<String>()
            ))
        })
    }

    fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message()? {
            ResponseMessage::Ready => {
                debug!(pid = self.child.id(), "bridge is ready");
                Ok(())
            }
            other => Err(QuestionerError::Bridge(format!(
                "expected ready message, got: {other:?}"
            ))),
        }
    }

    /// Send one call and wait for its response.
    fn exchange(&mut self, call: &EngineCall<'_>) -> Exchange {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let request = RequestMessage::Request {
            id: id.clone(),
            call: call.clone(),
        };
        let json = match serde_json::to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                return Exchange::EngineError(QuestionerError::parse(format!(
                    "failed to serialize request: {e}"
                )));
            }
        };

        if let Err(e) = writeln!(self.stdin, "{json}").and_then(|()| self.stdin.flush()) {
            return Exchange::Broken(QuestionerError::Bridge(format!(
                "failed to write to bridge stdin: {e}"
            )));
        }

        match self.read_message() {
            Ok(ResponseMessage::Result { id: resp_id, result }) if resp_id == id => {
                Exchange::Ok(result)
            }
            Ok(ResponseMessage::Error { id: resp_id, error }) if resp_id == id => {
                Exchange::EngineError(QuestionerError::Engine(error))
            }
            Ok(other) => Exchange::Broken(QuestionerError::Bridge(format!(
                "unexpected response to {id}: {other:?}"
            ))),
            Err(e) => Exchange::Broken(e),
        }
    }

    /// Ask the bridge to exit and reap it.
    fn shutdown(mut self) {
        if let Ok(json) = serde_json::to_string(&RequestMessage::Shutdown) {
            let _ = writeln!(self.stdin, "{json}");
            let _ = self.stdin.flush();
        }
        match self.child.wait() {
            Ok(status) => debug!(?status, "bridge exited"),
            Err(e) => warn!("bridge wait error: {e}"),
        }
    }

    /// Kill a bridge whose stream can no longer be trusted.
    fn discard(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// [`GradingEngine`] backed by a pool of bridge subprocesses.
pub struct BridgeEngine {
    config: EngineConfig,
    idle: Mutex<Vec<BridgeHandle>>,
}

impl BridgeEngine {
    /// Create an empty pool. Bridges are spawned on first use.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Number of idle bridges currently pooled.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    fn checkout(&self) -> Result<BridgeHandle> {
        let pooled = self
            .idle
            .lock()
            .map_err(|_| QuestionerError::Bridge("bridge pool lock poisoned".into()))?
            .pop();
        match pooled {
            Some(handle) => Ok(handle),
            None => BridgeHandle::spawn(&self.config),
        }
    }

    fn checkin(&self, handle: BridgeHandle) {
        match self.idle.lock() {
            Ok(mut idle) => idle.push(handle),
            Err(_) => handle.discard(),
        }
    }

    /// Run one call on a pooled bridge and return the raw result.
    pub fn call(&self, call: EngineCall<'_>) -> Result<serde_json::Value> {
        let mut handle = self.checkout()?;
        debug!(op = call.op(), "engine call");
        match handle.exchange(&call) {
            Exchange::Ok(value) => {
                self.checkin(handle);
                Ok(value)
            }
            Exchange::EngineError(e) => {
                if e.is_poisoned() {
                    warn!(op = call.op(), "engine reported poisoned state, dropping bridge");
                    handle.discard();
                } else {
                    self.checkin(handle);
                }
                Err(e)
            }
            Exchange::Broken(e) => {
                warn!(op = call.op(), error = %e, "bridge failed, dropping it");
                handle.discard();
                Err(e)
            }
        }
    }

    fn call_typed<T: DeserializeOwned>(&self, call: EngineCall<'_>) -> Result<T> {
        let op = call.op();
        let value = self.call(call)?;
        serde_json::from_value(value)
            .map_err(|e| QuestionerError::parse(format!("invalid {op} result: {e}")))
    }
}

impl Drop for BridgeEngine {
    fn drop(&mut self) {
        let handles = match self.idle.get_mut() {
            Ok(idle) => std::mem::take(idle),
            Err(poisoned) => std::mem::take(poisoned.into_inner()),
        };
        for handle in handles {
            handle.shutdown();
        }
    }
}

impl GradingEngine for BridgeEngine {
    fn warm(&self) -> Result<()> {
        self.call(EngineCall::Warm).map(|_| ())
    }

    fn validate(&self, path: &Path, options: &ValidatorOptions) -> Result<()> {
        self.call(EngineCall::Validate { path, options }).map(|_| ())
    }

    fn calibrate(&self, path: &Path, options: &ValidatorOptions) -> Result<()> {
        self.call(EngineCall::Calibrate { path, options }).map(|_| ())
    }

    fn template(&self, language: Language, template: &str, contents: &str) -> Result<String> {
        self.call_typed(EngineCall::Template {
            language,
            template,
            contents,
        })
    }

    fn strip_comments(&self, language: Language, contents: &str) -> Result<String> {
        self.call_typed(EngineCall::StripComments { language, contents })
    }

    fn strip_assertion_messages(&self, language: Language, contents: &str) -> Result<String> {
        self.call_typed(EngineCall::StripAssertionMessages { language, contents })
    }

    fn bad_words(&self, language: Language, contents: &str) -> Result<BTreeSet<String>> {
        self.call_typed(EngineCall::BadWords { language, contents })
    }

    fn format(&self, language: Language, contents: &str) -> Result<String> {
        self.call_typed(EngineCall::Format { language, contents })
    }

    fn test(
        &self,
        question: &Question,
        language: Language,
        contents: &str,
    ) -> Result<TestResults> {
        self.call_typed(EngineCall::Test {
            question,
            language,
            contents,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A shell bridge that echoes each request id back with a fixed result.
    fn echo_bridge(result: &str) -> EngineConfig {
        let script = format!(
            r#"echo '{{"type":"ready"}}'
while read -r line; do
  case "$line" in *'"type":"shutdown"'*) exit 0;; esac
  id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
  printf '{{"type":"result","id":"%s","result":{result}}}\n' "$id"
done"#
        );
        EngineConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script],
            working_dir: None,
        }
    }

    #[test]
    fn bridge_result_is_returned_and_handle_reused() {
        let engine = BridgeEngine::new(echo_bridge(r#""formatted""#));
        let out = engine.format(Language::Java, "class A {}").expect("format");
        assert_eq!(out, "formatted");
        assert_eq!(engine.idle_count(), 1);

        let out = engine.strip_comments(Language::Java, "class A {}").expect("strip");
        assert_eq!(out, "formatted");
        assert_eq!(engine.idle_count(), 1);
    }

    #[test]
    fn mistyped_result_is_a_parse_error() {
        let engine = BridgeEngine::new(echo_bridge("42"));
        let err = engine.format(Language::Kotlin, "fun f() = 1").unwrap_err();
        assert!(matches!(err, QuestionerError::Parse { .. }));
    }

    #[test]
    fn bridge_that_never_gets_ready_is_rejected() {
        let engine = BridgeEngine::new(EngineConfig {
            command: "sh".into(),
            args: vec!["-c".into(), "echo not-json".into()],
            working_dir: None,
        });
        let err = engine.warm().unwrap_err();
        assert!(matches!(err, QuestionerError::Bridge(_)));
        assert_eq!(engine.idle_count(), 0);
    }

    #[test]
    fn missing_command_is_a_bridge_error() {
        let engine = BridgeEngine::new(EngineConfig {
            command: "questioner-definitely-not-installed".into(),
            args: Vec::new(),
            working_dir: None,
        });
        let err = engine.warm().unwrap_err();
        assert!(err.to_string().contains("failed to spawn bridge"));
    }
}
