//! Client side of the validation server protocol.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use questioner_shared::{QuestionerError, Result};

use crate::server::SHUTDOWN_REQUEST;

/// A parsed server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResponse {
    Ok,
    Error(String),
}

/// Sends one request per connection to a local validation server.
#[derive(Debug, Clone)]
pub struct ValidationClient {
    host: String,
    timeout: Option<Duration>,
}

impl Default for ValidationClient {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            timeout: None,
        }
    }
}

impl ValidationClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a request after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ask the server on `port` to process the question file at `path`.
    pub async fn send_request(&self, port: u16, path: &Path) -> Result<ValidationResponse> {
        self.exchange(port, &path.to_string_lossy()).await
    }

    /// Ask the server on `port` to stop.
    pub async fn shutdown(&self, port: u16) -> Result<()> {
        match self.exchange(port, SHUTDOWN_REQUEST).await? {
            ValidationResponse::Ok => Ok(()),
            ValidationResponse::Error(message) => Err(QuestionerError::Client(format!(
                "shutdown refused: {message}"
            ))),
        }
    }

    async fn exchange(&self, port: u16, request: &str) -> Result<ValidationResponse> {
        let round_trip = self.round_trip(port, request);
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, round_trip)
                .await
                .map_err(|_| {
                    QuestionerError::Client(format!(
                        "no response from port {port} within {}ms",
                        timeout.as_millis()
                    ))
                })?,
            None => round_trip.await,
        }
    }

    async fn round_trip(&self, port: u16, request: &str) -> Result<ValidationResponse> {
        let client_err =
            |e: std::io::Error| QuestionerError::Client(format!("{}:{port}: {e}", self.host));

        let mut stream = TcpStream::connect((self.host.as_str(), port))
            .await
            .map_err(client_err)?;
        stream
            .write_all(format!("{request}\n").as_bytes())
            .await
            .map_err(client_err)?;
        stream.flush().await.map_err(client_err)?;

        let mut lines = BufReader::new(stream).lines();
        let line = lines.next_line().await.map_err(client_err)?.ok_or_else(|| {
            QuestionerError::Client(format!("port {port} closed the connection without a response"))
        })?;
        debug!(port, request, response = %line, "validation server replied");
        parse_response(&line)
    }
}

/// Parse one response line.
pub fn parse_response(line: &str) -> Result<ValidationResponse> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line == "ok" {
        return Ok(ValidationResponse::Ok);
    }
    match line.strip_prefix("error:") {
        Some(message) => Ok(ValidationResponse::Error(message.to_string())),
        None => Err(QuestionerError::Client(format!(
            "unexpected response: {line}"
        ))),
    }
}
