//! Validation/calibration service.
//!
//! A long-running process accepts one-line requests over TCP, each naming a
//! question file, and runs either validate or calibrate on it through the
//! grading engine. At most `concurrency` engine calls run at once. The
//! process exits on `shutdown`, after an idle timeout, or when the engine
//! reports poisoned state.
//!
//! Protocol (newline-delimited UTF-8):
//! - request: a file path, or `shutdown`
//! - response: `ok`, or `error:<message>`
//! - an empty request or EOF closes the connection without a response

mod client;
mod failure;
mod server;

pub use client::{ValidationClient, ValidationResponse, parse_response};
pub use failure::{MAX_MESSAGE_CHARS, failure_message, panic_failure};
pub use server::{
    Exit, Mode, ProcessExit, RunningServer, SHUTDOWN_GRACE, SHUTDOWN_REQUEST, ServerShared,
    ServerState, ValidationServer,
};
