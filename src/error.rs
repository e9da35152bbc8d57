//! Error types shared across the server core.
//!
//! The core distinguishes startup/master-fatal errors ([`ServerError`]) from
//! the per-request errors produced by the parser ([`crate::parser::ParseError`])
//! and the path resolver ([`crate::path::ResolveError`]); the latter two are
//! translated to HTTP status codes by the worker and never propagate past the
//! connection they belong to.

use std::fmt;
use std::io;

/// Errors that can stop the whole process: bad configuration, a failed
/// `fork`, or a readiness wait that returned something other than `EINTR`.
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Io(io::Error),
    Fatal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(msg) => write!(f, "configuration error: {msg}"),
            ServerError::Io(err) => write!(f, "i/o error: {err}"),
            ServerError::Fatal(msg) => write!(f, "fatal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::Io(err)
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
