//! Immutable server configuration, parsed once at startup and shared read-only
//! by every worker process.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::{ServerError, ServerResult};
use crate::log::LogLevel;

/// Command-line surface for the origin server binary.
///
/// Mirrors the fields of [`ServerSettings`] one-to-one; kept separate so that
/// the core never depends on `clap` and can be driven by any configuration
/// source (a config file, environment variables, tests constructing
/// [`ServerSettings`] directly).
#[derive(Parser, Debug)]
#[command(name = "origind", about = "Static-file HTTP origin server")]
pub struct Cli {
    /// Directory served to clients. All resolved paths must stay inside it.
    #[arg(short = 'r', long, value_name = "DIR")]
    pub root: PathBuf,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind.
    #[arg(short = 'p', long, default_value_t = 8080)]
    pub port: u16,

    /// Number of worker processes. Defaults to the detected core count.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Backlog passed to `listen(2)`.
    #[arg(long, default_value_t = 1024)]
    pub backlog: i32,

    /// Size in bytes of each connection's read/streaming buffer.
    #[arg(long, default_value_t = 8192)]
    pub read_buf_size: usize,

    /// Maximum accepted request-line URI length.
    #[arg(long, default_value_t = 2048)]
    pub uri_length_limit: usize,

    /// Maximum accepted request size (bytes read before giving up on the request line).
    #[arg(long, default_value_t = 8192)]
    pub max_request_size: usize,

    /// Minimum log level emitted to stderr.
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

/// Settings shared, read-only, by every worker. Created once in the master
/// process before any worker is spawned.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub doc_root: PathBuf,
    pub host: String,
    pub port: u16,
    pub process_count: usize,
    pub listen_backlog: i32,
    pub read_buf_size: usize,
    pub uri_length_limit: usize,
    pub req_size_limit: usize,
    pub log_level: LogLevel,
}

impl ServerSettings {
    /// Canonicalizes `root` and validates the settings, matching the checks
    /// the original implementation ran before spawning any worker.
    pub fn new(cli: Cli) -> ServerResult<Self> {
        let doc_root = std::fs::canonicalize(&cli.root).map_err(|e| {
            ServerError::Config(format!(
                "document root {:?} does not exist or is inaccessible: {e}",
                cli.root
            ))
        })?;
        if !doc_root.is_dir() {
            return Err(ServerError::Config(format!(
                "document root {doc_root:?} is not a directory"
            )));
        }

        let settings = Self {
            doc_root,
            host: cli.host,
            port: cli.port,
            process_count: cli.workers.unwrap_or_else(num_cpus::get),
            listen_backlog: cli.backlog,
            read_buf_size: cli.read_buf_size,
            uri_length_limit: cli.uri_length_limit,
            req_size_limit: cli.max_request_size,
            log_level: cli.log_level,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> ServerResult<()> {
        if self.process_count == 0 {
            return Err(ServerError::Config("process count must be nonzero".into()));
        }
        if self.uri_length_limit == 0 {
            return Err(ServerError::Config(
                "uri length limit must be nonzero".into(),
            ));
        }
        if self.listen_backlog == 0 {
            return Err(ServerError::Config("listen backlog too small".into()));
        }
        if self.read_buf_size < 64 {
            return Err(ServerError::Config("read buffer size too small".into()));
        }
        Ok(())
    }

    /// The canonicalized document root, as a byte-comparable path prefix.
    pub fn doc_root(&self) -> &Path {
        &self.doc_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_workers() {
        let cli = Cli {
            root: std::env::temp_dir(),
            host: "127.0.0.1".into(),
            port: 0,
            workers: Some(0),
            backlog: 128,
            read_buf_size: 8192,
            uri_length_limit: 2048,
            max_request_size: 8192,
            log_level: LogLevel::Info,
        };
        assert!(ServerSettings::new(cli).is_err());
    }

    #[test]
    fn accepts_valid_root() {
        let cli = Cli {
            root: std::env::temp_dir(),
            host: "127.0.0.1".into(),
            port: 0,
            workers: Some(1),
            backlog: 128,
            read_buf_size: 8192,
            uri_length_limit: 2048,
            max_request_size: 8192,
            log_level: LogLevel::Info,
        };
        assert!(ServerSettings::new(cli).is_ok());
    }
}
