//! `origind`: a static-file HTTP/1.x origin server.
//!
//! Parses CLI flags into [`origind::config::Cli`], turns that into an
//! immutable [`origind::ServerSettings`], and hands control to
//! [`origind::Server`], which spawns the worker pool and blocks until it
//! exits.

use clap::Parser;

use origind::config::Cli;
use origind::{Server, ServerSettings};

fn main() {
    let cli = Cli::parse();
    let settings = match ServerSettings::new(cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("origind: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = Server::new(settings).run() {
        eprintln!("origind: {e}");
        std::process::exit(1);
    }
}
